//! Workflow descriptors and governance flags.
//!
//! A descriptor declares a workflow's identity (name, category, version),
//! its input surface (typed arguments plus allowed universal flags), and
//! its effect set. The effect set drives governance: the router refuses to
//! recommend, and the engine refuses to execute, a workflow whose required
//! flag is absent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumString};

use smartspec_utils::SmartSpecError;

/// The universal flag set every workflow invocation may carry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum UniversalFlag {
    /// Enable writes to governed artifacts (`specs/**`).
    Apply,
    /// Enable outbound network access (LLM calls).
    AllowNetwork,
    /// Compute-only mode: produce a report, write nothing governed.
    ValidateOnly,
    /// Report output directory override under `.spec/reports/`.
    Out,
    /// Emit machine-readable output.
    Json,
    Quiet,
    /// Explicit config file path.
    Config,
}

/// Declared argument types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    String,
    Int,
    Bool,
    Path,
}

/// One declared workflow parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub arg_type: ArgType,
    #[serde(default)]
    pub required: bool,
}

/// What a workflow touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectSet {
    /// Writes under `specs/**`; requires the `apply` flag.
    #[serde(default)]
    pub writes_governed: bool,
    /// Writes under `.spec/**` (reports, prompts, scripts).
    #[serde(default)]
    pub writes_runtime: bool,
    /// Makes outbound network calls; requires `allow-network`.
    #[serde(default)]
    pub requires_network: bool,
}

impl EffectSet {
    /// A read-only workflow touches nothing.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        !self.writes_governed && !self.writes_runtime && !self.requires_network
    }
}

/// A discovered workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDescriptor {
    pub name: String,
    pub category: String,
    pub version: String,
    #[serde(default)]
    pub effects: EffectSet,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    /// Universal flags this workflow accepts; others are rejected.
    #[serde(default)]
    pub allowed_flags: Vec<UniversalFlag>,
}

impl WorkflowDescriptor {
    /// Check the governance contract for an invocation carrying `flags`.
    ///
    /// `validate-only` suppresses the `apply` requirement: nothing governed
    /// will be written. Network still requires its opt-in.
    ///
    /// # Errors
    /// `governance_error` naming the first missing flag, or
    /// `validation_error` for a flag the workflow does not accept.
    pub fn check_flags(&self, flags: &[UniversalFlag]) -> Result<(), SmartSpecError> {
        for flag in flags {
            if !self.allowed_flags.contains(flag) {
                return Err(SmartSpecError::validation(format!(
                    "workflow '{}' does not accept the `--{}` flag",
                    self.name, flag
                )));
            }
        }

        let validate_only = flags.contains(&UniversalFlag::ValidateOnly);
        if self.effects.writes_governed
            && !validate_only
            && !flags.contains(&UniversalFlag::Apply)
        {
            return Err(SmartSpecError::Governance {
                action: format!("workflow '{}' writes governed artifacts", self.name),
                required_flag: "apply".to_string(),
            });
        }
        if self.effects.requires_network
            && !validate_only
            && !flags.contains(&UniversalFlag::AllowNetwork)
        {
            return Err(SmartSpecError::Governance {
                action: format!("workflow '{}' requires network access", self.name),
                required_flag: "allow-network".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse a comma- or repeat-separated flag list from the CLI.
///
/// # Errors
/// `validation_error` for an unrecognized flag name.
pub fn parse_flags(names: &[String]) -> Result<Vec<UniversalFlag>, SmartSpecError> {
    names
        .iter()
        .map(|name| {
            UniversalFlag::from_str(name).map_err(|_| {
                SmartSpecError::validation(format!("unrecognized flag '{name}'"))
            })
        })
        .collect()
}

impl fmt::Display for WorkflowDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{} ({})", self.name, self.version, self.category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(effects: EffectSet) -> WorkflowDescriptor {
        WorkflowDescriptor {
            name: "generate_spec".into(),
            category: "pipeline".into(),
            version: "1.0.0".into(),
            effects,
            args: vec![],
            allowed_flags: vec![
                UniversalFlag::Apply,
                UniversalFlag::AllowNetwork,
                UniversalFlag::ValidateOnly,
                UniversalFlag::Json,
            ],
        }
    }

    #[test]
    fn governed_write_requires_apply() {
        let d = descriptor(EffectSet {
            writes_governed: true,
            ..Default::default()
        });
        let err = d.check_flags(&[]).unwrap_err();
        assert_eq!(err.error_code(), "governance_error");
        d.check_flags(&[UniversalFlag::Apply]).unwrap();
    }

    #[test]
    fn validate_only_suppresses_apply() {
        let d = descriptor(EffectSet {
            writes_governed: true,
            ..Default::default()
        });
        d.check_flags(&[UniversalFlag::ValidateOnly]).unwrap();
    }

    #[test]
    fn network_requires_its_own_opt_in() {
        let d = descriptor(EffectSet {
            requires_network: true,
            ..Default::default()
        });
        let err = d.check_flags(&[UniversalFlag::Apply]).unwrap_err();
        assert_eq!(err.error_code(), "governance_error");
        d.check_flags(&[UniversalFlag::AllowNetwork]).unwrap();
    }

    #[test]
    fn undeclared_flags_are_rejected() {
        let mut d = descriptor(EffectSet::default());
        d.allowed_flags = vec![UniversalFlag::Json];
        let err = d.check_flags(&[UniversalFlag::Quiet]).unwrap_err();
        assert_eq!(err.error_code(), "validation_error");
    }

    #[test]
    fn flag_names_parse_kebab_case() {
        let flags = parse_flags(&[
            "apply".to_string(),
            "allow-network".to_string(),
            "validate-only".to_string(),
        ])
        .unwrap();
        assert_eq!(
            flags,
            vec![
                UniversalFlag::Apply,
                UniversalFlag::AllowNetwork,
                UniversalFlag::ValidateOnly
            ]
        );
        assert!(parse_flags(&["force".to_string()]).is_err());
    }
}
