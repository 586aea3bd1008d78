//! Registry construction: builtin workflows plus on-disk descriptors.
//!
//! The nine pipeline workflows are compiled in. `.spec/workflows/*.toml`
//! may add more but may not shadow a builtin name; any validation failure
//! aborts startup with a named diagnostic.

use camino::Utf8Path;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

use crate::descriptor::{ArgSpec, ArgType, EffectSet, UniversalFlag, WorkflowDescriptor};
use crate::error::RegistryError;

static SEMVER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("semver regex is valid"));

/// The registry of known workflows.
#[derive(Debug, Clone)]
pub struct WorkflowRegistry {
    workflows: BTreeMap<String, WorkflowDescriptor>,
}

impl WorkflowRegistry {
    /// Builtins only.
    ///
    /// # Errors
    /// Does not fail today; kept fallible to match [`Self::discover`].
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self {
            workflows: BTreeMap::new(),
        };
        for descriptor in builtin_descriptors() {
            registry.insert(descriptor)?;
        }
        Ok(registry)
    }

    /// Builtins plus descriptors under `workflows_dir`.
    ///
    /// # Errors
    /// [`RegistryError`] naming the offending file for parse failures,
    /// duplicate names, builtin shadowing, or malformed fields.
    pub fn discover(workflows_dir: &Utf8Path) -> Result<Self, RegistryError> {
        let mut registry = Self::builtin()?;
        if !workflows_dir.is_dir() {
            return Ok(registry);
        }

        let mut entries: Vec<_> = std::fs::read_dir(workflows_dir)
            .map_err(|e| RegistryError::Io {
                path: workflows_dir.to_string(),
                source: e,
            })?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        entries.sort();

        for path in entries {
            let raw = std::fs::read_to_string(&path).map_err(|e| RegistryError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            let descriptor: WorkflowDescriptor =
                toml::from_str(&raw).map_err(|e| RegistryError::InvalidDescriptor {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            debug!(workflow = %descriptor.name, path = %path.display(), "discovered workflow");
            registry.insert(descriptor)?;
        }
        Ok(registry)
    }

    fn insert(&mut self, descriptor: WorkflowDescriptor) -> Result<(), RegistryError> {
        validate_descriptor(&descriptor)?;
        if self.workflows.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateName {
                name: descriptor.name,
            });
        }
        self.workflows.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Look up a workflow by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&WorkflowDescriptor> {
        self.workflows.get(name)
    }

    /// All workflows, name-ordered.
    pub fn iter(&self) -> impl Iterator<Item = &WorkflowDescriptor> {
        self.workflows.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

fn validate_descriptor(descriptor: &WorkflowDescriptor) -> Result<(), RegistryError> {
    if descriptor.name.is_empty()
        || !descriptor
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(RegistryError::InvalidField {
            workflow: descriptor.name.clone(),
            field: "name",
            reason: "must be non-empty snake_case".into(),
        });
    }
    if descriptor.category.is_empty() {
        return Err(RegistryError::InvalidField {
            workflow: descriptor.name.clone(),
            field: "category",
            reason: "must be non-empty".into(),
        });
    }
    if !SEMVER_RE.is_match(&descriptor.version) {
        return Err(RegistryError::InvalidField {
            workflow: descriptor.name.clone(),
            field: "version",
            reason: format!("'{}' is not MAJOR.MINOR.PATCH", descriptor.version),
        });
    }
    let mut seen = std::collections::HashSet::new();
    for arg in &descriptor.args {
        if arg.name.is_empty() || !seen.insert(&arg.name) {
            return Err(RegistryError::InvalidField {
                workflow: descriptor.name.clone(),
                field: "args",
                reason: format!("argument '{}' is empty or duplicated", arg.name),
            });
        }
    }
    Ok(())
}

fn spec_id_arg() -> ArgSpec {
    ArgSpec {
        name: "spec_id".into(),
        arg_type: ArgType::String,
        required: true,
    }
}

fn all_flags() -> Vec<UniversalFlag> {
    vec![
        UniversalFlag::Apply,
        UniversalFlag::AllowNetwork,
        UniversalFlag::ValidateOnly,
        UniversalFlag::Out,
        UniversalFlag::Json,
        UniversalFlag::Quiet,
        UniversalFlag::Config,
    ]
}

/// The pipeline workflows the orchestrator recommends between.
fn builtin_descriptors() -> Vec<WorkflowDescriptor> {
    let generative = EffectSet {
        writes_governed: true,
        writes_runtime: true,
        requires_network: true,
    };
    let runtime_only = EffectSet {
        writes_governed: false,
        writes_runtime: true,
        requires_network: false,
    };

    let mut descriptors = Vec::new();
    for name in ["generate_spec", "generate_plan", "generate_tasks"] {
        descriptors.push(WorkflowDescriptor {
            name: name.into(),
            category: "pipeline".into(),
            version: "1.0.0".into(),
            effects: generative,
            args: vec![spec_id_arg()],
            allowed_flags: all_flags(),
        });
    }
    descriptors.push(WorkflowDescriptor {
        name: "verify_tasks".into(),
        category: "verification".into(),
        version: "1.0.0".into(),
        effects: runtime_only,
        args: vec![spec_id_arg()],
        allowed_flags: all_flags(),
    });
    descriptors.push(WorkflowDescriptor {
        name: "report_implement_prompter".into(),
        category: "verification".into(),
        version: "1.0.0".into(),
        effects: runtime_only,
        args: vec![spec_id_arg()],
        allowed_flags: all_flags(),
    });
    descriptors.push(WorkflowDescriptor {
        name: "implement_tasks".into(),
        category: "pipeline".into(),
        version: "1.0.0".into(),
        effects: generative,
        args: vec![spec_id_arg()],
        allowed_flags: all_flags(),
    });
    descriptors.push(WorkflowDescriptor {
        name: "sync_tasks_checkboxes".into(),
        category: "pipeline".into(),
        version: "1.0.0".into(),
        effects: EffectSet {
            writes_governed: true,
            writes_runtime: true,
            requires_network: false,
        },
        args: vec![spec_id_arg()],
        allowed_flags: all_flags(),
    });
    descriptors.push(WorkflowDescriptor {
        name: "generate_docs".into(),
        category: "release".into(),
        version: "1.0.0".into(),
        effects: runtime_only,
        args: vec![spec_id_arg()],
        allowed_flags: all_flags(),
    });
    descriptors.push(WorkflowDescriptor {
        name: "release_tagger".into(),
        category: "release".into(),
        version: "1.0.0".into(),
        effects: runtime_only,
        args: vec![spec_id_arg()],
        allowed_flags: all_flags(),
    });
    descriptors
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn utf8_root(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn builtins_cover_the_pipeline() {
        let registry = WorkflowRegistry::builtin().unwrap();
        for name in [
            "generate_spec",
            "generate_plan",
            "generate_tasks",
            "verify_tasks",
            "report_implement_prompter",
            "implement_tasks",
            "sync_tasks_checkboxes",
            "generate_docs",
            "release_tagger",
        ] {
            assert!(registry.get(name).is_some(), "missing builtin {name}");
        }
        assert_eq!(registry.len(), 9);
    }

    #[test]
    fn generative_workflows_declare_their_effects() {
        let registry = WorkflowRegistry::builtin().unwrap();
        let spec = registry.get("generate_spec").unwrap();
        assert!(spec.effects.writes_governed);
        assert!(spec.effects.requires_network);
        let verify = registry.get("verify_tasks").unwrap();
        assert!(!verify.effects.writes_governed);
        assert!(verify.effects.writes_runtime);
    }

    #[test]
    fn disk_descriptors_extend_the_registry() {
        let dir = TempDir::new().unwrap();
        let root = utf8_root(&dir);
        std::fs::write(
            root.join("lint_specs.toml"),
            r#"
            name = "lint_specs"
            category = "quality"
            version = "0.2.0"
            [effects]
            writes_runtime = true
            "#,
        )
        .unwrap();

        let registry = WorkflowRegistry::discover(&root).unwrap();
        assert_eq!(registry.len(), 10);
        assert_eq!(registry.get("lint_specs").unwrap().version, "0.2.0");
    }

    #[test]
    fn builtin_shadowing_is_a_startup_error() {
        let dir = TempDir::new().unwrap();
        let root = utf8_root(&dir);
        std::fs::write(
            root.join("evil.toml"),
            "name = \"verify_tasks\"\ncategory = \"x\"\nversion = \"9.0.0\"\n",
        )
        .unwrap();

        let err = WorkflowRegistry::discover(&root).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { name } if name == "verify_tasks"));
    }

    #[test]
    fn malformed_version_is_named_in_the_diagnostic() {
        let dir = TempDir::new().unwrap();
        let root = utf8_root(&dir);
        std::fs::write(
            root.join("bad.toml"),
            "name = \"custom_flow\"\ncategory = \"x\"\nversion = \"one\"\n",
        )
        .unwrap();

        let err = WorkflowRegistry::discover(&root).unwrap_err();
        match err {
            RegistryError::InvalidField { workflow, field, .. } => {
                assert_eq!(workflow, "custom_flow");
                assert_eq!(field, "version");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn missing_workflows_dir_is_fine() {
        let dir = TempDir::new().unwrap();
        let registry =
            WorkflowRegistry::discover(&utf8_root(&dir).join("nope")).unwrap();
        assert_eq!(registry.len(), 9);
    }
}
