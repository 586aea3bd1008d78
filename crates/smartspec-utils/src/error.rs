//! Library-level error taxonomy with stable machine-readable codes.
//!
//! `SmartSpecError` is the primary error type returned by smartspec library
//! operations. Every variant maps to:
//! - a stable machine-readable code via [`error_code()`](SmartSpecError::error_code)
//! - a CLI exit code via [`to_exit_code()`](SmartSpecError::to_exit_code)
//! - a user-facing message with remediation guidance where one exists
//!
//! # Error Categories
//!
//! | Code | When |
//! |------|------|
//! | `validation_error` | Bad input: malformed evidence, unknown workflow, unrecognized flag |
//! | `governance_error` | Missing `apply` / `allow-network` for an action that requires it |
//! | `insufficient_credits` | Pre-flight balance check failed |
//! | `provider_error` | Upstream model failure after fallback exhaustion |
//! | `bundle_busy` | Another writer holds the bundle mutex |
//! | `interrupt_timeout` | Human-in-the-loop response not received within the deadline |
//! | `step_failed` | A workflow step body returned an error |
//! | `io_error` | Filesystem or database failure |
//! | `internal_error` | Invariant violation; carries a correlation id |
//!
//! Library code returns `SmartSpecError` and does NOT call
//! `std::process::exit()`; only the CLI maps errors to process exit codes.

use thiserror::Error;
use uuid::Uuid;

use crate::exit_codes::ExitCode;

/// Top-level error type for all smartspec operations.
#[derive(Error, Debug)]
pub enum SmartSpecError {
    /// Bad input that no state change resulted from.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// An action required a flag the caller did not pass.
    #[error("Governance error: {action} requires the `{required_flag}` flag")]
    Governance {
        action: String,
        required_flag: String,
    },

    /// Pre-flight credit check failed. No provider call was issued.
    #[error(
        "Insufficient credits: balance {balance}, required {required} (short {shortfall})"
    )]
    InsufficientCredits {
        balance: i64,
        required: i64,
        shortfall: i64,
    },

    /// Every provider in the routing table failed or was disabled.
    #[error("Provider error: {message}")]
    Provider { message: String },

    /// A write was attempted while another writer holds the bundle mutex.
    #[error("Bundle busy: spec '{spec_id}' is locked by another writer")]
    BundleBusy { spec_id: String },

    /// A paused execution's interrupt was not answered before the deadline.
    #[error("Interrupt timeout: interrupt '{interrupt_id}' unanswered after {deadline_secs}s")]
    InterruptTimeout {
        interrupt_id: String,
        deadline_secs: u64,
    },

    /// A step body returned an error; the engine recorded a final checkpoint.
    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    /// Filesystem or database IO failure, with the path or context it occurred in.
    #[error("IO error at {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Invariant violation. Carries a correlation id for log lookup.
    #[error("Internal error [{correlation_id}]: {message}")]
    Internal {
        message: String,
        correlation_id: Uuid,
    },
}

impl SmartSpecError {
    /// Construct a validation error from any displayable message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Construct an internal error with a fresh correlation id.
    ///
    /// The correlation id is logged at error level so operators can join
    /// the user-visible message to the full log context.
    pub fn internal(message: impl Into<String>) -> Self {
        let correlation_id = Uuid::new_v4();
        let message = message.into();
        tracing::error!(%correlation_id, %message, "internal error");
        Self::Internal {
            message,
            correlation_id,
        }
    }

    /// Wrap an IO error with the path or operation it occurred in.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Stable machine-readable error code.
    ///
    /// These strings are part of the public contract: JSON output and the
    /// event stream carry them verbatim.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Governance { .. } => "governance_error",
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::Provider { .. } => "provider_error",
            Self::BundleBusy { .. } => "bundle_busy",
            Self::InterruptTimeout { .. } => "interrupt_timeout",
            Self::StepFailed { .. } => "step_failed",
            Self::Io { .. } => "io_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Map this error to a CLI exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Validation { .. } => ExitCode::VALIDATION,
            Self::Governance { .. } => ExitCode::GOVERNANCE,
            Self::InsufficientCredits { .. } => ExitCode::INSUFFICIENT_CREDITS,
            Self::Provider { .. } => ExitCode::PROVIDER,
            Self::BundleBusy { .. } => ExitCode::BUNDLE_BUSY,
            Self::InterruptTimeout { .. } => ExitCode::INTERRUPT_TIMEOUT,
            Self::StepFailed { .. } => ExitCode::STEP_FAILED,
            Self::Io { .. } => ExitCode::IO,
            Self::Internal { .. } => ExitCode::INTERNAL,
        }
    }

    /// Remediation guidance for recoverable errors, if any applies.
    #[must_use]
    pub fn remediation(&self) -> Option<String> {
        match self {
            Self::Governance { required_flag, .. } => Some(format!(
                "Re-run the command with `--{required_flag}` to authorize this action."
            )),
            Self::InsufficientCredits { shortfall, .. } => Some(format!(
                "Top up at least {shortfall} credits (`smartspec credits topup`) and retry."
            )),
            Self::BundleBusy { spec_id } => Some(format!(
                "Wait for the running workflow on '{spec_id}' to finish, then retry."
            )),
            Self::Provider { .. } => {
                Some("Check provider API keys and enabled providers in .spec/config.toml.".into())
            }
            _ => None,
        }
    }

    /// User-facing rendering: message, then remediation when available.
    ///
    /// Internal errors surface only the correlation id; the detail stays in
    /// the logs.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut out = match self {
            Self::Internal { correlation_id, .. } => format!(
                "Internal error. Reference id {correlation_id} when reporting this problem."
            ),
            other => other.to_string(),
        };
        if let Some(hint) = self.remediation() {
            out.push('\n');
            out.push_str("  hint: ");
            out.push_str(&hint);
        }
        out
    }

    /// Serialize into the stable `{code, message, remediation?}` JSON shape
    /// used by `--json` output and `summary.json`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
        });
        if let Some(hint) = self.remediation() {
            obj["remediation"] = serde_json::Value::String(hint);
        }
        if let Self::InsufficientCredits {
            balance, required, ..
        } = self
        {
            obj["balance"] = (*balance).into();
            obj["required"] = (*required).into();
        }
        obj
    }
}

impl From<std::io::Error> for SmartSpecError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            context: "unspecified".to_string(),
            source,
        }
    }
}

/// Violation of the engine's write scope (`specs/` and `.spec/` only).
///
/// Kept separate from [`SmartSpecError`] because the verifier reports scope
/// violations per hook without aborting, while the engine treats them as
/// hard failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeViolation {
    #[error("Path contains parent directory traversal: {path}")]
    ParentTraversal { path: String },

    #[error("Absolute path not allowed: {path}")]
    AbsolutePath { path: String },

    #[error("Path escapes repository root: {path}")]
    EscapesRoot { path: String },

    #[error("Path is outside the writable prefixes specs/ and .spec/: {path}")]
    OutsideWritablePrefix { path: String },
}

impl From<ScopeViolation> for SmartSpecError {
    fn from(v: ScopeViolation) -> Self {
        SmartSpecError::Validation {
            message: v.to_string(),
        }
    }
}
