//! Registry error type.

use thiserror::Error;

/// Startup and lookup failures from the workflow registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Duplicate workflow name: {name}")]
    DuplicateName { name: String },

    #[error("Invalid workflow descriptor at {path}: {reason}")]
    InvalidDescriptor { path: String, reason: String },

    #[error("Workflow '{workflow}' has invalid {field}: {reason}")]
    InvalidField {
        workflow: String,
        field: &'static str,
        reason: String,
    },

    #[error("Unknown workflow: {name}")]
    UnknownWorkflow { name: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<RegistryError> for smartspec_utils::SmartSpecError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Io { path, source } => smartspec_utils::SmartSpecError::io(path, source),
            other => smartspec_utils::SmartSpecError::validation(other.to_string()),
        }
    }
}
