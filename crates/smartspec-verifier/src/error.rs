//! Verifier error type.

use thiserror::Error;

/// Failures that abort an entire verification run.
///
/// Individual hook failures are report data, not errors; only input and
/// filesystem problems surface here, and a partial report is never emitted.
#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("Tasks document not found: {path}")]
    TasksNotFound { path: String },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl VerifierError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<VerifierError> for smartspec_utils::SmartSpecError {
    fn from(err: VerifierError) -> Self {
        match err {
            VerifierError::TasksNotFound { path } => {
                smartspec_utils::SmartSpecError::validation(format!(
                    "tasks document not found: {path}"
                ))
            }
            VerifierError::Io { path, source } => {
                smartspec_utils::SmartSpecError::io(path, source)
            }
        }
    }
}
