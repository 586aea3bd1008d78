//! Engine error type.

use thiserror::Error;
use uuid::Uuid;

use smartspec_store::StoreError;

/// Failures from the execution engine's public surface.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Bundle busy: spec '{spec_id}' already has a writer")]
    BundleBusy { spec_id: String },

    #[error("Execution not found: {id}")]
    ExecutionNotFound { id: Uuid },

    #[error("Event stream for execution {id} was already consumed")]
    StreamConsumed { id: Uuid },

    #[error("Unknown interrupt: {interrupt_id}")]
    UnknownInterrupt { interrupt_id: Uuid },

    #[error("Workflow plan is invalid: {reason}")]
    InvalidPlan { reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<EngineError> for smartspec_utils::SmartSpecError {
    fn from(err: EngineError) -> Self {
        use smartspec_utils::SmartSpecError;
        match err {
            EngineError::BundleBusy { spec_id } => SmartSpecError::BundleBusy { spec_id },
            EngineError::ExecutionNotFound { .. }
            | EngineError::StreamConsumed { .. }
            | EngineError::UnknownInterrupt { .. }
            | EngineError::InvalidPlan { .. } => SmartSpecError::validation(err.to_string()),
            EngineError::Store(e) => e.into(),
        }
    }
}
