//! Store error type.

use thiserror::Error;
use uuid::Uuid;

/// Failures from the relational store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("User not found: {id}")]
    UserNotFound { id: Uuid },

    #[error("Email already registered: {email}")]
    DuplicateEmail { email: String },

    #[error("Balance {balance} is insufficient for a deduction of {amount}")]
    InsufficientBalance { balance: i64, amount: i64 },

    #[error(
        "Checkpoint step_index {attempted} regresses behind {latest} for execution {execution_id}"
    )]
    NonMonotonicCheckpoint {
        execution_id: Uuid,
        latest: i64,
        attempted: i64,
    },

    #[error("Execution not found: {id}")]
    ExecutionNotFound { id: Uuid },

    #[error("Checkpoint not found: {id}")]
    CheckpointNotFound { id: Uuid },

    #[error("Execution {id} is terminal ({status}); its identity cannot change")]
    ExecutionTerminal { id: Uuid, status: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<StoreError> for smartspec_utils::SmartSpecError {
    fn from(err: StoreError) -> Self {
        use smartspec_utils::SmartSpecError;
        match err {
            StoreError::InsufficientBalance { balance, amount } => {
                SmartSpecError::InsufficientCredits {
                    balance,
                    required: amount,
                    shortfall: amount - balance,
                }
            }
            StoreError::UserNotFound { .. }
            | StoreError::DuplicateEmail { .. }
            | StoreError::ExecutionNotFound { .. }
            | StoreError::CheckpointNotFound { .. } => {
                SmartSpecError::validation(err.to_string())
            }
            StoreError::NonMonotonicCheckpoint { .. }
            | StoreError::ExecutionTerminal { .. } => SmartSpecError::internal(err.to_string()),
            StoreError::Database(e) => SmartSpecError::io(
                "database",
                std::io::Error::other(e.to_string()),
            ),
            StoreError::Migration(e) => SmartSpecError::io(
                "database migration",
                std::io::Error::other(e.to_string()),
            ),
        }
    }
}
