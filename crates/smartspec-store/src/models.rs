//! Row types for the relational store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub credit_balance: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Kind of a credit ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TransactionKind {
    Topup,
    Deduction,
    Refund,
    Adjustment,
}

impl TransactionKind {
    /// Sign applied to `amount_credits` when updating the balance.
    /// Adjustments carry their own sign in the amount.
    #[must_use]
    pub fn sign(self) -> i64 {
        match self {
            Self::Topup | Self::Refund | Self::Adjustment => 1,
            Self::Deduction => -1,
        }
    }
}

/// One append-only credit ledger row.
///
/// `balance_after = balance_before + sign(kind) * amount_credits` holds for
/// every row; corrections are new rows, never edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount_credits: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    /// Free-form JSON: provider, model, token counts, payment reference.
    pub metadata: String,
    pub created_at: DateTime<Utc>,
}

/// Execution lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
    Paused,
}

impl ExecutionStatus {
    /// Terminal statuses never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// One workflow execution. Identity fields (`workflow`, `args`, `flags`)
/// never change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ExecutionRow {
    pub id: Uuid,
    pub workflow: String,
    /// Frozen input arguments, JSON object.
    pub args: String,
    /// Universal flags the execution was started with, JSON array.
    pub flags: String,
    pub status: ExecutionStatus,
    pub total_steps: i64,
    pub current_step: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub latest_checkpoint_id: Option<Uuid>,
}

/// One step-boundary checkpoint. State snapshots are opaque JSON owned by
/// the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CheckpointRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_index: i64,
    pub step_name: String,
    pub state: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_sign_matches_kind() {
        assert_eq!(TransactionKind::Topup.sign(), 1);
        assert_eq!(TransactionKind::Refund.sign(), 1);
        assert_eq!(TransactionKind::Deduction.sign(), -1);
        assert_eq!(TransactionKind::Adjustment.sign(), 1);
    }

    #[test]
    fn terminal_statuses() {
        for status in [
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Stopped,
        ] {
            assert!(status.is_terminal());
        }
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Paused,
        ] {
            assert!(!status.is_terminal());
        }
    }
}
