//! Credit ledger operations.
//!
//! The ledger is append-only. Every mutation runs in one transaction that
//! re-reads the user's balance, inserts the ledger row, and updates the
//! denormalized `users.credit_balance`. The balance always equals the
//! latest row's `balance_after`, and a deduction can never race a topup
//! into a negative balance.

use chrono::Utc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{CreditTransaction, TransactionKind};
use crate::Store;

impl Store {
    /// Current balance, from the user row.
    ///
    /// # Errors
    /// [`StoreError::UserNotFound`] or database failure.
    pub async fn balance(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT credit_balance FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(self.pool())
                .await?;
        row.map(|(b,)| b).ok_or(StoreError::UserNotFound { id: user_id })
    }

    /// Append a topup row and credit the balance.
    ///
    /// `amount_credits` is the already-computed credit grant (markup applied
    /// by the caller).
    ///
    /// # Errors
    /// [`StoreError::UserNotFound`] or database failure.
    pub async fn record_topup(
        &self,
        user_id: Uuid,
        amount_credits: i64,
        metadata: serde_json::Value,
    ) -> Result<CreditTransaction, StoreError> {
        self.record_transaction(user_id, TransactionKind::Topup, amount_credits, metadata)
            .await
    }

    /// Append a deduction row and debit the balance.
    ///
    /// # Errors
    /// [`StoreError::InsufficientBalance`] when the amount exceeds the
    /// balance read inside the transaction; nothing is written in that case.
    pub async fn record_deduction(
        &self,
        user_id: Uuid,
        amount_credits: i64,
        metadata: serde_json::Value,
    ) -> Result<CreditTransaction, StoreError> {
        self.record_transaction(user_id, TransactionKind::Deduction, amount_credits, metadata)
            .await
    }

    /// Append a refund row and credit the balance.
    ///
    /// # Errors
    /// Same as [`record_topup`](Self::record_topup).
    pub async fn record_refund(
        &self,
        user_id: Uuid,
        amount_credits: i64,
        metadata: serde_json::Value,
    ) -> Result<CreditTransaction, StoreError> {
        self.record_transaction(user_id, TransactionKind::Refund, amount_credits, metadata)
            .await
    }

    /// Append one ledger row inside a single transaction.
    ///
    /// # Errors
    /// [`StoreError::InsufficientBalance`] for over-deductions,
    /// [`StoreError::UserNotFound`], or database failure.
    pub async fn record_transaction(
        &self,
        user_id: Uuid,
        kind: TransactionKind,
        amount_credits: i64,
        metadata: serde_json::Value,
    ) -> Result<CreditTransaction, StoreError> {
        let mut tx = self.pool().begin().await?;

        let row: Option<(i64,)> =
            sqlx::query_as("SELECT credit_balance FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let balance_before = row
            .map(|(b,)| b)
            .ok_or(StoreError::UserNotFound { id: user_id })?;

        let balance_after = balance_before + kind.sign() * amount_credits;
        if balance_after < 0 {
            return Err(StoreError::InsufficientBalance {
                balance: balance_before,
                amount: amount_credits,
            });
        }

        let record = CreditTransaction {
            id: Uuid::new_v4(),
            user_id,
            kind,
            amount_credits,
            balance_before,
            balance_after,
            metadata: metadata.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO credit_transactions
             (id, user_id, kind, amount_credits, balance_before, balance_after, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.kind)
        .bind(record.amount_credits)
        .bind(record.balance_before)
        .bind(record.balance_after)
        .bind(&record.metadata)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE users SET credit_balance = ? WHERE id = ?")
            .bind(balance_after)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Ledger rows for a user, oldest first.
    ///
    /// # Errors
    /// Database failure.
    pub async fn transaction_history(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<CreditTransaction>, StoreError> {
        Ok(sqlx::query_as::<_, CreditTransaction>(
            "SELECT * FROM credit_transactions WHERE user_id = ? ORDER BY created_at, id",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?)
    }
}
