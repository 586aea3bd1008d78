//! Relational store for smartspec.
//!
//! Governed artifacts stay on disk; everything with transactional needs
//! (users, the credit ledger, executions, checkpoints) lives here. SQLite
//! via sqlx, embedded migrations, foreign keys on.
//!
//! Writes for one user's balance and one execution's checkpoints are
//! serialized through SQLite's single-writer transaction semantics: every
//! mutation runs inside one transaction that re-reads the row it updates.

mod credits;
mod error;
mod executions;
mod models;
mod users;

pub use error::StoreError;
pub use models::{
    CheckpointRow, CreditTransaction, ExecutionRow, ExecutionStatus, Role, TransactionKind, User,
};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

/// Handle to the smartspec database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `url` and run migrations.
    ///
    /// # Errors
    /// Connection or migration failure.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(StoreError::Database)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!(url, "store opened");
        Ok(store)
    }

    /// In-memory database for tests. Single connection so the database
    /// lives as long as the pool.
    ///
    /// # Errors
    /// Connection or migration failure.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(StoreError::Database)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Read a `system_config` value.
    ///
    /// # Errors
    /// Database failure.
    pub async fn config_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM system_config WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(v,)| v))
    }

    /// Upsert a `system_config` value.
    ///
    /// # Errors
    /// Database failure.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO system_config (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Close the pool, flushing outstanding writes.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_apply_and_config_round_trips() {
        let store = Store::open_in_memory().await.unwrap();
        assert_eq!(store.config_get("markup_rate").await.unwrap(), None);
        store.config_set("markup_rate", "0.15").await.unwrap();
        store.config_set("markup_rate", "0.20").await.unwrap();
        assert_eq!(
            store.config_get("markup_rate").await.unwrap().as_deref(),
            Some("0.20")
        );
    }
}
