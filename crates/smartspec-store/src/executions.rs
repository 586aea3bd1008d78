//! Execution and checkpoint operations.
//!
//! Executions are immutable in identity: workflow name, args, and flags are
//! frozen at creation; only status, step progress, and the checkpoint
//! pointer change, and never after a terminal status. Checkpoint inserts
//! enforce a non-regressing `step_index` per execution and update the
//! execution's latest-checkpoint pointer in the same transaction.

use chrono::Utc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{CheckpointRow, ExecutionRow, ExecutionStatus};
use crate::Store;

impl Store {
    /// Insert a new pending execution.
    ///
    /// # Errors
    /// Database failure.
    pub async fn create_execution(
        &self,
        workflow: &str,
        args: serde_json::Value,
        flags: &[String],
        total_steps: usize,
    ) -> Result<ExecutionRow, StoreError> {
        let row = ExecutionRow {
            id: Uuid::new_v4(),
            workflow: workflow.to_string(),
            args: args.to_string(),
            flags: serde_json::to_string(flags).unwrap_or_else(|_| "[]".to_string()),
            status: ExecutionStatus::Pending,
            total_steps: total_steps as i64,
            current_step: 0,
            started_at: Utc::now(),
            ended_at: None,
            latest_checkpoint_id: None,
        };
        sqlx::query(
            "INSERT INTO executions
             (id, workflow, args, flags, status, total_steps, current_step, started_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.id)
        .bind(&row.workflow)
        .bind(&row.args)
        .bind(&row.flags)
        .bind(row.status)
        .bind(row.total_steps)
        .bind(row.current_step)
        .bind(row.started_at)
        .execute(self.pool())
        .await?;
        Ok(row)
    }

    /// Fetch one execution.
    ///
    /// # Errors
    /// [`StoreError::ExecutionNotFound`] or database failure.
    pub async fn get_execution(&self, id: Uuid) -> Result<ExecutionRow, StoreError> {
        sqlx::query_as::<_, ExecutionRow>("SELECT * FROM executions WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(StoreError::ExecutionNotFound { id })
    }

    /// Transition an execution's status. Terminal rows reject further
    /// transitions; terminal transitions stamp `ended_at`.
    ///
    /// # Errors
    /// [`StoreError::ExecutionTerminal`] when already terminal.
    pub async fn set_execution_status(
        &self,
        id: Uuid,
        status: ExecutionStatus,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await?;
        let current = sqlx::query_as::<_, ExecutionRow>("SELECT * FROM executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::ExecutionNotFound { id })?;
        if current.status.is_terminal() {
            return Err(StoreError::ExecutionTerminal {
                id,
                status: current.status.to_string(),
            });
        }
        let ended_at = status.is_terminal().then(Utc::now);
        sqlx::query("UPDATE executions SET status = ?, ended_at = ? WHERE id = ?")
            .bind(status)
            .bind(ended_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Record step progress for the status surface.
    ///
    /// # Errors
    /// Database failure.
    pub async fn set_current_step(&self, id: Uuid, step: usize) -> Result<(), StoreError> {
        sqlx::query("UPDATE executions SET current_step = ? WHERE id = ?")
            .bind(step as i64)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// All executions, newest first.
    ///
    /// # Errors
    /// Database failure.
    pub async fn list_executions(&self) -> Result<Vec<ExecutionRow>, StoreError> {
        Ok(sqlx::query_as::<_, ExecutionRow>(
            "SELECT * FROM executions ORDER BY started_at DESC, id",
        )
        .fetch_all(self.pool())
        .await?)
    }

    /// Write a checkpoint and move the execution's latest-checkpoint
    /// pointer, atomically.
    ///
    /// `step_index` may repeat (the step-boundary protocol writes the same
    /// index once on completion and once on the next entry) but may never
    /// regress.
    ///
    /// # Errors
    /// [`StoreError::NonMonotonicCheckpoint`] on regression;
    /// [`StoreError::ExecutionNotFound`]; database failure.
    pub async fn insert_checkpoint(
        &self,
        execution_id: Uuid,
        step_index: i64,
        step_name: &str,
        state: serde_json::Value,
        note: &str,
    ) -> Result<CheckpointRow, StoreError> {
        let mut tx = self.pool().begin().await?;

        let execution =
            sqlx::query_as::<_, ExecutionRow>("SELECT * FROM executions WHERE id = ?")
                .bind(execution_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::ExecutionNotFound { id: execution_id })?;

        let latest: Option<(i64,)> = sqlx::query_as(
            "SELECT step_index FROM checkpoints
             WHERE execution_id = ? ORDER BY step_index DESC, created_at DESC LIMIT 1",
        )
        .bind(execution_id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some((latest_index,)) = latest {
            if step_index < latest_index {
                return Err(StoreError::NonMonotonicCheckpoint {
                    execution_id,
                    latest: latest_index,
                    attempted: step_index,
                });
            }
        }

        let row = CheckpointRow {
            id: Uuid::new_v4(),
            execution_id,
            step_index,
            step_name: step_name.to_string(),
            state: state.to_string(),
            note: note.to_string(),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO checkpoints (id, execution_id, step_index, step_name, state, note, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.id)
        .bind(row.execution_id)
        .bind(row.step_index)
        .bind(&row.step_name)
        .bind(&row.state)
        .bind(&row.note)
        .bind(row.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE executions SET latest_checkpoint_id = ? WHERE id = ?")
            .bind(row.id)
            .bind(execution.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row)
    }

    /// The execution's latest checkpoint, by pointer.
    ///
    /// # Errors
    /// Database failure.
    pub async fn latest_checkpoint(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<CheckpointRow>, StoreError> {
        Ok(sqlx::query_as::<_, CheckpointRow>(
            "SELECT c.* FROM checkpoints c
             JOIN executions e ON e.latest_checkpoint_id = c.id
             WHERE e.id = ?",
        )
        .bind(execution_id)
        .fetch_optional(self.pool())
        .await?)
    }

    /// Fetch one checkpoint by id.
    ///
    /// # Errors
    /// [`StoreError::CheckpointNotFound`] or database failure.
    pub async fn get_checkpoint(&self, id: Uuid) -> Result<CheckpointRow, StoreError> {
        sqlx::query_as::<_, CheckpointRow>("SELECT * FROM checkpoints WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(StoreError::CheckpointNotFound { id })
    }

    /// All checkpoints for an execution, oldest first. Retained for audit.
    ///
    /// # Errors
    /// Database failure.
    pub async fn checkpoints_for(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<CheckpointRow>, StoreError> {
        Ok(sqlx::query_as::<_, CheckpointRow>(
            "SELECT * FROM checkpoints WHERE execution_id = ?
             ORDER BY step_index, created_at, id",
        )
        .bind(execution_id)
        .fetch_all(self.pool())
        .await?)
    }
}
