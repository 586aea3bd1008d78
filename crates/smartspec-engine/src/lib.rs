//! Checkpointed workflow execution engine.
//!
//! [`Engine::execute`] spawns an execution and returns its id immediately;
//! progress arrives on the event stream and the polling surface. Every
//! step boundary writes a checkpoint, cancellation is cooperative with a
//! hard-stop grace period, and resume re-enters after the last completed
//! step of a saved checkpoint.

mod bundle_lock;
mod error;
mod events;
mod executor;
mod interrupt;
mod step;

pub use bundle_lock::{BundleGuard, BundleLockRegistry};
pub use error::EngineError;
pub use events::{EngineEvent, EngineEventKind, EventEmitter, ProgressHandle};
pub use interrupt::{InterruptRegistry, InterruptResponse};
pub use step::{
    FailurePolicy, FnStep, PlannedStep, Step, StepContext, StepResult, WorkflowPlan, WorkflowState,
};

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use smartspec_config::EngineConfig;
use smartspec_store::{ExecutionRow, ExecutionStatus, Store};

/// Engine tuning, resolved from `[engine]` configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub fan_out: usize,
    pub step_grace: Duration,
    pub execution_timeout: Duration,
    pub interrupt_deadline: Duration,
}

impl EngineSettings {
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            fan_out: config.fan_out,
            step_grace: Duration::from_secs(config.step_grace_secs),
            execution_timeout: Duration::from_secs(config.execution_timeout_secs),
            interrupt_deadline: Duration::from_secs(config.interrupt_deadline_secs),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Polling view of one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub id: Uuid,
    pub workflow: String,
    pub status: ExecutionStatus,
    pub current_step: i64,
    pub total_steps: i64,
    /// Completed fraction in [0, 1] for progress bars.
    pub progress: f64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub latest_checkpoint_id: Option<Uuid>,
}

impl From<ExecutionRow> for ExecutionSnapshot {
    fn from(row: ExecutionRow) -> Self {
        let progress = if row.total_steps > 0 {
            row.current_step as f64 / row.total_steps as f64
        } else {
            0.0
        };
        Self {
            id: row.id,
            workflow: row.workflow,
            status: row.status,
            current_step: row.current_step,
            total_steps: row.total_steps,
            progress,
            started_at: row.started_at,
            ended_at: row.ended_at,
            latest_checkpoint_id: row.latest_checkpoint_id,
        }
    }
}

struct ExecutionHandle {
    cancel: CancellationToken,
    events: Option<UnboundedReceiver<EngineEvent>>,
    join: Option<JoinHandle<()>>,
}

/// The execution engine.
pub struct Engine {
    store: Store,
    settings: EngineSettings,
    repo_root: Utf8PathBuf,
    bundles: BundleLockRegistry,
    interrupts: Arc<InterruptRegistry>,
    executions: Mutex<HashMap<Uuid, ExecutionHandle>>,
}

impl Engine {
    #[must_use]
    pub fn new(store: Store, settings: EngineSettings, repo_root: Utf8PathBuf) -> Self {
        Self {
            store,
            settings,
            repo_root,
            bundles: BundleLockRegistry::new(),
            interrupts: Arc::new(InterruptRegistry::new()),
            executions: Mutex::new(HashMap::new()),
        }
    }

    /// Start an execution; returns its id immediately.
    ///
    /// `args` becomes the initial workflow state under `"args"`. `flags`
    /// are recorded on the execution row for audit.
    ///
    /// # Errors
    /// [`EngineError::InvalidPlan`], [`EngineError::BundleBusy`], or store
    /// failures. Governance is the caller's concern and is checked before
    /// this point.
    pub async fn execute(
        &self,
        plan: WorkflowPlan,
        args: serde_json::Value,
        flags: &[String],
    ) -> Result<Uuid, EngineError> {
        plan.validate()?;

        let bundle_guard = match &plan.bundle_key {
            Some(spec_id) => Some(self.bundles.try_acquire(spec_id)?),
            None => None,
        };

        let row = self
            .store
            .create_execution(&plan.workflow, args.clone(), flags, plan.steps.len())
            .await?;
        let execution_id = row.id;

        let state = WorkflowState::new(serde_json::json!({ "args": args }));
        self.spawn_run(plan, execution_id, state, Default::default(), bundle_guard);
        info!(execution = %execution_id, "execution started");
        Ok(execution_id)
    }

    fn spawn_run(
        &self,
        plan: WorkflowPlan,
        execution_id: Uuid,
        state: WorkflowState,
        completed: std::collections::HashSet<String>,
        bundle_guard: Option<BundleGuard>,
    ) {
        let (mut emitter, events_rx) = EventEmitter::new(execution_id);
        if let Some(file) = self.open_event_log(&plan.workflow, execution_id) {
            emitter = emitter.with_sink(file);
        }
        let cancel = CancellationToken::new();
        let run = executor::ExecutionRun {
            store: self.store.clone(),
            emitter,
            interrupts: Arc::clone(&self.interrupts),
            settings: self.settings,
            plan: Arc::new(plan),
            execution_id,
            repo_root: self.repo_root.clone(),
            state,
            completed,
            cancel: cancel.clone(),
            bundle_guard,
        };
        let join = tokio::spawn(run.run());
        self.executions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                execution_id,
                ExecutionHandle {
                    cancel,
                    events: Some(events_rx),
                    join: Some(join),
                },
            );
    }

    /// JSONL event log under `.spec/reports/<workflow>/<execution-id>/`,
    /// opened through the same containment check as every other write.
    fn open_event_log(&self, workflow: &str, execution_id: Uuid) -> Option<std::fs::File> {
        let relative = format!(".spec/reports/{workflow}/{execution_id}/events.jsonl");
        let target = smartspec_utils::paths::WriteScope::check(&self.repo_root, &relative).ok()?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).ok()?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(target)
            .ok()
    }

    /// Polling surface.
    ///
    /// # Errors
    /// Unknown execution or store failure.
    pub async fn status(&self, execution_id: Uuid) -> Result<ExecutionSnapshot, EngineError> {
        Ok(self.store.get_execution(execution_id).await?.into())
    }

    /// Take the execution's event stream. Single-consumer: events are seen
    /// exactly once, and the stream ends after the terminal event (the
    /// emitter closes with the run).
    ///
    /// # Errors
    /// [`EngineError::StreamConsumed`] on a second call;
    /// [`EngineError::ExecutionNotFound`] for an unknown id.
    pub fn events(
        &self,
        execution_id: Uuid,
    ) -> Result<UnboundedReceiverStream<EngineEvent>, EngineError> {
        let mut executions = self.executions.lock().unwrap_or_else(|e| e.into_inner());
        let handle = executions
            .get_mut(&execution_id)
            .ok_or(EngineError::ExecutionNotFound { id: execution_id })?;
        let receiver = handle
            .events
            .take()
            .ok_or(EngineError::StreamConsumed { id: execution_id })?;
        Ok(UnboundedReceiverStream::new(receiver))
    }

    /// Cooperative cancel. A no-op for terminal executions.
    ///
    /// # Errors
    /// Unknown execution.
    pub async fn cancel(&self, execution_id: Uuid) -> Result<(), EngineError> {
        let row = self.store.get_execution(execution_id).await?;
        if row.status.is_terminal() {
            return Ok(());
        }
        let executions = self.executions.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = executions.get(&execution_id) {
            handle.cancel.cancel();
        }
        Ok(())
    }

    /// Answer an open interrupt.
    ///
    /// # Errors
    /// [`EngineError::UnknownInterrupt`].
    pub fn respond(
        &self,
        interrupt_id: Uuid,
        response: InterruptResponse,
    ) -> Result<(), EngineError> {
        self.interrupts.respond(interrupt_id, response)
    }

    /// Resume from a checkpoint: a new execution re-enters after the last
    /// completed step with the saved state. Resuming the latest checkpoint
    /// of a completed execution is a no-op returning the original id.
    ///
    /// # Errors
    /// Unknown checkpoint, invalid plan, bundle busy, or store failure.
    pub async fn resume(
        &self,
        checkpoint_id: Uuid,
        plan: WorkflowPlan,
        flags: &[String],
    ) -> Result<Uuid, EngineError> {
        plan.validate()?;
        let checkpoint = self.store.get_checkpoint(checkpoint_id).await?;
        let source = self.store.get_execution(checkpoint.execution_id).await?;

        if source.status == ExecutionStatus::Completed
            && source.latest_checkpoint_id == Some(checkpoint.id)
        {
            return Ok(source.id);
        }

        let (completed, state_value) = executor::parse_checkpoint_state(&checkpoint.state);
        let args: serde_json::Value =
            serde_json::from_str(&source.args).unwrap_or(serde_json::Value::Null);

        let bundle_guard = match &plan.bundle_key {
            Some(spec_id) => Some(self.bundles.try_acquire(spec_id)?),
            None => None,
        };

        let row = self
            .store
            .create_execution(&plan.workflow, args, flags, plan.steps.len())
            .await?;
        let execution_id = row.id;
        // Seed step progress so the snapshot reflects skipped work.
        self.store
            .set_current_step(execution_id, completed.len())
            .await?;

        let state = WorkflowState::new(state_value);
        self.spawn_run(plan, execution_id, state, completed, bundle_guard);
        info!(execution = %execution_id, from_checkpoint = %checkpoint_id, "execution resumed");
        Ok(execution_id)
    }

    /// Wait for one execution's runner task to finish. Test and shutdown
    /// surface; production callers poll or stream instead.
    pub async fn wait(&self, execution_id: Uuid) {
        let join = {
            let mut executions = self.executions.lock().unwrap_or_else(|e| e.into_inner());
            executions
                .get_mut(&execution_id)
                .and_then(|handle| handle.join.take())
        };
        if let Some(join) = join {
            let _ = join.await;
        }
    }

    /// Drain every running execution (shutdown sequence).
    pub async fn shutdown(&self) {
        let joins: Vec<JoinHandle<()>> = {
            let mut executions = self.executions.lock().unwrap_or_else(|e| e.into_inner());
            executions
                .values_mut()
                .filter_map(|handle| handle.join.take())
                .collect()
        };
        for join in joins {
            let _ = join.await;
        }
    }
}
