//! The execution loop.
//!
//! Ready steps (dependencies satisfied) run concurrently up to the fan-out
//! bound. The loop suspends only at step boundaries, where it also observes
//! the cancel token and the execution deadline. Checkpoints are written
//! immediately before a step is entered and again after it completes;
//! `step_index` is the count of completed steps, so it never regresses
//! under parallelism.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use uuid::Uuid;

use camino::Utf8PathBuf;
use smartspec_store::{ExecutionStatus, Store};

use crate::bundle_lock::BundleGuard;
use crate::events::{EngineEventKind, EventEmitter, ProgressHandle};
use crate::interrupt::{InterruptRegistry, InterruptResponse};
use crate::step::{FailurePolicy, StepContext, WorkflowPlan, WorkflowState};
use crate::EngineSettings;

/// Everything one running execution needs.
pub(crate) struct ExecutionRun {
    pub store: Store,
    pub emitter: EventEmitter,
    pub interrupts: Arc<InterruptRegistry>,
    pub settings: EngineSettings,
    pub plan: Arc<WorkflowPlan>,
    pub execution_id: Uuid,
    pub repo_root: Utf8PathBuf,
    pub state: WorkflowState,
    /// Step names already completed (non-empty when resuming).
    pub completed: HashSet<String>,
    pub cancel: CancellationToken,
    /// Held for the lifetime of the run; released on drop.
    pub bundle_guard: Option<BundleGuard>,
}

/// How the run ended. Also recorded in the store.
enum RunEnd {
    Completed,
    Failed(String),
    Cancelled,
}

impl ExecutionRun {
    /// Drive the execution to a terminal state. Never returns an error:
    /// every failure becomes a terminal event plus a store update.
    pub async fn run(mut self) {
        if let Err(e) = self
            .store
            .set_execution_status(self.execution_id, ExecutionStatus::Running)
            .await
        {
            error!(execution = %self.execution_id, error = %e, "failed to mark execution running");
            return;
        }
        self.emitter.emit(EngineEventKind::WorkflowStarted {
            workflow: self.plan.workflow.clone(),
            total_steps: self.plan.steps.len(),
        });

        let deadline = Instant::now() + self.settings.execution_timeout;
        let end = self.run_inner(deadline).await;

        let (status, event) = match end {
            RunEnd::Completed => (ExecutionStatus::Completed, EngineEventKind::WorkflowCompleted),
            RunEnd::Failed(error) => (
                ExecutionStatus::Failed,
                EngineEventKind::WorkflowFailed { error },
            ),
            RunEnd::Cancelled => (ExecutionStatus::Stopped, EngineEventKind::WorkflowCancelled),
        };

        self.write_checkpoint("final", "final state").await;
        if let Err(e) = self
            .store
            .set_execution_status(self.execution_id, status)
            .await
        {
            error!(execution = %self.execution_id, error = %e, "failed to record terminal status");
        }
        self.emitter.emit(event);
        // Bundle lock releases here, after the final checkpoint is durable.
        drop(self.bundle_guard.take());
    }

    async fn run_inner(&mut self, deadline: Instant) -> RunEnd {
        let total = self.plan.steps.len();
        let bound = self
            .plan
            .parallelism
            .min(self.settings.fan_out)
            .max(1);

        // Cancelling this child token stops sibling steps without touching
        // the caller's token.
        let step_cancel = self.cancel.child_token();
        let mut running: JoinSet<(String, Result<(), String>)> = JoinSet::new();
        let mut scheduled: HashSet<String> = self.completed.clone();
        let mut first_failure: Option<String> = None;

        loop {
            // Schedule every ready step, up to the fan-out bound.
            if first_failure.is_none() || self.plan.failure_policy == FailurePolicy::ContinueOnError
            {
                for planned in &self.plan.steps {
                    if running.len() >= bound {
                        break;
                    }
                    let name = planned.step.name().to_string();
                    if scheduled.contains(&name) {
                        continue;
                    }
                    if !planned.deps.iter().all(|d| self.completed.contains(d)) {
                        continue;
                    }
                    scheduled.insert(name.clone());

                    if !self
                        .checkpoint(self.completed.len() as i64, &name, &format!("entering step {name}"))
                        .await
                    {
                        return RunEnd::Failed("checkpoint write failed".into());
                    }
                    self.emitter
                        .emit(EngineEventKind::StepStarted { step: name.clone() });

                    let step = Arc::clone(&planned.step);
                    let ctx = StepContext {
                        execution_id: self.execution_id,
                        repo_root: self.repo_root.clone(),
                        state: self.state.clone(),
                        cancel: step_cancel.clone(),
                        progress: ProgressHandle::new(self.emitter.clone(), name.clone()),
                    };
                    running.spawn(async move {
                        let result = step.run(ctx).await.map_err(|e| e.to_string());
                        (step.name().to_string(), result)
                    });
                }
            }

            if self.completed.len() == total && running.is_empty() {
                return match first_failure {
                    None => RunEnd::Completed,
                    Some(error) => RunEnd::Failed(error),
                };
            }
            if running.is_empty() {
                // Nothing runnable and nothing running: remaining steps are
                // unreachable (failed dependency or fail-fast skip).
                return RunEnd::Failed(
                    first_failure
                        .unwrap_or_else(|| "unsatisfiable step dependencies".to_string()),
                );
            }

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    self.drain(&step_cancel, &mut running).await;
                    return RunEnd::Cancelled;
                }

                () = tokio::time::sleep_until(deadline) => {
                    self.drain(&step_cancel, &mut running).await;
                    return RunEnd::Failed(format!(
                        "execution timed out after {}s",
                        self.settings.execution_timeout.as_secs()
                    ));
                }

                joined = running.join_next() => {
                    let (name, result) = match joined {
                        Some(Ok(pair)) => pair,
                        Some(Err(join_error)) => {
                            ("<panicked step>".to_string(), Err(join_error.to_string()))
                        }
                        None => continue,
                    };

                    match result {
                        Ok(()) => {
                            self.completed.insert(name.clone());
                            let index = self.completed.len() as i64;
                            let _ = self
                                .store
                                .set_current_step(self.execution_id, self.completed.len())
                                .await;
                            if !self
                                .checkpoint(index, &name, &format!("completed step {name}"))
                                .await
                            {
                                return RunEnd::Failed("checkpoint write failed".into());
                            }
                            self.emitter
                                .emit(EngineEventKind::StepCompleted { step: name.clone() });

                            if self.plan.interrupt_after.contains(&name) {
                                match self.pause_for_interrupt(&name).await {
                                    PauseOutcome::Resumed => {}
                                    PauseOutcome::Rejected => {
                                        self.drain(&step_cancel, &mut running).await;
                                        return RunEnd::Failed(format!(
                                            "interrupt after step '{name}' was rejected"
                                        ));
                                    }
                                    PauseOutcome::TimedOut => {
                                        self.drain(&step_cancel, &mut running).await;
                                        return RunEnd::Failed("interrupt_timeout".into());
                                    }
                                    PauseOutcome::Cancelled => {
                                        self.drain(&step_cancel, &mut running).await;
                                        return RunEnd::Cancelled;
                                    }
                                }
                            }
                        }
                        Err(error) => {
                            warn!(execution = %self.execution_id, step = %name, %error, "step failed");
                            self.emitter.emit(EngineEventKind::StepFailed {
                                step: name.clone(),
                                error: error.clone(),
                            });
                            if first_failure.is_none() {
                                first_failure = Some(format!("step '{name}' failed: {error}"));
                            }
                            if self.plan.failure_policy == FailurePolicy::FailFast {
                                self.drain(&step_cancel, &mut running).await;
                                return RunEnd::Failed(
                                    first_failure.expect("failure recorded above"),
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    /// Cooperative drain: signal the step token, wait out the grace period,
    /// then hard-stop whatever ignored it.
    async fn drain(
        &self,
        step_cancel: &CancellationToken,
        running: &mut JoinSet<(String, Result<(), String>)>,
    ) {
        step_cancel.cancel();
        let grace = self.settings.step_grace;
        let drained = tokio::time::timeout(grace, async {
            while running.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                execution = %self.execution_id,
                grace_secs = grace.as_secs(),
                "steps ignored cancellation past the grace period; hard-stopping"
            );
            running.abort_all();
            while running.join_next().await.is_some() {}
        }
    }

    /// HITL pause at a declared step boundary.
    async fn pause_for_interrupt(&mut self, step: &str) -> PauseOutcome {
        let (interrupt_id, receiver) = self.interrupts.register();
        let _ = self
            .store
            .set_execution_status(self.execution_id, ExecutionStatus::Paused)
            .await;
        self.emitter.emit(EngineEventKind::WorkflowPaused {
            reason: format!("awaiting response after step '{step}'"),
            interrupt_id,
        });

        let outcome = tokio::select! {
            response = receiver => match response {
                Ok(InterruptResponse::Approve) => PauseOutcome::Resumed,
                Ok(InterruptResponse::Reject) => PauseOutcome::Rejected,
                Ok(InterruptResponse::Modify { payload }) => {
                    self.state.merge(&payload);
                    PauseOutcome::Resumed
                }
                Err(_) => PauseOutcome::Rejected,
            },
            () = tokio::time::sleep(self.settings.interrupt_deadline) => {
                self.interrupts.forget(interrupt_id);
                PauseOutcome::TimedOut
            }
            () = self.cancel.cancelled() => {
                self.interrupts.forget(interrupt_id);
                PauseOutcome::Cancelled
            }
        };

        if matches!(outcome, PauseOutcome::Resumed) {
            let _ = self
                .store
                .set_execution_status(self.execution_id, ExecutionStatus::Running)
                .await;
            self.emitter.emit(EngineEventKind::WorkflowResumed);
        }
        outcome
    }

    async fn checkpoint(&self, step_index: i64, step_name: &str, note: &str) -> bool {
        match self
            .store
            .insert_checkpoint(
                self.execution_id,
                step_index,
                step_name,
                checkpoint_state(&self.completed, &self.state),
                note,
            )
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!(execution = %self.execution_id, error = %e, "checkpoint write failed");
                false
            }
        }
    }

    async fn write_checkpoint(&self, step_name: &str, note: &str) {
        let _ = self
            .store
            .insert_checkpoint(
                self.execution_id,
                self.completed.len() as i64,
                step_name,
                checkpoint_state(&self.completed, &self.state),
                note,
            )
            .await;
    }
}

enum PauseOutcome {
    Resumed,
    Rejected,
    TimedOut,
    Cancelled,
}

/// Checkpoint state layout: the engine's completion set plus the
/// workflow-owned snapshot (opaque to the engine).
fn checkpoint_state(completed: &HashSet<String>, state: &WorkflowState) -> Value {
    let mut names: Vec<&String> = completed.iter().collect();
    names.sort();
    serde_json::json!({
        "completed": names,
        "state": state.snapshot(),
    })
}

/// Parse a checkpoint's state back into `(completed, state)` for resume.
#[must_use]
pub(crate) fn parse_checkpoint_state(raw: &str) -> (HashSet<String>, Value) {
    let value: Value = serde_json::from_str(raw).unwrap_or(Value::Null);
    let completed = value
        .get("completed")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let state = value.get("state").cloned().unwrap_or(Value::Null);
    (completed, state)
}
