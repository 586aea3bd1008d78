//! Step and workflow plan model.
//!
//! A workflow is an ordered list of named steps with optional dependencies
//! (a DAG; a plain list means a linear chain). Step bodies receive a
//! [`StepContext`]: shared JSON state, a cancellation token to observe at
//! suspension points, a progress handle, and a write-scope-enforced file
//! writer.

use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use smartspec_utils::SmartSpecError;
use smartspec_utils::atomic_write::write_file_atomic;
use smartspec_utils::paths::WriteScope;

use crate::error::EngineError;
use crate::events::ProgressHandle;

/// Shared workflow state: a JSON object both steps and checkpoints see.
#[derive(Clone, Default)]
pub struct WorkflowState {
    inner: Arc<Mutex<Value>>,
}

impl WorkflowState {
    #[must_use]
    pub fn new(initial: Value) -> Self {
        let initial = if initial.is_object() {
            initial
        } else {
            Value::Object(serde_json::Map::new())
        };
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    /// Read one key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Write one key.
    pub fn set(&self, key: &str, value: Value) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Value::Object(map) = &mut *guard {
            map.insert(key.to_string(), value);
        }
    }

    /// Shallow-merge another object into the state (HITL `modify`).
    pub fn merge(&self, patch: &Value) {
        if let Value::Object(patch) = patch {
            let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if let Value::Object(map) = &mut *guard {
                for (k, v) in patch {
                    map.insert(k.clone(), v.clone());
                }
            }
        }
    }

    /// Snapshot for checkpointing.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Context handed to each step body.
#[derive(Clone)]
pub struct StepContext {
    pub execution_id: Uuid,
    pub repo_root: Utf8PathBuf,
    pub state: WorkflowState,
    /// Observe at every suspension point; return promptly when signalled.
    pub cancel: CancellationToken,
    pub progress: ProgressHandle,
}

impl StepContext {
    /// Write a file through the engine's scope check: only `specs/**` and
    /// `.spec/**` are writable, and only `specs/**` with prior governance
    /// approval (checked before the execution started).
    ///
    /// # Errors
    /// `validation_error` on a scope violation; IO failures from the write.
    pub fn write_scoped(&self, relative: &str, content: &str) -> Result<(), SmartSpecError> {
        let target = WriteScope::check(&self.repo_root, relative)?;
        write_file_atomic(&target, content)
            .map_err(|e| SmartSpecError::io(relative, std::io::Error::other(e.to_string())))
    }
}

/// Outcome of a step body.
pub type StepResult = Result<(), SmartSpecError>;

/// One executable workflow step.
#[async_trait]
pub trait Step: Send + Sync {
    /// Step name, unique within its plan.
    fn name(&self) -> &str;

    /// Run the step. Bodies suspend only at IO, subprocess, LLM, database,
    /// or explicit yield boundaries, and check `ctx.cancel` at each.
    async fn run(&self, ctx: StepContext) -> StepResult;
}

/// What happens to siblings when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Cancel remaining work on first failure.
    #[default]
    FailFast,
    /// Keep scheduling; the execution still fails at the end.
    ContinueOnError,
}

/// A step plus its declared dependencies (by step name).
pub struct PlannedStep {
    pub step: Arc<dyn Step>,
    pub deps: Vec<String>,
}

/// A full workflow plan.
pub struct WorkflowPlan {
    pub workflow: String,
    pub steps: Vec<PlannedStep>,
    pub failure_policy: FailurePolicy,
    /// Fan-out bound within this execution; clamped by the engine config.
    pub parallelism: usize,
    /// Step names after which the engine pauses for a human response.
    pub interrupt_after: Vec<String>,
    /// Spec id whose bundle mutex must be held (governed writers only).
    pub bundle_key: Option<String>,
}

impl WorkflowPlan {
    /// Linear plan: each step depends on the previous one.
    #[must_use]
    pub fn linear(workflow: impl Into<String>, steps: Vec<Arc<dyn Step>>) -> Self {
        let mut planned = Vec::with_capacity(steps.len());
        let mut prev: Option<String> = None;
        for step in steps {
            let deps = prev.iter().cloned().collect();
            prev = Some(step.name().to_string());
            planned.push(PlannedStep { step, deps });
        }
        Self {
            workflow: workflow.into(),
            steps: planned,
            failure_policy: FailurePolicy::FailFast,
            parallelism: 1,
            interrupt_after: Vec::new(),
            bundle_key: None,
        }
    }

    /// DAG plan with explicit dependencies.
    #[must_use]
    pub fn dag(
        workflow: impl Into<String>,
        steps: Vec<PlannedStep>,
        parallelism: usize,
    ) -> Self {
        Self {
            workflow: workflow.into(),
            steps,
            failure_policy: FailurePolicy::FailFast,
            parallelism: parallelism.max(1),
            interrupt_after: Vec::new(),
            bundle_key: None,
        }
    }

    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    #[must_use]
    pub fn with_interrupt_after(mut self, step: impl Into<String>) -> Self {
        self.interrupt_after.push(step.into());
        self
    }

    #[must_use]
    pub fn with_bundle_key(mut self, spec_id: impl Into<String>) -> Self {
        self.bundle_key = Some(spec_id.into());
        self
    }

    /// Validate names are unique and every dependency exists and the graph
    /// is acyclic.
    ///
    /// # Errors
    /// [`EngineError::InvalidPlan`] naming the problem.
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut names = HashMap::new();
        for (i, planned) in self.steps.iter().enumerate() {
            if names.insert(planned.step.name().to_string(), i).is_some() {
                return Err(EngineError::InvalidPlan {
                    reason: format!("duplicate step name '{}'", planned.step.name()),
                });
            }
        }
        for planned in &self.steps {
            for dep in &planned.deps {
                if !names.contains_key(dep) {
                    return Err(EngineError::InvalidPlan {
                        reason: format!(
                            "step '{}' depends on unknown step '{dep}'",
                            planned.step.name()
                        ),
                    });
                }
            }
        }
        // Kahn's algorithm; leftovers mean a cycle.
        let mut in_degree: HashMap<&str, usize> = self
            .steps
            .iter()
            .map(|p| (p.step.name(), p.deps.len()))
            .collect();
        let mut queue: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut visited = 0;
        while let Some(name) = queue.pop() {
            visited += 1;
            for planned in &self.steps {
                if planned.deps.iter().any(|d| d == name) {
                    let entry = in_degree.get_mut(planned.step.name()).expect("known step");
                    *entry -= 1;
                    if *entry == 0 {
                        queue.push(planned.step.name());
                    }
                }
            }
        }
        if visited != self.steps.len() {
            return Err(EngineError::InvalidPlan {
                reason: "dependency cycle detected".into(),
            });
        }
        Ok(())
    }
}

/// Build a step from a name and an async closure. The workhorse for
/// builtin workflows and tests.
pub struct FnStep<F> {
    name: String,
    body: F,
}

impl<F, Fut> FnStep<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = StepResult> + Send,
{
    #[must_use]
    pub fn new(name: impl Into<String>, body: F) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            body,
        })
    }
}

#[async_trait]
impl<F, Fut> Step for FnStep<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = StepResult> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: StepContext) -> StepResult {
        (self.body)(ctx).await
    }
}
