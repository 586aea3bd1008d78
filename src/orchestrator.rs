//! The top-level façade.
//!
//! [`Orchestrator::bootstrap`] validates configuration, acquires the
//! runtime lock, opens the store (running migrations), loads the workflow
//! registry, and constructs the gateway and engine. Every public operation
//! returns a typed result or a typed error; nothing here panics on a
//! recoverable condition.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;
use uuid::Uuid;

use smartspec_config::{Config, validate as validate_config};
use smartspec_engine::{
    Engine, EngineEvent, EngineSettings, ExecutionSnapshot, InterruptResponse,
};
use smartspec_gateway::Gateway;
use smartspec_registry::{
    BundleState, QueryIntent, Recommendation, RoutedQuery, UniversalFlag, WorkflowRegistry,
    classify_query, observe_bundle, recommend,
};
use smartspec_store::{CreditTransaction, Role, Store};
use smartspec_utils::paths::RepoLayout;
use smartspec_utils::process_lock::ProcessLock;
use smartspec_utils::{SmartSpecError, SpecId};
use smartspec_verifier::{VerificationReport, Verifier};

use crate::workflows::{WorkflowContext, build_plan};

/// Email of the implicit local operator account the CLI runs under.
const OPERATOR_EMAIL: &str = "operator@local";

/// Result of a natural-language `ask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResult {
    pub routed: RoutedQuery,
    pub outcome: AskOutcome,
}

/// What the orchestrator did with a routed query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AskOutcome {
    Status {
        spec_id: Option<String>,
        bundle: Option<BundleState>,
        executions: Vec<ExecutionSnapshot>,
    },
    Recommendation {
        spec_id: String,
        recommendation: Recommendation,
    },
    Existence {
        spec_id: String,
        exists: bool,
    },
    Guidance {
        message: String,
    },
}

/// The orchestrator owns every subsystem for one repository.
pub struct Orchestrator {
    layout: RepoLayout,
    store: Store,
    registry: WorkflowRegistry,
    gateway: Arc<Gateway>,
    engine: Engine,
    verifier: Verifier,
    operator_id: Uuid,
    _process_lock: ProcessLock,
}

impl Orchestrator {
    /// Startup sequence: config validation, directory checks, runtime
    /// lock, migrations, registry discovery, gateway and engine
    /// construction. Any failure aborts with a typed diagnostic.
    ///
    /// # Errors
    /// The first failing startup stage's error.
    pub async fn bootstrap(config: Config, repo_root: Utf8PathBuf) -> Result<Self, SmartSpecError> {
        validate_config(&config)
            .map_err(|e| SmartSpecError::validation(format!("configuration invalid: {e}")))?;

        let layout = RepoLayout::new(repo_root);
        layout
            .ensure_runtime_tree()
            .map_err(|e| SmartSpecError::io(layout.runtime_dir().as_str(), e))?;
        let process_lock = ProcessLock::acquire(&layout.runtime_dir().join("engine.lock"))?;

        let store = Store::open(&resolve_database_url(&config, &layout))
            .await
            .map_err(SmartSpecError::from)?;

        let registry = WorkflowRegistry::discover(&layout.workflows_dir())
            .map_err(SmartSpecError::from)?;

        let gateway = Arc::new(Gateway::from_config(&config, store.clone()));
        let engine = Engine::new(
            store.clone(),
            EngineSettings::from_config(&config.engine),
            layout.root().to_owned(),
        );
        let verifier = Verifier::new(
            config.verifier.fuzzy_threshold,
            config.verifier.max_suggestions,
        );

        let operator_id = match store
            .get_user_by_email(OPERATOR_EMAIL)
            .await
            .map_err(SmartSpecError::from)?
        {
            Some(user) => user.id,
            None => {
                store
                    .create_user(OPERATOR_EMAIL, "local-operator", Role::Admin)
                    .await
                    .map_err(SmartSpecError::from)?
                    .id
            }
        };

        info!(workflows = registry.len(), "orchestrator ready");
        Ok(Self {
            layout,
            store,
            registry,
            gateway,
            engine,
            verifier,
            operator_id,
            _process_lock: process_lock,
        })
    }

    /// Drain running executions and flush the store.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
        self.store.close().await;
    }

    /// Pure, read-only recommendation for a spec.
    ///
    /// # Errors
    /// Invalid spec id; IO failure observing the bundle.
    pub fn recommend(
        &self,
        spec_id: &str,
        prompt_supplied: bool,
    ) -> Result<Recommendation, SmartSpecError> {
        let spec_id = SpecId::parse(spec_id)
            .map_err(|e| SmartSpecError::validation(e.to_string()))?;
        let state = observe_bundle(&self.layout, &spec_id)
            .map_err(|e| SmartSpecError::io(spec_id.to_string(), e))?;
        Ok(recommend(&state, prompt_supplied))
    }

    /// Start a workflow; returns the execution id immediately.
    ///
    /// # Errors
    /// Unknown workflow, flag violations (`governance_error`), invalid
    /// spec id, bundle busy, or store failures.
    pub async fn execute(
        &self,
        workflow: &str,
        args: serde_json::Value,
        flags: &[UniversalFlag],
    ) -> Result<Uuid, SmartSpecError> {
        let descriptor = self
            .registry
            .get(workflow)
            .ok_or_else(|| SmartSpecError::validation(format!("unknown workflow '{workflow}'")))?;
        descriptor.check_flags(flags)?;

        let ctx = self.workflow_context(&args, flags)?;
        let plan = build_plan(workflow, ctx)?;
        let flag_names: Vec<String> = flags.iter().map(ToString::to_string).collect();
        Ok(self.engine.execute(plan, args, &flag_names).await?)
    }

    /// Polling surface with progress-bar data.
    ///
    /// # Errors
    /// Unknown execution.
    pub async fn status(&self, execution_id: Uuid) -> Result<ExecutionSnapshot, SmartSpecError> {
        Ok(self.engine.status(execution_id).await?)
    }

    /// The execution's event stream (single consumer, ends at the terminal
    /// event).
    ///
    /// # Errors
    /// Unknown execution or already-consumed stream.
    pub fn events(
        &self,
        execution_id: Uuid,
    ) -> Result<UnboundedReceiverStream<EngineEvent>, SmartSpecError> {
        Ok(self.engine.events(execution_id)?)
    }

    /// Answer a human-in-the-loop interrupt.
    ///
    /// # Errors
    /// Unknown interrupt id.
    pub fn respond(
        &self,
        interrupt_id: Uuid,
        response: InterruptResponse,
    ) -> Result<(), SmartSpecError> {
        Ok(self.engine.respond(interrupt_id, response)?)
    }

    /// Cooperative cancel; a no-op for terminal executions.
    ///
    /// # Errors
    /// Unknown execution.
    pub async fn cancel(&self, execution_id: Uuid) -> Result<(), SmartSpecError> {
        Ok(self.engine.cancel(execution_id).await?)
    }

    /// Resume from a checkpoint into a new execution.
    ///
    /// # Errors
    /// Unknown checkpoint, governance violations for the resumed workflow,
    /// or bundle busy.
    pub async fn resume(
        &self,
        checkpoint_id: Uuid,
        flags: &[UniversalFlag],
    ) -> Result<Uuid, SmartSpecError> {
        let checkpoint = self
            .store
            .get_checkpoint(checkpoint_id)
            .await
            .map_err(SmartSpecError::from)?;
        let source = self
            .store
            .get_execution(checkpoint.execution_id)
            .await
            .map_err(SmartSpecError::from)?;

        let descriptor = self.registry.get(&source.workflow).ok_or_else(|| {
            SmartSpecError::validation(format!(
                "execution {} ran unknown workflow '{}'",
                source.id, source.workflow
            ))
        })?;
        descriptor.check_flags(flags)?;

        let args: serde_json::Value =
            serde_json::from_str(&source.args).unwrap_or(serde_json::Value::Null);
        let ctx = self.workflow_context(&args, flags)?;
        let plan = build_plan(&source.workflow, ctx)?;
        let flag_names: Vec<String> = flags.iter().map(ToString::to_string).collect();
        Ok(self.engine.resume(checkpoint_id, plan, &flag_names).await?)
    }

    /// Route a natural-language request and dispatch it.
    ///
    /// # Errors
    /// IO failures observing bundles; store failures listing executions.
    pub async fn ask(&self, input: &str) -> Result<AskResult, SmartSpecError> {
        let routed = classify_query(input);
        let outcome = match (routed.intent, &routed.spec_id) {
            (QueryIntent::RecommendationQuery, Some(spec_id)) => AskOutcome::Recommendation {
                spec_id: spec_id.to_string(),
                recommendation: self.recommend(&spec_id.to_string(), false)?,
            },
            (QueryIntent::RecommendationQuery, None) => AskOutcome::Guidance {
                message: "Name a spec id (spec-<category>-<nnn>-<slug>) to get a recommendation."
                    .into(),
            },
            (QueryIntent::ExistenceQuery, Some(spec_id)) => {
                let bundle = self
                    .layout
                    .bundle_dir(spec_id.category(), &spec_id.to_string());
                AskOutcome::Existence {
                    spec_id: spec_id.to_string(),
                    exists: bundle.join("spec.md").is_file(),
                }
            }
            (QueryIntent::ExistenceQuery, None) => AskOutcome::Guidance {
                message: "Name a spec id to check for.".into(),
            },
            (QueryIntent::ComplexQuery, _) => AskOutcome::Guidance {
                message: "That needs more than one step. Run `smartspec recommend <spec-id>` \
                          and follow the pipeline one workflow at a time."
                    .into(),
            },
            (QueryIntent::StatusQuery, spec_id) => {
                let bundle = match spec_id {
                    Some(id) => Some(
                        observe_bundle(&self.layout, id)
                            .map_err(|e| SmartSpecError::io(id.to_string(), e))?,
                    ),
                    None => None,
                };
                let executions = self
                    .store
                    .list_executions()
                    .await
                    .map_err(SmartSpecError::from)?
                    .into_iter()
                    .map(ExecutionSnapshot::from)
                    .collect();
                AskOutcome::Status {
                    spec_id: spec_id.as_ref().map(ToString::to_string),
                    bundle,
                    executions,
                }
            }
        };
        Ok(AskResult { routed, outcome })
    }

    /// Run the verifier directly (the `verify` CLI shortcut).
    ///
    /// # Errors
    /// Verifier errors (missing document, IO).
    pub fn verify(&self, spec_id: &str) -> Result<VerificationReport, SmartSpecError> {
        let spec_id = SpecId::parse(spec_id)
            .map_err(|e| SmartSpecError::validation(e.to_string()))?;
        let rel = format!("specs/{}/{spec_id}/tasks.md", spec_id.category());
        Ok(self
            .verifier
            .verify(self.layout.root().as_std_path(), &rel)?)
    }

    /// Credit a top-up to the operator account.
    ///
    /// # Errors
    /// Store failures.
    pub async fn topup(&self, paid_usd: f64) -> Result<CreditTransaction, SmartSpecError> {
        Ok(self.gateway.topup(self.operator_id, paid_usd).await?)
    }

    /// Operator balance and ledger.
    ///
    /// # Errors
    /// Store failures.
    pub async fn credit_history(
        &self,
    ) -> Result<(i64, Vec<CreditTransaction>), SmartSpecError> {
        let balance = self
            .store
            .balance(self.operator_id)
            .await
            .map_err(SmartSpecError::from)?;
        let history = self
            .store
            .transaction_history(self.operator_id)
            .await
            .map_err(SmartSpecError::from)?;
        Ok((balance, history))
    }

    /// Enable or disable a provider at runtime.
    pub fn set_provider_enabled(&self, name: &str, enabled: bool) {
        self.gateway.set_provider_enabled(name, enabled);
    }

    #[must_use]
    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    #[must_use]
    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    fn workflow_context(
        &self,
        args: &serde_json::Value,
        flags: &[UniversalFlag],
    ) -> Result<WorkflowContext, SmartSpecError> {
        let spec_id = args
            .get("spec_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SmartSpecError::validation("missing required argument 'spec_id'"))?;
        let spec_id = SpecId::parse(spec_id)
            .map_err(|e| SmartSpecError::validation(e.to_string()))?;
        Ok(WorkflowContext {
            layout: self.layout.clone(),
            gateway: Arc::clone(&self.gateway),
            verifier: self.verifier.clone(),
            user_id: self.operator_id,
            spec_id,
            validate_only: flags.contains(&UniversalFlag::ValidateOnly),
        })
    }
}

fn resolve_database_url(config: &Config, layout: &RepoLayout) -> String {
    let url = &config.store.database_url;
    match url.strip_prefix("sqlite://") {
        Some(path) if !path.starts_with('/') && !path.starts_with(':') => {
            format!("sqlite://{}", layout.root().join(path))
        }
        _ => url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_sqlite_urls_resolve_against_the_root() {
        let config = Config::default();
        let layout = RepoLayout::new(Utf8PathBuf::from("/repo"));
        assert_eq!(
            resolve_database_url(&config, &layout),
            "sqlite:///repo/.spec/smartspec.db"
        );

        let mut absolute = Config::default();
        absolute.store.database_url = "sqlite:///var/db/s.db".into();
        assert_eq!(
            resolve_database_url(&absolute, &layout),
            "sqlite:///var/db/s.db"
        );

        let mut memory = Config::default();
        memory.store.database_url = "sqlite://:memory:".into();
        assert_eq!(resolve_database_url(&memory, &layout), "sqlite://:memory:");
    }
}
