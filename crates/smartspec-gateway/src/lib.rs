//! Credit-gated LLM gateway.
//!
//! Every model invocation goes through [`Gateway::complete`], which
//! enforces, in order: rate limit, account check, provider selection,
//! pre-flight credit estimate, provider call, and an atomic deduction
//! recorded before the completion is released. Provider failures fall back
//! to the next routing target and never debit.

mod credits;
mod error;
mod provider;
mod providers;
mod ratelimit;
mod routing;

pub use credits::{
    CREDITS_PER_USD, approximate_tokens, estimate_credits, topup_credits, topup_revenue_usd,
    usd_to_credits_ceil,
};
pub use error::GatewayError;
pub use provider::{
    Capabilities, ChatRequest, ChatResponse, Message, Provider, ProviderError, Role, TokenUsage,
    normalize_model_id,
};
pub use providers::{AnthropicProvider, MockProvider, OpenRouterProvider, construct_provider};
pub use ratelimit::RateLimiter;
pub use routing::{BudgetPriority, RoutingTable, TaskClass};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use smartspec_config::Config;
use smartspec_store::{CreditTransaction, Store};

/// Per-provider request parameters taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct ProviderParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ProviderParams {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.2,
        }
    }
}

/// A completion request entering the gateway.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub user_id: Uuid,
    pub task: TaskClass,
    pub priority: BudgetPriority,
    pub messages: Vec<Message>,
    /// Expected output size from workflow metadata; the configured
    /// conservative default applies when absent.
    pub expected_output_tokens: Option<u64>,
}

/// A completion leaving the gateway, with its accounting.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    /// Normalized `<provider>/<model>` identifier.
    pub model: String,
    pub provider: String,
    pub usage: TokenUsage,
    pub credits_charged: i64,
    /// Ledger row id; `None` for zero-cost calls, which record nothing.
    pub transaction_id: Option<Uuid>,
}

/// The gateway. Cheap to share behind an `Arc`.
pub struct Gateway {
    store: Store,
    table: RoutingTable,
    providers: HashMap<String, Arc<dyn Provider>>,
    params: HashMap<String, ProviderParams>,
    enabled: RwLock<HashMap<String, bool>>,
    limiter: RateLimiter,
    /// Global bound on in-flight provider requests.
    concurrency: Arc<tokio::sync::Semaphore>,
    markup_rate: f64,
    default_expected_output_tokens: u64,
}

impl Gateway {
    /// Build from validated configuration.
    ///
    /// A provider whose backend cannot be constructed (missing API key) is
    /// registered as disabled with a warning rather than failing bootstrap;
    /// routing skips it like any other disabled provider.
    #[must_use]
    pub fn from_config(config: &Config, store: Store) -> Self {
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        let mut params = HashMap::new();
        let mut enabled = HashMap::new();

        for (name, provider_config) in &config.providers {
            params.insert(
                name.clone(),
                ProviderParams {
                    max_tokens: provider_config.max_tokens,
                    temperature: provider_config.temperature,
                },
            );
            match providers::construct_provider(name, provider_config) {
                Ok(provider) => {
                    providers.insert(name.clone(), provider);
                    enabled.insert(name.clone(), provider_config.enabled);
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "provider disabled: construction failed");
                    enabled.insert(name.clone(), false);
                }
            }
        }

        Self {
            store,
            table: RoutingTable::from_config(config),
            providers,
            params,
            enabled: RwLock::new(enabled),
            limiter: RateLimiter::new(config.gateway.rate_limit_per_minute),
            concurrency: Arc::new(tokio::sync::Semaphore::new(
                config.gateway.max_concurrent_requests,
            )),
            markup_rate: config.gateway.markup_rate,
            default_expected_output_tokens: config.gateway.expected_output_tokens,
        }
    }

    /// Assemble a gateway from parts. Test seam and embedding surface.
    #[must_use]
    pub fn new(
        store: Store,
        table: RoutingTable,
        providers: HashMap<String, Arc<dyn Provider>>,
        rate_limit_per_minute: u32,
        markup_rate: f64,
    ) -> Self {
        let enabled = providers.keys().map(|k| (k.clone(), true)).collect();
        let params = providers
            .keys()
            .map(|k| (k.clone(), ProviderParams::default()))
            .collect();
        Self {
            store,
            table,
            providers,
            params,
            enabled: RwLock::new(enabled),
            limiter: RateLimiter::new(rate_limit_per_minute),
            concurrency: Arc::new(tokio::sync::Semaphore::new(8)),
            markup_rate,
            default_expected_output_tokens: 1024,
        }
    }

    /// Enable or disable a provider at runtime. Takes effect on the next
    /// request; in-flight calls complete under the old setting.
    pub fn set_provider_enabled(&self, name: &str, enabled: bool) {
        self.enabled
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), enabled);
    }

    /// Whether routing currently considers a provider.
    #[must_use]
    pub fn provider_enabled(&self, name: &str) -> bool {
        self.providers.contains_key(name)
            && self
                .enabled
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get(name)
                .copied()
                .unwrap_or(false)
    }

    /// Top up a user's balance: `P` USD becomes
    /// `floor(P * 1000 / (1 + markup))` credits.
    ///
    /// # Errors
    /// Store failures; unknown user.
    pub async fn topup(
        &self,
        user_id: Uuid,
        paid_usd: f64,
    ) -> Result<CreditTransaction, GatewayError> {
        let credits = topup_credits(paid_usd, self.markup_rate);
        let metadata = serde_json::json!({
            "paid_usd": paid_usd,
            "markup_rate": self.markup_rate,
            "revenue_usd": topup_revenue_usd(paid_usd, self.markup_rate),
        });
        Ok(self.store.record_topup(user_id, credits, metadata).await?)
    }

    /// Execute a completion with credit gating and provider fallback.
    ///
    /// # Errors
    /// - [`GatewayError::RateLimited`] before anything else
    /// - [`GatewayError::InsufficientCredits`] from the pre-flight check;
    ///   no provider request is issued and nothing is recorded
    /// - [`GatewayError::NoProviderAvailable`] when every routing target is
    ///   disabled or failed; no debit
    pub async fn complete(&self, request: CompletionRequest) -> Result<Completion, GatewayError> {
        self.limiter
            .check(request.user_id)
            .map_err(|retry_after_secs| GatewayError::RateLimited { retry_after_secs })?;

        let user = self.store.get_user(request.user_id).await?;
        if !user.is_active {
            return Err(GatewayError::UserInactive);
        }

        let targets = self.table.targets(request.task, request.priority);
        if targets.is_empty() {
            return Err(GatewayError::NoProviderAvailable {
                task: request.task.to_string(),
                priority: request.priority.to_string(),
            });
        }

        let input_tokens: u64 = request
            .messages
            .iter()
            .map(|m| approximate_tokens(&m.content))
            .sum();
        let expected_output = request
            .expected_output_tokens
            .unwrap_or(self.default_expected_output_tokens);

        for target in &targets {
            if !self.provider_enabled(&target.provider) {
                continue;
            }
            let provider = match self.providers.get(&target.provider) {
                Some(p) => Arc::clone(p),
                None => continue,
            };

            // Pre-flight: the estimate for the provider about to be called
            // must fit the balance snapshot. No request otherwise.
            let estimate = estimate_credits(
                input_tokens,
                expected_output,
                target.price_in_per_1k,
                target.price_out_per_1k,
            );
            let balance = self.store.balance(request.user_id).await?;
            if estimate > balance {
                return Err(GatewayError::InsufficientCredits {
                    balance,
                    required: estimate,
                    shortfall: estimate - balance,
                });
            }

            let params = self
                .params
                .get(&target.provider)
                .copied()
                .unwrap_or_default();
            let chat_request = ChatRequest {
                model: target.model.clone(),
                messages: request.messages.clone(),
                max_tokens: params.max_tokens,
                temperature: params.temperature,
                metadata: HashMap::new(),
            };

            // Bounded global concurrency; waiting here is a suspension
            // point the engine's cancellation can observe.
            let permit = Arc::clone(&self.concurrency)
                .acquire_owned()
                .await
                .map_err(|_| GatewayError::Misconfiguration("gateway is shut down".into()))?;
            let attempt = provider.chat(chat_request).await;
            drop(permit);

            match attempt {
                Ok(response) => {
                    return self.settle(&request, target, response).await;
                }
                Err(e) => {
                    // Operational telemetry only; no debit, no ledger row.
                    warn!(
                        provider = %target.provider,
                        model = %target.model,
                        error = %e,
                        "provider attempt failed, trying next route"
                    );
                }
            }
        }

        Err(GatewayError::NoProviderAvailable {
            task: request.task.to_string(),
            priority: request.priority.to_string(),
        })
    }

    /// Price the response, record the deduction, and release the completion.
    ///
    /// The deduction is one atomic store transaction; the completion is
    /// only returned once the ledger row exists. Zero-cost calls record
    /// nothing.
    async fn settle(
        &self,
        request: &CompletionRequest,
        target: &smartspec_config::RouteTarget,
        response: ChatResponse,
    ) -> Result<Completion, GatewayError> {
        let raw_cost_usd = response.raw_cost_usd.unwrap_or_else(|| {
            response.usage.input_tokens as f64 / 1000.0 * target.price_in_per_1k
                + response.usage.output_tokens as f64 / 1000.0 * target.price_out_per_1k
        });
        let credits = usd_to_credits_ceil(raw_cost_usd);

        let transaction_id = if credits > 0 {
            let metadata = serde_json::json!({
                "provider": target.provider,
                "model": response.model,
                "input_tokens": response.usage.input_tokens,
                "output_tokens": response.usage.output_tokens,
                "raw_cost_usd": raw_cost_usd,
                "task": request.task.as_str(),
            });
            let row = self
                .store
                .record_deduction(request.user_id, credits, metadata)
                .await?;
            Some(row.id)
        } else {
            None
        };

        debug!(
            provider = %target.provider,
            credits,
            "completion settled"
        );
        Ok(Completion {
            content: response.content,
            model: normalize_model_id(&target.provider, &response.model),
            provider: target.provider.clone(),
            usage: response.usage,
            credits_charged: credits,
            transaction_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartspec_config::{RouteTarget, RoutingRule};
    use smartspec_store::Role as UserRole;

    fn table(rows: Vec<RoutingRule>) -> RoutingTable {
        let mut config = Config::default();
        for rule in &rows {
            for route in &rule.routes {
                config.providers.insert(
                    route.provider.clone(),
                    toml::from_str::<smartspec_config::ProviderConfig>("kind = \"mock\"").unwrap(),
                );
            }
        }
        config.routing = rows;
        RoutingTable::from_config(&config)
    }

    fn rule(provider: &str, price_out: f64) -> RoutingRule {
        RoutingRule {
            task: "chat".into(),
            priority: "cost".into(),
            routes: vec![RouteTarget {
                provider: provider.into(),
                model: "mock-model".into(),
                price_in_per_1k: 0.0,
                price_out_per_1k: price_out,
            }],
        }
    }

    async fn gateway_with(
        mock: Arc<MockProvider>,
        rows: Vec<RoutingRule>,
        starting_credits: i64,
    ) -> (Gateway, Uuid) {
        let store = Store::open_in_memory().await.unwrap();
        let user = store
            .create_user("dev@example.com", "hash", UserRole::User)
            .await
            .unwrap();
        if starting_credits > 0 {
            store
                .record_topup(user.id, starting_credits, serde_json::json!({}))
                .await
                .unwrap();
        }
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        providers.insert(mock.name().to_string(), mock);
        let gateway = Gateway::new(store, table(rows), providers, 60, 0.15);
        (gateway, user.id)
    }

    fn request(user_id: Uuid, expected_output: u64) -> CompletionRequest {
        CompletionRequest {
            user_id,
            task: TaskClass::Chat,
            priority: BudgetPriority::Cost,
            messages: vec![Message::user("hello")],
            expected_output_tokens: Some(expected_output),
        }
    }

    #[tokio::test]
    async fn success_debits_exactly_once_before_release() {
        let mock = Arc::new(MockProvider::new("mock"));
        mock.push_response(
            "done",
            TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            0.10,
        );
        let (gateway, user_id) = gateway_with(Arc::clone(&mock), vec![rule("mock", 1.0)], 1_000).await;

        let completion = gateway.complete(request(user_id, 500)).await.unwrap();
        assert_eq!(completion.credits_charged, 100);
        assert!(completion.transaction_id.is_some());
        assert_eq!(completion.model, "mock/mock-model");

        let history = gateway.store.transaction_history(user_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(gateway.store.balance(user_id).await.unwrap(), 900);
    }

    #[tokio::test]
    async fn insufficient_credits_never_calls_the_provider() {
        let mock = Arc::new(MockProvider::new("mock"));
        let (gateway, user_id) = gateway_with(Arc::clone(&mock), vec![rule("mock", 1.0)], 50).await;

        // Expected output 200 tokens at $1/1k = $0.2 = 200 credits > 50.
        let err = gateway.complete(request(user_id, 200)).await.unwrap_err();
        match err {
            GatewayError::InsufficientCredits {
                balance,
                required,
                shortfall,
            } => {
                assert_eq!(balance, 50);
                assert_eq!(required, 200);
                assert_eq!(shortfall, 150);
            }
            other => panic!("expected insufficient credits, got {other}"),
        }
        assert_eq!(mock.call_count(), 0);
        assert_eq!(
            gateway.store.transaction_history(user_id).await.unwrap().len(),
            1
        );

        // A smaller call fits and debits.
        mock.push_response(
            "ok",
            TokenUsage {
                input_tokens: 10,
                output_tokens: 10,
            },
            0.03,
        );
        let completion = gateway.complete(request(user_id, 40)).await.unwrap();
        assert_eq!(completion.credits_charged, 30);
        assert_eq!(gateway.store.balance(user_id).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn provider_failure_produces_zero_transactions() {
        let mock = Arc::new(MockProvider::new("mock"));
        mock.push_error(ProviderError::Api {
            status: 503,
            message: "overloaded".into(),
        });
        let (gateway, user_id) = gateway_with(Arc::clone(&mock), vec![rule("mock", 0.001)], 1_000).await;

        let err = gateway.complete(request(user_id, 10)).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoProviderAvailable { .. }));
        assert_eq!(
            gateway.store.transaction_history(user_id).await.unwrap().len(),
            1,
            "only the topup row exists"
        );
        assert_eq!(gateway.store.balance(user_id).await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn fallback_tries_the_next_route() {
        let flaky = Arc::new(MockProvider::new("flaky"));
        flaky.push_error(ProviderError::Transport("reset".into()));
        let steady = Arc::new(MockProvider::new("steady"));
        steady.push_response(
            "recovered",
            TokenUsage {
                input_tokens: 5,
                output_tokens: 5,
            },
            0.001,
        );

        let rows = vec![RoutingRule {
            task: "chat".into(),
            priority: "cost".into(),
            routes: vec![
                RouteTarget {
                    provider: "flaky".into(),
                    model: "mock-model".into(),
                    price_in_per_1k: 0.0,
                    price_out_per_1k: 0.001,
                },
                RouteTarget {
                    provider: "steady".into(),
                    model: "mock-model".into(),
                    price_in_per_1k: 0.0,
                    price_out_per_1k: 0.001,
                },
            ],
        }];

        let store = Store::open_in_memory().await.unwrap();
        let user = store
            .create_user("dev@example.com", "hash", UserRole::User)
            .await
            .unwrap();
        store
            .record_topup(user.id, 100, serde_json::json!({}))
            .await
            .unwrap();
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        providers.insert("flaky".into(), Arc::clone(&flaky) as Arc<dyn Provider>);
        providers.insert("steady".into(), Arc::clone(&steady) as Arc<dyn Provider>);
        let gateway = Gateway::new(store, table(rows), providers, 60, 0.15);

        let completion = gateway.complete(request(user.id, 10)).await.unwrap();
        assert_eq!(completion.provider, "steady");
        assert_eq!(completion.content, "recovered");
        assert_eq!(flaky.call_count(), 1);
        assert_eq!(steady.call_count(), 1);
    }

    #[tokio::test]
    async fn disabled_provider_is_skipped() {
        let mock = Arc::new(MockProvider::new("mock"));
        let (gateway, user_id) = gateway_with(Arc::clone(&mock), vec![rule("mock", 0.001)], 100).await;

        gateway.set_provider_enabled("mock", false);
        let err = gateway.complete(request(user_id, 10)).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoProviderAvailable { .. }));
        assert_eq!(mock.call_count(), 0);

        gateway.set_provider_enabled("mock", true);
        assert!(gateway.complete(request(user_id, 10)).await.is_ok());
    }

    #[tokio::test]
    async fn zero_token_call_records_no_transaction() {
        let mock = Arc::new(MockProvider::new("mock"));
        mock.push_response("free", TokenUsage::default(), 0.0);
        let (gateway, user_id) = gateway_with(Arc::clone(&mock), vec![rule("mock", 0.001)], 100).await;

        let completion = gateway.complete(request(user_id, 0)).await.unwrap();
        assert_eq!(completion.credits_charged, 0);
        assert!(completion.transaction_id.is_none());
        assert_eq!(
            gateway.store.transaction_history(user_id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn rate_limit_fires_before_anything_else() {
        let mock = Arc::new(MockProvider::new("mock"));
        let store = Store::open_in_memory().await.unwrap();
        let user = store
            .create_user("dev@example.com", "hash", UserRole::User)
            .await
            .unwrap();
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        providers.insert("mock".into(), Arc::clone(&mock) as Arc<dyn Provider>);
        let gateway = Gateway::new(store, table(vec![rule("mock", 0.0)]), providers, 1, 0.15);

        gateway.complete(request(user.id, 0)).await.unwrap();
        let err = gateway.complete(request(user.id, 0)).await.unwrap_err();
        assert!(matches!(err, GatewayError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn topup_applies_markup_on_grant() {
        let mock = Arc::new(MockProvider::new("mock"));
        let (gateway, user_id) = gateway_with(mock, vec![rule("mock", 0.001)], 0).await;

        let row = gateway.topup(user_id, 100.0).await.unwrap();
        assert_eq!(row.amount_credits, 86_956);
        assert_eq!(gateway.store.balance(user_id).await.unwrap(), 86_956);
    }
}
