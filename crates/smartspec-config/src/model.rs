//! Configuration data model.
//!
//! Every field has a serde default matching the documented default, so an
//! empty config file (or none at all) yields a fully usable configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Provider backends keyed by provider name.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Routing table rows, first match wins per (task, priority).
    #[serde(default)]
    pub routing: Vec<RoutingRule>,
}

/// Execution engine settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Step fan-out bound within one execution.
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,
    /// Grace period before a cancel escalates to a hard stop.
    #[serde(default = "default_step_grace_secs")]
    pub step_grace_secs: u64,
    /// Implicit per-execution timeout.
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
    /// Deadline for an unanswered human-in-the-loop interrupt.
    #[serde(default = "default_interrupt_deadline_secs")]
    pub interrupt_deadline_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fan_out: default_fan_out(),
            step_grace_secs: default_step_grace_secs(),
            execution_timeout_secs: default_execution_timeout_secs(),
            interrupt_deadline_secs: default_interrupt_deadline_secs(),
        }
    }
}

/// LLM gateway settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Markup applied on top-up (not on usage).
    #[serde(default = "default_markup_rate")]
    pub markup_rate: f64,
    /// Per-user request limit per minute.
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,
    /// Conservative expected output tokens when workflow metadata gives none.
    #[serde(default = "default_expected_output_tokens")]
    pub expected_output_tokens: u64,
    /// Global cap on in-flight provider requests.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            markup_rate: default_markup_rate(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            expected_output_tokens: default_expected_output_tokens(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

/// Evidence verifier settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VerifierConfig {
    /// Similarity floor for fuzzy path suggestions.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    /// Maximum fuzzy suggestions per failed hook.
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
            max_suggestions: default_max_suggestions(),
        }
    }
}

/// Relational store settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// sqlx connection URL. Relative sqlite paths are resolved against the
    /// repository root.
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

/// Kind of provider backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    Openrouter,
    /// Scripted responses; used by tests and `--validate-only` runs.
    Mock,
}

/// One provider backend entry (`[providers.<name>]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Override the provider's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Default model when a routing row does not name one.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Disabled providers are skipped by routing.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// One (provider, model) fallback target inside a routing rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouteTarget {
    pub provider: String,
    pub model: String,
    /// USD per 1k input tokens, used for pre-flight estimation.
    pub price_in_per_1k: f64,
    /// USD per 1k output tokens.
    pub price_out_per_1k: f64,
}

/// One routing table row: first enabled target wins, later targets are
/// fallbacks on provider failure.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingRule {
    /// Task class: chat, code-generation, reasoning, summarization, ...
    pub task: String,
    /// Budget priority: quality, cost, or speed.
    pub priority: String,
    pub routes: Vec<RouteTarget>,
}

fn default_fan_out() -> usize {
    4
}
fn default_step_grace_secs() -> u64 {
    30
}
fn default_execution_timeout_secs() -> u64 {
    1800
}
fn default_interrupt_deadline_secs() -> u64 {
    3600
}
fn default_markup_rate() -> f64 {
    0.15
}
fn default_rate_limit_per_minute() -> u32 {
    60
}
fn default_expected_output_tokens() -> u64 {
    1024
}
fn default_max_concurrent_requests() -> usize {
    8
}
fn default_fuzzy_threshold() -> f64 {
    0.55
}
fn default_max_suggestions() -> usize {
    3
}
fn default_database_url() -> String {
    "sqlite://.spec/smartspec.db".to_string()
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_temperature() -> f32 {
    0.2
}
fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_documented_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.engine.fan_out, 4);
        assert_eq!(config.engine.step_grace_secs, 30);
        assert_eq!(config.engine.execution_timeout_secs, 1800);
        assert_eq!(config.engine.interrupt_deadline_secs, 3600);
        assert!((config.gateway.markup_rate - 0.15).abs() < f64::EPSILON);
        assert_eq!(config.gateway.rate_limit_per_minute, 60);
        assert!((config.verifier.fuzzy_threshold - 0.55).abs() < f64::EPSILON);
        assert_eq!(config.verifier.max_suggestions, 3);
        assert_eq!(config.store.database_url, "sqlite://.spec/smartspec.db");
    }

    #[test]
    fn providers_and_routing_parse() {
        let config: Config = toml::from_str(
            r#"
            [providers.anthropic]
            kind = "anthropic"
            api_key_env = "ANTHROPIC_API_KEY"
            model = "claude-sonnet-4-5"

            [providers.fallback]
            kind = "openrouter"
            model = "qwen/qwen3-coder"
            enabled = false

            [[routing]]
            task = "code-generation"
            priority = "quality"
            routes = [
                { provider = "anthropic", model = "claude-sonnet-4-5", price_in_per_1k = 0.003, price_out_per_1k = 0.015 },
                { provider = "fallback", model = "qwen/qwen3-coder", price_in_per_1k = 0.0002, price_out_per_1k = 0.0008 },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(config.providers.len(), 2);
        assert!(!config.providers["fallback"].enabled);
        assert_eq!(config.routing[0].routes.len(), 2);
        assert_eq!(config.routing[0].routes[0].provider, "anthropic");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<Config, _> = toml::from_str("[engine]\nfanout = 4\n");
        assert!(result.is_err());
    }
}
