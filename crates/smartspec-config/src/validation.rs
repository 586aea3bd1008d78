//! Startup validation of the loaded configuration.
//!
//! Validation failures are named diagnostics; bootstrap aborts on the first
//! error rather than running with a half-sane configuration.

use thiserror::Error;

use crate::model::Config;

/// Named configuration diagnostics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Routing rule for task '{task}' references unknown provider '{provider}'")]
    UnknownRoutingProvider { task: String, provider: String },

    #[error("Routing rule for task '{task}' priority '{priority}' has no routes")]
    EmptyRoutingRule { task: String, priority: String },
}

/// Validate a configuration, returning the first diagnostic found.
///
/// # Errors
/// A [`ConfigError`] naming the offending key and value.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.engine.fan_out == 0 {
        return Err(invalid(
            "engine.fan_out",
            config.engine.fan_out,
            "must be at least 1",
        ));
    }
    if config.engine.execution_timeout_secs == 0 {
        return Err(invalid(
            "engine.execution_timeout_secs",
            config.engine.execution_timeout_secs,
            "must be at least 1",
        ));
    }
    if !(0.0..1.0).contains(&config.gateway.markup_rate) {
        return Err(invalid(
            "gateway.markup_rate",
            config.gateway.markup_rate,
            "must be in [0, 1)",
        ));
    }
    if config.gateway.rate_limit_per_minute == 0 {
        return Err(invalid(
            "gateway.rate_limit_per_minute",
            config.gateway.rate_limit_per_minute,
            "must be at least 1",
        ));
    }
    if config.gateway.max_concurrent_requests == 0 {
        return Err(invalid(
            "gateway.max_concurrent_requests",
            config.gateway.max_concurrent_requests,
            "must be at least 1",
        ));
    }
    if !(0.0..=1.0).contains(&config.verifier.fuzzy_threshold) {
        return Err(invalid(
            "verifier.fuzzy_threshold",
            config.verifier.fuzzy_threshold,
            "must be in [0, 1]",
        ));
    }
    if config.store.database_url.is_empty() {
        return Err(invalid("store.database_url", "", "must not be empty"));
    }

    for rule in &config.routing {
        if rule.routes.is_empty() {
            return Err(ConfigError::EmptyRoutingRule {
                task: rule.task.clone(),
                priority: rule.priority.clone(),
            });
        }
        if !matches!(rule.priority.as_str(), "quality" | "cost" | "speed") {
            return Err(invalid(
                "routing.priority",
                &rule.priority,
                "must be quality, cost, or speed",
            ));
        }
        for route in &rule.routes {
            if !config.providers.contains_key(&route.provider) {
                return Err(ConfigError::UnknownRoutingProvider {
                    task: rule.task.clone(),
                    provider: route.provider.clone(),
                });
            }
            if route.price_in_per_1k < 0.0 || route.price_out_per_1k < 0.0 {
                return Err(invalid(
                    "routing.routes.price",
                    route.price_in_per_1k,
                    "prices must be non-negative",
                ));
            }
        }
    }

    Ok(())
}

fn invalid(key: &str, value: impl std::fmt::Display, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
