//! Provider backend implementations.

mod anthropic;
mod mock;
mod openrouter;

pub use anthropic::AnthropicProvider;
pub use mock::MockProvider;
pub use openrouter::OpenRouterProvider;

use std::sync::Arc;
use std::time::Duration;

use smartspec_config::{ProviderConfig, ProviderKind};

use crate::provider::{Provider, ProviderError};

/// Default per-request timeout for HTTP providers.
pub(crate) const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Build a reqwest client with the gateway's timeout policy.
pub(crate) fn http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .build()
        .map_err(|e| ProviderError::Misconfigured(format!("failed to build HTTP client: {e}")))
}

/// Read the provider's API key from its configured environment variable.
pub(crate) fn api_key_from_env(
    config: &ProviderConfig,
    default_env: &str,
) -> Result<String, ProviderError> {
    let env = config.api_key_env.as_deref().unwrap_or(default_env);
    std::env::var(env).map_err(|_| {
        ProviderError::Misconfigured(format!(
            "API key not found in environment variable '{env}'. Set it, or configure \
             api_key_env for this provider."
        ))
    })
}

/// Construct a backend for one configured provider.
///
/// # Errors
/// [`ProviderError::Misconfigured`] when required configuration is absent.
pub fn construct_provider(
    name: &str,
    config: &ProviderConfig,
) -> Result<Arc<dyn Provider>, ProviderError> {
    match config.kind {
        ProviderKind::Anthropic => Ok(Arc::new(AnthropicProvider::from_config(name, config)?)),
        ProviderKind::Openrouter => Ok(Arc::new(OpenRouterProvider::from_config(name, config)?)),
        ProviderKind::Mock => Ok(Arc::new(MockProvider::new(name))),
    }
}
