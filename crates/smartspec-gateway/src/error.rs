//! Gateway error type.

use thiserror::Error;

use crate::provider::ProviderError;
use smartspec_store::StoreError;

/// Failures from the gateway's completion path.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Rate limit exceeded; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Insufficient credits: balance {balance}, required {required}")]
    InsufficientCredits {
        balance: i64,
        required: i64,
        shortfall: i64,
    },

    #[error("No provider available for task '{task}' at priority '{priority}'")]
    NoProviderAvailable { task: String, priority: String },

    #[error("User account is deactivated")]
    UserInactive,

    #[error("Provider '{provider}' failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("Gateway misconfigured: {0}")]
    Misconfiguration(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<GatewayError> for smartspec_utils::SmartSpecError {
    fn from(err: GatewayError) -> Self {
        use smartspec_utils::SmartSpecError;
        match err {
            GatewayError::InsufficientCredits {
                balance,
                required,
                shortfall,
            } => SmartSpecError::InsufficientCredits {
                balance,
                required,
                shortfall,
            },
            GatewayError::RateLimited { retry_after_secs } => SmartSpecError::Provider {
                message: format!("rate limit exceeded; retry after {retry_after_secs}s"),
            },
            GatewayError::NoProviderAvailable { task, priority } => SmartSpecError::Provider {
                message: format!("no provider available for task '{task}' (priority {priority})"),
            },
            GatewayError::Provider { provider, source } => SmartSpecError::Provider {
                message: format!("{provider}: {source}"),
            },
            GatewayError::UserInactive => SmartSpecError::validation("user account is deactivated"),
            GatewayError::Misconfiguration(m) => SmartSpecError::validation(m),
            GatewayError::Store(e) => e.into(),
        }
    }
}
