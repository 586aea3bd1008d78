//! Provider abstraction for LLM backends.
//!
//! Every provider exposes chat completion; streaming, tool calling, and
//! structured output are advertised capabilities that routing may consult.
//! The gateway works against [`Provider`] without knowing transport details.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Input to one chat completion call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Bare model name (no provider prefix).
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Provider-specific extras.
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Output of one chat completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    /// Model the provider actually used.
    pub model: String,
    pub usage: TokenUsage,
    /// Cost in USD when the provider reports one; otherwise the gateway
    /// prices the usage from the routing table.
    pub raw_cost_usd: Option<f64>,
}

/// Optional capabilities a backend may support beyond chat completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub streaming: bool,
    pub tool_calling: bool,
    pub structured_output: bool,
}

/// Failure from one provider attempt. Any of these triggers fallback to the
/// next routing row.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Provider API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Provider timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Provider misconfigured: {0}")]
    Misconfigured(String),
}

/// Trait implemented by every backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name, the prefix of normalized model identifiers.
    fn name(&self) -> &str;

    /// Advertised capabilities beyond chat completion.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Execute one chat completion.
    ///
    /// # Errors
    /// A [`ProviderError`] for transport, API, timeout, or configuration
    /// failures. The gateway treats all of them as fallback triggers.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Normalize a model identifier to `<provider>/<model>`.
#[must_use]
pub fn normalize_model_id(provider: &str, model: &str) -> String {
    match model.split_once('/') {
        Some((prefix, _)) if prefix == provider => model.to_string(),
        _ => format!("{provider}/{model}"),
    }
}
