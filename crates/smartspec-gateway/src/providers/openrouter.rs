//! OpenRouter backend (OpenAI-compatible chat completions).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use smartspec_config::ProviderConfig;

use super::{api_key_from_env, http_client};
use crate::provider::{
    Capabilities, ChatRequest, ChatResponse, Provider, ProviderError, Role, TokenUsage,
};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// HTTP backend for OpenRouter's unified API.
pub struct OpenRouterProvider {
    name: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenRouterProvider {
    /// Build from a `[providers.<name>]` entry.
    ///
    /// # Errors
    /// [`ProviderError::Misconfigured`] when the API key env var is unset.
    pub fn from_config(name: &str, config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.to_string(),
            client: http_client()?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: api_key_from_env(config, "OPENROUTER_API_KEY")?,
        })
    }
}

#[derive(Serialize)]
struct CompletionsRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<WireMessage<'a>>,
    usage: UsageOptions,
}

#[derive(Serialize)]
struct UsageOptions {
    include: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionsResponse {
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    /// OpenRouter reports the upstream cost in USD when usage accounting is
    /// requested.
    #[serde(default)]
    cost: Option<f64>,
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            streaming: true,
            tool_calling: false,
            structured_output: false,
        }
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let messages: Vec<WireMessage<'_>> = request
            .messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &m.content,
            })
            .collect();

        let body = CompletionsRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages,
            usage: UsageOptions { include: true },
        };

        debug!(provider = %self.name, model = %request.model, "openrouter chat request");
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        seconds: super::DEFAULT_HTTP_TIMEOUT.as_secs(),
                    }
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: message.chars().take(512).collect(),
            });
        }

        let parsed: CompletionsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(format!("malformed response body: {e}")))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| ProviderError::Transport("response contained no choices".into()))?;

        let (usage, raw_cost_usd) = match parsed.usage {
            Some(u) => (
                TokenUsage {
                    input_tokens: u.prompt_tokens,
                    output_tokens: u.completion_tokens,
                },
                u.cost,
            ),
            None => (TokenUsage::default(), None),
        };

        Ok(ChatResponse {
            content,
            model: parsed.model,
            usage,
            raw_cost_usd,
        })
    }
}
