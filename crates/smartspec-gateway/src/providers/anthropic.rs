//! Anthropic Messages API backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use smartspec_config::ProviderConfig;

use super::{api_key_from_env, http_client};
use crate::provider::{
    Capabilities, ChatRequest, ChatResponse, Message, Provider, ProviderError, Role, TokenUsage,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// HTTP backend for Anthropic's Messages API.
pub struct AnthropicProvider {
    name: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AnthropicProvider {
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
            api_key: api_key_from_env(config, "ANTHROPIC_API_KEY")?,
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ContentBlock>,
    usage: WireUsage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct WireUsage {
    input_tokens: u64,
    output_tokens: u64,
}

/// System messages become the API's top-level `system` field; the rest map
/// to user/assistant turns.
fn split_messages(messages: &[Message]) -> (Option<String>, Vec<WireMessage<'_>>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut turns = Vec::new();
    for message in messages {
        match message.role {
            Role::System => system_parts.push(&message.content),
            Role::User => turns.push(WireMessage {
                role: "user",
                content: &message.content,
            }),
            Role::Assistant => turns.push(WireMessage {
                role: "assistant",
                content: &message.content,
            }),
        }
    }
    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, turns)
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            streaming: true,
            tool_calling: true,
            structured_output: true,
        }
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let (system, messages) = split_messages(&request.messages);
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system,
            messages,
        };

        debug!(provider = %self.name, model = %request.model, "anthropic chat request");
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(format!("malformed response body: {e}")))?;

        let content = parsed
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        Ok(ChatResponse {
            content,
            model: parsed.model,
            usage: TokenUsage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
            // The Messages API reports tokens, not dollars; the gateway
            // prices usage from the routing table.
            raw_cost_usd: None,
        })
    }
}
