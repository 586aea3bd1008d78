//! Scripted provider for tests and validate-only runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::provider::{ChatRequest, ChatResponse, Provider, ProviderError, TokenUsage};

type Scripted = Result<ChatResponse, ProviderError>;

/// Provider that replays a scripted queue of responses.
///
/// With an empty script it echoes a deterministic completion with zero
/// reported cost, which is what dry runs want.
pub struct MockProvider {
    name: String,
    script: Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
}

impl MockProvider {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a successful response.
    pub fn push_response(&self, content: &str, usage: TokenUsage, raw_cost_usd: f64) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(ChatResponse {
                content: content.to_string(),
                model: format!("{}/mock-model", self.name),
                usage,
                raw_cost_usd: Some(raw_cost_usd),
            }));
    }

    /// Queue a failure.
    pub fn push_error(&self, error: ProviderError) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
    }

    /// Number of chat calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(ChatResponse {
                content: format!("mock completion for {} message(s)", request.messages.len()),
                model: format!("{}/{}", self.name, request.model),
                usage: TokenUsage::default(),
                raw_cost_usd: Some(0.0),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;

    fn request() -> ChatRequest {
        ChatRequest {
            model: "mock-model".into(),
            messages: vec![Message::user("hi")],
            max_tokens: 64,
            temperature: 0.0,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn scripted_responses_replay_in_order() {
        let mock = MockProvider::new("mock");
        mock.push_response("one", TokenUsage::default(), 0.01);
        mock.push_error(ProviderError::Api {
            status: 500,
            message: "boom".into(),
        });

        let first = mock.chat(request()).await.unwrap();
        assert_eq!(first.content, "one");
        assert!(mock.chat(request()).await.is_err());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn empty_script_echoes_for_free() {
        let mock = MockProvider::new("mock");
        let response = mock.chat(request()).await.unwrap();
        assert_eq!(response.raw_cost_usd, Some(0.0));
        assert_eq!(response.usage.total(), 0);
    }
}
