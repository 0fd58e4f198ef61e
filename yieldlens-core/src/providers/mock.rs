//! In-process provider returning queued responses, for tests.

use super::{CompletionRequest, CompletionResponse, LlmProvider, TokenUsage};
use crate::error::LlmError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Mock LLM provider.
///
/// Responses (or errors) are returned in the order they were queued. Every
/// request is recorded so tests can assert on prompts and call counts.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Create a provider whose first response is the given text.
    pub fn with_response(text: &str) -> Self {
        let provider = Self::new();
        provider.queue_text(text);
        provider
    }

    /// Sleep this long before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a text response for the next unanswered `complete` call.
    pub fn queue_text(&self, text: &str) {
        self.push(Ok(Self::text_response(text)));
    }

    /// Queue a failure for the next unanswered `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.push(Err(error));
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            text: text.to_string(),
            model: "mock-model".to_string(),
            finish_reason: Some("STOP".to_string()),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn push(&self, entry: Result<CompletionResponse, LlmError>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(entry);
        }
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());
        next.unwrap_or_else(|| {
            Err(LlmError::ApiRequest {
                message: "mock provider has no queued responses".to_string(),
            })
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
