//! LLM provider abstraction and implementations.
//!
//! - `GeminiProvider` talks to the Google Gemini `generateContent` API.
//! - `MockLlmProvider` returns queued responses for tests.
//!
//! Use `create_provider()` to instantiate the configured provider.

pub mod gemini;
pub mod mock;

use crate::config::LlmConfig;
use crate::error::{ConfigError, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use gemini::GeminiProvider;
pub use mock::MockLlmProvider;

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Fixed instruction sent out-of-band from the user turn.
    pub system_instruction: Option<String>,
    /// The user turn.
    pub prompt: String,
    /// Overrides the provider's configured temperature.
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    /// Ask the provider to constrain output to JSON.
    pub json_response: bool,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system_instruction: None,
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
            json_response: false,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// The provider's raw answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Concatenated text of the answer. May be empty.
    pub text: String,
    pub model: String,
    pub finish_reason: Option<String>,
    pub usage: TokenUsage,
}

/// Trait for generative model providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Create the provider named in `config.provider` with an already-resolved key.
pub fn create_provider(
    config: &LlmConfig,
    api_key: String,
) -> Result<Arc<dyn LlmProvider>, crate::error::YieldLensError> {
    match config.provider.to_ascii_lowercase().as_str() {
        "gemini" | "google" => {
            let provider = GeminiProvider::new_with_key(config, api_key)?;
            Ok(Arc::new(provider))
        }
        other => Err(ConfigError::Invalid {
            message: format!("Unknown LLM provider '{}'", other),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::YieldLensError;

    #[test]
    fn test_create_gemini_provider() {
        let config = LlmConfig::default();
        let provider = create_provider(&config, "test-key".into()).unwrap();
        assert_eq!(provider.model_name(), config.model);
    }

    #[test]
    fn test_create_unknown_provider() {
        let config = LlmConfig {
            provider: "openai".into(),
            ..Default::default()
        };
        let result = create_provider(&config, "test-key".into());
        assert!(matches!(result, Err(YieldLensError::Config(_))));
    }

    #[test]
    fn test_completion_request_builder() {
        let req = CompletionRequest::new("hello").with_system_instruction("be brief");
        assert_eq!(req.prompt, "hello");
        assert_eq!(req.system_instruction.as_deref(), Some("be brief"));
        assert!(!req.json_response);
    }
}
