//! Model request gateway.
//!
//! Wraps the two fixed intents (analysis and prediction) as single-turn calls
//! to an `LlmProvider` and returns the raw response text. Without a provider
//! every call fails fast with `LlmError::NotConfigured`.

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use crate::parameters::HypotheticalInputs;
use crate::prompts;
use crate::providers::{CompletionRequest, LlmProvider, create_provider};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Gateway to the generative model service.
#[derive(Clone, Default)]
pub struct ModelGateway {
    provider: Option<Arc<dyn LlmProvider>>,
}

impl std::fmt::Debug for ModelGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelGateway")
            .field("model", &self.model_name())
            .finish()
    }
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// A gateway with no credential. Every request fails with `NotConfigured`.
    pub fn unconfigured() -> Self {
        Self { provider: None }
    }

    /// Build from configuration, resolving the API key from the environment.
    ///
    /// A missing key is not an error: it is logged and the gateway is left
    /// unconfigured.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        match config.resolve_api_key() {
            Some(key) => {
                let provider = create_provider(config, key)?;
                info!(
                    provider = config.provider.as_str(),
                    model = provider.model_name(),
                    "Model gateway configured"
                );
                Ok(Self::new(provider))
            }
            None => {
                warn!(
                    api_key_env = config.api_key_env.as_str(),
                    "API key is not set; model requests will fail until it is configured"
                );
                Ok(Self::unconfigured())
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.provider.as_deref().map(|p| p.model_name())
    }

    /// Ask for a full analysis of the canonical data string.
    pub async fn request_analysis(&self, canonical: &str) -> std::result::Result<String, LlmError> {
        let request = CompletionRequest {
            json_response: true,
            ..CompletionRequest::new(prompts::analysis_prompt(canonical))
                .with_system_instruction(prompts::ANALYSIS_SYSTEM_INSTRUCTION)
        };
        self.send("analysis", request).await
    }

    /// Ask for a yield estimate for the given hypothetical inputs.
    pub async fn request_prediction(
        &self,
        inputs: &HypotheticalInputs,
        canonical: &str,
    ) -> std::result::Result<String, LlmError> {
        let request = CompletionRequest {
            json_response: true,
            ..CompletionRequest::new(prompts::prediction_prompt(inputs, canonical))
                .with_system_instruction(prompts::PREDICTION_SYSTEM_INSTRUCTION)
        };
        self.send("prediction", request).await
    }

    async fn send(
        &self,
        intent: &'static str,
        request: CompletionRequest,
    ) -> std::result::Result<String, LlmError> {
        let provider = self.provider.as_ref().ok_or(LlmError::NotConfigured)?;
        let started = Instant::now();
        match provider.complete(request).await {
            Ok(response) => {
                info!(
                    intent,
                    model = response.model.as_str(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    response_chars = response.text.len(),
                    "Model request completed"
                );
                Ok(response.text)
            }
            Err(e) => {
                warn!(
                    intent,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "Model request failed"
                );
                Err(e)
            }
        }
    }
}
