//! Gemini `generateContent` client.
//!
//! The key travels as the `?key=` query parameter. The system instruction is a
//! top-level `system_instruction` object, and `responseMimeType` asks the
//! model for JSON output when the request wants it.

use super::{CompletionRequest, CompletionResponse, LlmProvider, TokenUsage};
use crate::config::LlmConfig;
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Public endpoint of the Generative Language API.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Marker the API puts in error bodies for a rejected key.
const INVALID_KEY_MARKER: &str = "API key not valid";

/// Calls a Gemini model with a single-turn prompt.
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
}

impl GeminiProvider {
    /// Build a client for `config.model` using the resolved key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }

    /// Request body: one user turn plus generation settings.
    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let max_tokens = request.max_tokens.unwrap_or(self.max_tokens);
        let temperature = request.temperature.unwrap_or(self.temperature);

        let mut body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": request.prompt}],
            }],
            "generationConfig": {
                "maxOutputTokens": max_tokens,
                "temperature": temperature,
            },
        });

        if let Some(system) = &request.system_instruction {
            body["system_instruction"] = serde_json::json!({
                "parts": [{"text": system}]
            });
        }

        if request.json_response {
            body["generationConfig"]["responseMimeType"] = Value::String("application/json".into());
        }

        body
    }

    /// Extract the text of the first candidate.
    ///
    /// Its text parts are concatenated. A candidate with
    /// no text yields an empty string, which the normalizer reports.
    fn parse_response(body: &Value) -> Result<CompletionResponse, LlmError> {
        let candidates = body["candidates"]
            .as_array()
            .ok_or_else(|| match body["promptFeedback"]["blockReason"].as_str() {
                Some(reason) => LlmError::ApiRequest {
                    message: format!("Prompt blocked by Gemini: {}", reason),
                },
                None => LlmError::ResponseParse {
                    message: "Missing 'candidates' array in response".to_string(),
                },
            })?;

        let candidate = candidates.first().ok_or_else(|| LlmError::ResponseParse {
            message: "Empty 'candidates' array in response".to_string(),
        })?;

        let text: String = candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        let usage_metadata = &body["usageMetadata"];
        let usage = TokenUsage {
            input_tokens: usage_metadata["promptTokenCount"].as_u64().unwrap_or(0) as usize,
            output_tokens: usage_metadata["candidatesTokenCount"].as_u64().unwrap_or(0) as usize,
        };

        Ok(CompletionResponse {
            text,
            model: body["modelVersion"].as_str().unwrap_or("gemini").to_string(),
            finish_reason: candidate["finishReason"].as_str().map(str::to_string),
            usage,
        })
    }

    /// Classify a non-success response.
    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> LlmError {
        if body_text.contains(INVALID_KEY_MARKER) {
            return LlmError::InvalidCredential {
                provider: "Gemini".to_string(),
            };
        }
        match status.as_u16() {
            401 | 403 => LlmError::InvalidCredential {
                provider: "Gemini".to_string(),
            },
            429 => LlmError::RateLimited {
                retry_after_secs: 30,
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {} from Gemini API: {}", status, error_message(body_text)),
            },
        }
    }

    /// `{base}/models/{model}:{method}?key=...`
    fn endpoint_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}?key={}",
            self.base_url, self.model, method, self.api_key
        )
    }
}

/// Prefer `error.message` from a Gemini error envelope over the raw body.
fn error_message(body_text: &str) -> String {
    serde_json::from_str::<Value>(body_text)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body_text.trim().to_string())
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request_body(&request);
        let url = self.endpoint_url("generateContent");

        debug!(
            model = self.model.as_str(),
            prompt_chars = request.prompt.len(),
            "Sending Gemini completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else if e.is_connect() {
                    LlmError::Connection {
                        message: e.without_url().to_string(),
                    }
                } else {
                    LlmError::ApiRequest {
                        message: format!("Request to Gemini API failed: {}", e.without_url()),
                    }
                }
            })?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Failed to read response body: {}", e.without_url()),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        let parsed = Self::parse_response(&response_json)?;
        debug!(
            model = parsed.model.as_str(),
            finish_reason = parsed.finish_reason.as_deref().unwrap_or("unknown"),
            output_tokens = parsed.usage.output_tokens,
            "Gemini completion received"
        );
        Ok(parsed)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LlmConfig {
        LlmConfig {
            model: "gemini-2.5-flash-preview-04-17".to_string(),
            ..Default::default()
        }
    }

    fn provider_for_test() -> GeminiProvider {
        GeminiProvider::new_with_key(&test_config(), "test-gemini-key-12345".to_string())
            .expect("Provider creation should succeed")
    }

    #[test]
    fn test_new_custom_base_url() {
        let config = LlmConfig {
            base_url: Some("http://localhost:9999/v1beta/".to_string()),
            ..test_config()
        };
        let provider = GeminiProvider::new_with_key(&config, "k".into()).unwrap();
        assert_eq!(provider.base_url, "http://localhost:9999/v1beta");
    }

    #[test]
    fn test_build_request_body() {
        let provider = provider_for_test();
        let mut request = CompletionRequest::new("Here is the data").with_system_instruction("Be a yield analyst");
        request.json_response = true;

        let body = provider.build_request_body(&request);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Here is the data");
        assert_eq!(body["system_instruction"]["parts"][0]["text"], "Be a yield analyst");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn test_build_request_body_plain() {
        let provider = provider_for_test();
        let mut request = CompletionRequest::new("Hello");
        request.max_tokens = Some(256);
        let body = provider.build_request_body(&request);
        assert!(body.get("system_instruction").is_none());
        assert!(body["generationConfig"].get("responseMimeType").is_none());
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_parse_text_response() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "{\"Key Insights\": "}, {"text": "[]}"}]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 40},
            "modelVersion": "gemini-2.5-flash-preview-04-17"
        });

        let response = GeminiProvider::parse_response(&body).unwrap();
        assert_eq!(response.text, "{\"Key Insights\": []}");
        assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(response.usage.input_tokens, 120);
        assert_eq!(response.model, "gemini-2.5-flash-preview-04-17");
    }

    #[test]
    fn test_parse_empty_parts() {
        let body = serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": []}, "finishReason": "MAX_TOKENS"}]
        });
        let response = GeminiProvider::parse_response(&body).unwrap();
        assert_eq!(response.text, "");
    }

    #[test]
    fn test_parse_empty_candidates() {
        let body = serde_json::json!({"candidates": []});
        assert!(matches!(
            GeminiProvider::parse_response(&body),
            Err(LlmError::ResponseParse { .. })
        ));
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let body = serde_json::json!({"promptFeedback": {"blockReason": "SAFETY"}});
        match GeminiProvider::parse_response(&body) {
            Err(LlmError::ApiRequest { message }) => assert!(message.contains("SAFETY")),
            other => panic!("Expected ApiRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_http_error_mapping() {
        let err = GeminiProvider::map_http_error(reqwest::StatusCode::UNAUTHORIZED, "unauthorized");
        assert!(matches!(err, LlmError::InvalidCredential { .. }));

        let err = GeminiProvider::map_http_error(reqwest::StatusCode::FORBIDDEN, "forbidden");
        assert!(matches!(err, LlmError::InvalidCredential { .. }));

        let err = GeminiProvider::map_http_error(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}}"#,
        );
        assert!(matches!(err, LlmError::InvalidCredential { .. }));

        let err = GeminiProvider::map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, LlmError::RateLimited { .. }));

        let err = GeminiProvider::map_http_error(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error": {"code": 500, "message": "Internal error encountered."}}"#,
        );
        match err {
            LlmError::ApiRequest { message } => {
                assert!(message.contains("500"));
                assert!(message.contains("Internal error encountered."));
            }
            other => panic!("Expected ApiRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_endpoint_url() {
        let provider = provider_for_test();
        let url = provider.endpoint_url("generateContent");
        assert_eq!(
            url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-preview-04-17:generateContent?key=test-gemini-key-12345"
        );
    }

    #[test]
    fn test_model_name_from_config() {
        let provider = provider_for_test();
        assert_eq!(provider.model_name(), "gemini-2.5-flash-preview-04-17");
        assert_eq!(provider.timeout_secs, 120);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let config = LlmConfig {
            base_url: Some("http://127.0.0.1:1".to_string()),
            connect_timeout_secs: 2,
            ..test_config()
        };
        let provider = GeminiProvider::new_with_key(&config, "k".into()).unwrap();
        let err = provider
            .complete(CompletionRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LlmError::Connection { .. } | LlmError::ApiRequest { .. }
        ));
    }
}
