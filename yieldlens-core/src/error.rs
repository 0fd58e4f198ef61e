//! Error types for the YieldLens core.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering response normalization, model provider calls, tabular ingestion,
//! local validation, and configuration.

use crate::types::FlowKind;

/// Top-level error type for the YieldLens core library.
#[derive(Debug, thiserror::Error)]
pub enum YieldLensError {
    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The task running a flow ended before the flow did.
    #[error("The {kind} flow was interrupted")]
    Interrupted { kind: FlowKind },
}

impl YieldLensError {
    /// The message surfaced to the analyst for a failure in the given flow.
    ///
    /// Raw model output is never part of this text.
    pub fn user_message(&self, flow: FlowKind) -> String {
        match self {
            YieldLensError::Normalize(NormalizeError::EmptyResponse) => {
                "Received an empty response from the AI.".to_string()
            }
            YieldLensError::Normalize(NormalizeError::UnparsableResponse { .. }) => {
                "The AI output could not be understood. Please try again.".to_string()
            }
            YieldLensError::Llm(LlmError::InvalidCredential { .. }) => {
                "The configured API key is not valid. Please check your API key.".to_string()
            }
            YieldLensError::Llm(LlmError::NotConfigured) => match flow {
                FlowKind::Analysis => "API key is not configured. Cannot analyze data.".to_string(),
                FlowKind::Prediction => {
                    "API key is not configured. Cannot predict yield.".to_string()
                }
            },
            YieldLensError::Llm(other) => match flow {
                FlowKind::Analysis => format!("Failed to analyze data with AI: {}", other),
                FlowKind::Prediction => format!("Failed to predict yield with AI: {}", other),
            },
            YieldLensError::Ingest(IngestError::UnsupportedInput { .. }) => {
                "Unsupported file type. Please upload CSV or Excel files.".to_string()
            }
            YieldLensError::Ingest(other) => format!("Could not read the uploaded file: {}", other),
            YieldLensError::Validation(err) => err.to_string(),
            YieldLensError::Config(err) => err.to_string(),
            YieldLensError::Interrupted { kind } => {
                format!("The {} was interrupted. Please try again.", kind)
            }
        }
    }
}

/// Failures of the response normalizer.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Received an empty response from the model")]
    EmptyResponse,

    /// No fallback interpretation produced the required shape.
    /// `raw` is kept for diagnostic logging only.
    #[error("Model output was not parsable after direct, fenced and brace-span attempts")]
    UnparsableResponse { raw: String },
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Model service is not configured (no API key)")]
    NotConfigured,

    #[error("Authentication failed for provider {provider}")]
    InvalidCredential { provider: String },

    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from converting an uploaded file into canonical CSV text.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Unsupported file type: {file_name}")]
    UnsupportedInput { file_name: String },

    #[error("The uploaded table has no rows")]
    EmptyTable,

    #[error("File is not valid UTF-8 text: {message}")]
    Encoding { message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {message}")]
    Spreadsheet { message: String },
}

/// Local validation failures. None of these reach the model service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please upload and analyze data first before making predictions.")]
    NoDataset,

    #[error("Please provide input values for prediction.")]
    NoInputs,

    #[error("Unknown process parameter: {field}")]
    UnknownParameter { field: String },

    #[error("Invalid value '{value}' for {field}; expected one of: {allowed}")]
    InvalidOption {
        field: String,
        value: String,
        allowed: String,
    },

    #[error("Another {kind} is already in progress for this session")]
    Busy { kind: FlowKind },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    /// A configuration source could not be read or extracted.
    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `YieldLensError`.
pub type Result<T> = std::result::Result<T, YieldLensError>;
