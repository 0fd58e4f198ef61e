//! HTTP error responses.
//!
//! Every failure is rendered as `{"error": {"code", "message"}}`. Flow errors
//! carry the same analyst-facing message that is recorded on the session.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use yieldlens_core::{
    FlowKind, IngestError, LlmError, NormalizeError, ValidationError, YieldLensError,
};

/// API error type.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unknown or malformed session id (404).
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Malformed request (400).
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upload body over `server.max_upload_bytes` (413).
    #[error("Upload exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// A dashboard flow failed.
    #[error("{message}")]
    Flow {
        #[source]
        source: YieldLensError,
        message: String,
    },
}

impl ApiError {
    /// Wrap a core error with the message the analyst sees for `flow`.
    pub fn flow(source: YieldLensError, flow: FlowKind) -> Self {
        let message = source.user_message(flow);
        ApiError::Flow { source, message }
    }

    pub fn status(&self) -> StatusCode {
        self.status_and_code().0
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ApiError::Flow { source, .. } => classify(source),
        }
    }
}

fn classify(error: &YieldLensError) -> (StatusCode, &'static str) {
    match error {
        YieldLensError::Validation(ValidationError::Busy { .. }) => (StatusCode::CONFLICT, "BUSY"),
        YieldLensError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        YieldLensError::Ingest(IngestError::UnsupportedInput { .. }) => {
            (StatusCode::BAD_REQUEST, "UNSUPPORTED_INPUT")
        }
        YieldLensError::Ingest(_) => (StatusCode::BAD_REQUEST, "INGEST_ERROR"),
        YieldLensError::Llm(LlmError::NotConfigured) => {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT_CONFIGURED")
        }
        YieldLensError::Llm(LlmError::InvalidCredential { .. }) => {
            (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIAL")
        }
        YieldLensError::Llm(_) => (StatusCode::BAD_GATEWAY, "MODEL_REQUEST_FAILED"),
        YieldLensError::Normalize(NormalizeError::EmptyResponse) => {
            (StatusCode::BAD_GATEWAY, "EMPTY_RESPONSE")
        }
        YieldLensError::Normalize(NormalizeError::UnparsableResponse { .. }) => {
            (StatusCode::BAD_GATEWAY, "UNPARSABLE_RESPONSE")
        }
        YieldLensError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        YieldLensError::Interrupted { .. } => (StatusCode::SERVICE_UNAVAILABLE, "INTERRUPTED"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}
