//! Route handlers for the dashboard API.

use crate::SharedState;
use crate::error::ApiError;
use axum::{
    Json,
    body::Bytes,
    extract::{
        Path, Query, State,
        rejection::{BytesRejection, JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use yieldlens_core::{
    FlowKind, InputValue, PREDICTION_PARAMETERS, SessionView, SharedSession, YieldLensError,
};

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub file_name: String,
}

/// Body of `PUT /api/sessions/{id}/inputs`. A null or blank value clears the field.
#[derive(Debug, Deserialize)]
pub struct SetInputRequest {
    pub field: String,
    pub value: Option<InputValue>,
}

pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let gateway = state.shell.gateway();
    axum::Json(serde_json::json!({
        "status": "ok",
        "sessions": state.store.len().await,
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
        "model_configured": gateway.is_configured(),
        "model": gateway.model_name(),
    }))
}

pub async fn parameters_handler() -> impl IntoResponse {
    Json(PREDICTION_PARAMETERS)
}

pub async fn create_session_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let session = state.store.create().await;
    let view = session.lock().await.view();
    (StatusCode::CREATED, Json(view))
}

pub async fn get_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = lookup(&state, &id).await?;
    let view = session.lock().await.view();
    Ok(Json(view))
}

pub async fn delete_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let uuid = parse_id(&id)?;
    if state.store.remove(&uuid).await {
        tracing::debug!(session_id = %uuid, "Session deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound(id))
    }
}

pub async fn upload_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    params: Result<Query<UploadParams>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<SessionView>, ApiError> {
    let session = lookup(&state, &id).await?;
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let bytes = body.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge {
                limit: state.server.max_upload_bytes,
            }
        } else {
            ApiError::BadRequest(e.body_text())
        }
    })?;

    let view = state
        .shell
        .upload(&session, &params.file_name, bytes)
        .await
        .map_err(|e| ApiError::flow(e, FlowKind::Analysis))?;
    Ok(Json(view))
}

pub async fn set_input_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Result<Json<SetInputRequest>, JsonRejection>,
) -> Result<Json<SessionView>, ApiError> {
    let session = lookup(&state, &id).await?;
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let value = request
        .value
        .unwrap_or_else(|| InputValue::Text(String::new()));

    let mut s = session.lock().await;
    s.set_input(&request.field, value)
        .map_err(|e| ApiError::flow(YieldLensError::from(e), FlowKind::Prediction))?;
    Ok(Json(s.view()))
}

pub async fn predict_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = lookup(&state, &id).await?;
    let view = state
        .shell
        .predict(&session)
        .await
        .map_err(|e| ApiError::flow(e, FlowKind::Prediction))?;
    Ok(Json(view))
}

fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::SessionNotFound(id.to_string()))
}

async fn lookup(state: &SharedState, id: &str) -> Result<SharedSession, ApiError> {
    let uuid = parse_id(id)?;
    state
        .store
        .get(&uuid)
        .await
        .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))
}
