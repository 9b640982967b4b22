use super::errors::ApiError;
use super::models::{ChatRequest, StatusResponse};
use crate::retrieval::{EngineResponse, QueryMode, RagEngine};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RagEngine>,
}

/// `GET /`
pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "Legal AI API is running".to_string(),
    })
}

/// `POST /api/message`
pub async fn message(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<EngineResponse>, ApiError> {
    let Json(request) = payload?;

    let mode = match request.mode.as_deref() {
        None => QueryMode::default(),
        Some(raw) => raw.parse::<QueryMode>().map_err(ApiError::BadRequest)?,
    };

    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    tracing::info!("Query ({:?}): {}", mode, request.query);

    // A panicking pipeline becomes a 500 instead of a dropped connection
    let engine = Arc::clone(&state.engine);
    let response = tokio::spawn(async move { engine.respond(&request.query, mode).await })
        .await
        .map_err(|e| {
            tracing::error!("Request task failed: {}", e);
            ApiError::Internal("Internal server error".to_string())
        })?;

    Ok(Json(response))
}
