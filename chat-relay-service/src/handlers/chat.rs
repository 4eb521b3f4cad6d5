//! Chat and session handlers.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::services::ChatTurn;
use crate::AppState;
use service_core::error::AppError;

/// Session used when the client does not name one.
pub const DEFAULT_SESSION_ID: &str = "default";

fn default_session_id() -> String {
    DEFAULT_SESSION_ID.to_string()
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_session_id")]
    pub session_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearRequest {
    #[serde(default = "default_session_id")]
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub message: String,
}

/// Run one chat turn.
///
/// The turn runs in its own task so a panic anywhere below is reported as a
/// 500 and recorded instead of tearing down the connection.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatTurn>, AppError> {
    let Json(req) = payload?;
    let started = Instant::now();
    let service = state.chat.clone();
    let session_id = req.session_id.clone();
    let message = req.message.clone();

    let task = tokio::spawn(async move { service.handle_turn(&session_id, &message).await });

    match task.await {
        Ok(result) => Ok(Json(result?)),
        Err(join_error) => {
            tracing::error!(
                session_id = %req.session_id,
                error = %join_error,
                "Chat turn aborted"
            );
            state
                .chat
                .record_unhandled(
                    &req.session_id,
                    &req.message,
                    &join_error.to_string(),
                    started.elapsed().as_secs_f64(),
                )
                .await;
            Err(AppError::InternalError(anyhow::anyhow!("{}", join_error)))
        }
    }
}

/// Empty a session's history.
pub async fn clear_conversation(
    State(state): State<AppState>,
    payload: Result<Json<ClearRequest>, JsonRejection>,
) -> Result<Json<ClearResponse>, AppError> {
    let Json(req) = payload?;
    state.chat.store().clear(&req.session_id).await;
    tracing::info!(session_id = %req.session_id, "Conversation cleared");

    Ok(Json(ClearResponse {
        message: "Conversation cleared".to_string(),
    }))
}
