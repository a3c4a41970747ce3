//! Chat endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::{Error, ErrorEnvelope, Result};
use crate::server::state::AppState;
use crate::types::{ChatRequest, ChatResult};

/// POST /api/chat - Run one chat turn
///
/// A degraded turn is reported through the error envelope, with the
/// conversation it belongs to under `details`.
pub async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload.map_err(|e| Error::invalid(e.body_text()))?;

    tracing::info!(
        "Chat: {} chars, session: {}",
        request.query.chars().count(),
        request.session_id.as_deref().unwrap_or("<new>")
    );

    let cancel = state.request_token();
    let result = state.orchestrator().chat(request, &cancel).await?;

    if result.is_degraded() {
        return Ok(degraded_response(result).into_response());
    }
    Ok(Json(result).into_response())
}

fn degraded_response(result: ChatResult) -> Response {
    let details = json!({
        "conversation_id": result.conversation_id,
        "session_id": result.session_id,
        "execution_id": result.metadata.execution_id,
        "message_count": result.metadata.message_count,
    });

    match result.error {
        Some(error) => ErrorEnvelope {
            timestamp: result.timestamp,
            status: error.category.status_code().as_u16(),
            error: error.category,
            message: error.message,
            field_errors: None,
            path: None,
            trace_id: error.trace_id,
            details: None,
        }
        .with_path("/api/chat")
        .with_details(details)
        .into_response(),
        None => Error::internal("degraded turn without error detail").into_response(),
    }
}
