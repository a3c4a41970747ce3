//! Conversation history, trace and deletion endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{AgentExecution, HistoryResponse};
use crate::validation::parse_uuid;

/// Execution trace of one conversation
#[derive(Debug, Serialize)]
pub struct ExecutionsResponse {
    pub conversation_id: Uuid,
    pub executions: Vec<AgentExecution>,
}

/// GET /api/conversations/:id/messages - Ordered transcript
pub async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>> {
    let history = state.orchestrator().history(&id).await?;
    tracing::debug!(
        "History for {}: {} messages",
        history.conversation_id,
        history.messages.len()
    );
    Ok(Json(history))
}

/// GET /api/conversations/:id/executions - Agent executions with tool calls
pub async fn get_executions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionsResponse>> {
    let conversation_id = parse_uuid(&id, "conversation_id")?;
    let executions = state.orchestrator().executions(&id).await?;
    Ok(Json(ExecutionsResponse {
        conversation_id,
        executions,
    }))
}

/// DELETE /api/conversations/:id - Delete a conversation
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.orchestrator().delete_conversation(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
