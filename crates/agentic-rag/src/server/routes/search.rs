//! Direct vector search over the knowledge base

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::retrieval::DistanceMetric;
use crate::server::state::AppState;
use crate::types::Source;
use crate::util::duration_millis;
use crate::validation::require_non_blank;

/// Search request
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Falls back to the configured default
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Ranked chunks for a query
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub model: String,
    pub metric: DistanceMetric,
    pub results: Vec<Source>,
    pub processing_time_ms: u64,
}

/// POST /api/search - Embed a query and return its nearest chunks
pub async fn search(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();
    let Json(request) = payload.map_err(|e| Error::invalid(e.body_text()))?;
    require_non_blank(&request.query, "query")?;

    let retriever = state.orchestrator().retriever().ok_or_else(|| {
        Error::invalid_field("query", "retrieval is not configured on this server")
    })?;

    let chunks = retriever.retrieve(&request.query, request.top_k).await?;
    let processing_time_ms = duration_millis(start.elapsed());
    tracing::info!(
        "Search returned {} chunks in {}ms",
        chunks.len(),
        processing_time_ms
    );

    Ok(Json(SearchResponse {
        model: retriever.model().to_string(),
        metric: retriever.metric(),
        results: chunks.iter().map(Source::from_scored).collect(),
        processing_time_ms,
    }))
}
