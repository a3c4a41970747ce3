//! Chat request and response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::conversation::Message;
use super::document::ScoredChunk;
use crate::error::ErrorKind;
use crate::util::truncate_chars;

/// Characters of the query kept in log snapshots
const SNAPSHOT_QUERY_CHARS: usize = 64;

/// Characters of chunk text kept in a source snippet
const SNIPPET_CHARS: usize = 200;

/// A single chat turn request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's message
    pub query: String,

    /// Session token from a previous turn (optional)
    #[serde(default)]
    pub session_id: Option<String>,

    /// Owning user for newly created conversations (optional)
    #[serde(default)]
    pub user_id: Option<String>,

    /// Generation token budget, falls back to the configured default
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature, falls back to the configured default
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Ground the answer in retrieved chunks (default: false)
    #[serde(default)]
    pub use_retrieval: bool,

    /// Chunks to retrieve, falls back to the configured default
    #[serde(default)]
    pub top_k: Option<usize>,
}

impl ChatRequest {
    /// Create a request for a query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Continue an existing session
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the owning user
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the token budget
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Enable retrieval
    pub fn with_retrieval(mut self, top_k: Option<usize>) -> Self {
        self.use_retrieval = true;
        self.top_k = top_k;
        self
    }

    /// Loggable view of the request with the query cut short and the user hidden
    pub fn redacted_snapshot(&self) -> Value {
        json!({
            "query": truncate_chars(&self.query, SNAPSHOT_QUERY_CHARS),
            "query_chars": self.query.chars().count(),
            "session_id": self.session_id,
            "user_id": self.user_id.as_ref().map(|_| "<redacted>"),
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "use_retrieval": self.use_retrieval,
            "top_k": self.top_k,
        })
    }
}

/// Whether a turn produced an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Completed,
    Failed,
}

/// Failure detail on a degraded turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnError {
    /// Error category
    pub category: ErrorKind,
    /// User-safe message
    pub message: String,
    /// Correlates with the server log line
    pub trace_id: Uuid,
}

/// Supporting chunk cited by an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: u32,
    pub score: f32,
    pub snippet: String,
}

impl Source {
    pub fn from_scored(scored: &ScoredChunk) -> Self {
        Self {
            chunk_id: scored.chunk.id,
            document_id: scored.chunk.document_id,
            chunk_index: scored.chunk.chunk_index,
            score: scored.score,
            snippet: truncate_chars(&scored.chunk.content, SNIPPET_CHARS),
        }
    }
}

/// Turn metadata returned alongside the answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMetadata {
    pub conversation_id: Uuid,
    /// Messages in the conversation after this turn
    pub message_count: u64,
    pub conversation_created_at: DateTime<Utc>,
    pub processing_time_ms: u64,
    /// Processing time rounded to two decimals
    pub processing_time_seconds: f64,
    pub source_ids: Vec<Uuid>,
    /// Session token echoed from the request, if any
    pub session_id: Option<String>,
    pub model: String,
    pub execution_id: Option<Uuid>,
    pub chunks_retrieved: usize,
}

/// Result of one chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    /// Generated answer, empty on a degraded turn
    pub answer: String,
    /// Token to send with the next turn
    pub session_id: String,
    pub conversation_id: Uuid,
    pub sources: Vec<Source>,
    pub metadata: ChatMetadata,
    pub tokens_used: u32,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub status: TurnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TurnError>,
}

impl ChatResult {
    /// Whether the turn failed after the conversation was resolved
    pub fn is_degraded(&self) -> bool {
        self.status == TurnStatus::Failed
    }
}

/// Ordered transcript of a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub conversation_id: Uuid,
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_from_json() {
        let req: ChatRequest = serde_json::from_str(r#"{"query": "hi"}"#).unwrap();
        assert_eq!(req.query, "hi");
        assert!(req.session_id.is_none());
        assert!(!req.use_retrieval);
        assert!(req.temperature.is_none());
    }

    #[test]
    fn test_snapshot_redacts() {
        let long = "x".repeat(500);
        let req = ChatRequest::new(long).with_user("alice@example.com");
        let snapshot = req.redacted_snapshot();

        assert_eq!(snapshot["query_chars"], 500);
        assert!(snapshot["query"].as_str().unwrap().len() < 100);
        assert_eq!(snapshot["user_id"], "<redacted>");
        assert!(!snapshot.to_string().contains("alice"));
    }
}
