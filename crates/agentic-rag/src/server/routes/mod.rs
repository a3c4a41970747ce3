//! API routes for the RAG server

pub mod chat;
pub mod conversations;
pub mod search;

use axum::{
    extract::State,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::providers::{ConversationStore, DocumentStore};
use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat::chat))
        .route("/conversations/:id", delete(conversations::delete_conversation))
        .route("/conversations/:id/messages", get(conversations::get_messages))
        .route("/conversations/:id/executions", get(conversations::get_executions))
        .route("/search", post(search::search))
        .route("/health", get(health))
        .route("/info", get(info))
}

/// Store reachability and pipeline summary
async fn health(State(state): State<AppState>) -> Json<Value> {
    let conversations = state.conversations().health_check().await.unwrap_or_else(|e| {
        tracing::warn!("Conversation store health check failed: {}", e);
        false
    });
    let documents = DocumentStore::health_check(state.documents())
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Document store health check failed: {}", e);
            false
        });

    let stats = match state.conversations().stats_blocking().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::warn!("Conversation stats unavailable: {}", e);
            None
        }
    };
    let orchestrator = state.orchestrator();

    Json(json!({
        "status": if conversations && documents { "healthy" } else { "degraded" },
        "started_at": state.started_at(),
        "stores": {
            "conversations": conversations,
            "documents": documents,
        },
        "model": orchestrator.model(),
        "retrieval": orchestrator.retriever().map(|r| json!({
            "model": r.model(),
            "top_k": r.top_k(),
            "metric": r.metric(),
        })),
        "stats": stats.map(|s| json!({
            "conversations": s.conversations,
            "messages": s.messages,
            "executions": s.executions,
            "failed_executions": s.failed_executions,
        })),
    }))
}

/// API info endpoint
async fn info() -> Json<Value> {
    Json(json!({
        "name": "agentic-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Retrieval-augmented conversations with session history and execution traces",
        "endpoints": {
            "POST /api/chat": "Run one chat turn",
            "GET /api/conversations/:id/messages": "Ordered transcript",
            "GET /api/conversations/:id/executions": "Agent executions with tool calls",
            "DELETE /api/conversations/:id": "Delete a conversation",
            "POST /api/search": "Vector search over the knowledge base",
            "GET /api/health": "Store health and stats"
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RagConfig;
    use crate::error::{Error, Result};
    use crate::providers::{Generation, GenerationRequest, Generator, PlaceholderGenerator};
    use crate::server::RagServer;
    use crate::storage::{ConversationDb, DocumentDb};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use async_trait::async_trait;
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Model server that never answers
    struct UnreachableGenerator;

    #[async_trait]
    impl Generator for UnreachableGenerator {
        async fn generate(&self, _request: GenerationRequest<'_>) -> Result<Generation> {
            Err(Error::Connection("connect to 10.1.2.3:11434 refused".into()))
        }

        fn name(&self) -> &str {
            "unreachable"
        }

        fn model(&self) -> &str {
            "unreachable-model"
        }
    }

    fn router_with(config: RagConfig, generator: Arc<dyn Generator>) -> Router {
        let state = AppState::with_stores(
            config,
            ConversationDb::in_memory().unwrap(),
            DocumentDb::in_memory().unwrap(),
            generator,
        )
        .unwrap();
        RagServer::with_state(state).build_router()
    }

    fn router() -> Router {
        router_with(RagConfig::default(), Arc::new(PlaceholderGenerator::new()))
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_chat_then_history_then_delete() {
        let router = router();

        let (status, body) = send(
            &router,
            "POST",
            "/api/chat",
            Some(json!({ "query": "How does RAG work?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert!(!body["answer"].as_str().unwrap().is_empty());
        let session = body["session_id"].as_str().unwrap().to_string();

        let (status, history) =
            send(&router, "GET", &format!("/api/conversations/{}/messages", session), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["messages"].as_array().unwrap().len(), 2);
        assert_eq!(history["messages"][0]["role"], "user");

        let (status, trace) =
            send(&router, "GET", &format!("/api/conversations/{}/executions", session), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(trace["executions"][0]["status"], "completed");

        let (_, health) = send(&router, "GET", "/api/health", None).await;
        assert_eq!(health["stats"]["conversations"], 1);
        assert_eq!(health["stats"]["messages"], 2);

        let (status, _) =
            send(&router, "DELETE", &format!("/api/conversations/{}", session), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) =
            send(&router, "GET", &format!("/api/conversations/{}/messages", session), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_degraded_turn_returns_envelope_with_conversation() {
        let mut config = RagConfig::default();
        config.resilience.generation.max_attempts = 2;
        config.resilience.generation.backoff_ms = 1;
        config.resilience.generation.max_backoff_ms = 1;
        let router = router_with(config, Arc::new(UnreachableGenerator));

        let (status, body) = send(
            &router,
            "POST",
            "/api/chat",
            Some(json!({ "query": "Is anyone there?" })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "transient_dependency_failure");
        assert_eq!(body["status"], 503);
        assert_eq!(body["path"], "/api/chat");
        assert!(body["trace_id"].is_string());

        let message = body["message"].as_str().unwrap();
        assert!(!message.contains("refused"));
        assert!(!message.contains("10.1.2.3"));

        // The user turn was kept and is reachable through the reported conversation
        let conversation = body["details"]["conversation_id"].as_str().unwrap().to_string();
        assert_eq!(body["details"]["session_id"], conversation.as_str());
        let (status, history) = send(
            &router,
            "GET",
            &format!("/api/conversations/{}/messages", conversation),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["messages"].as_array().unwrap().len(), 1);
        assert_eq!(history["messages"][0]["role"], "user");

        let (_, trace) = send(
            &router,
            "GET",
            &format!("/api/conversations/{}/executions", conversation),
            None,
        )
        .await;
        assert_eq!(trace["executions"][0]["status"], "failed");
    }

    #[tokio::test]
    async fn test_invalid_chat_uses_envelope() {
        let router = router();

        let (status, body) = send(
            &router,
            "POST",
            "/api/chat",
            Some(json!({ "query": "hi", "temperature": 2.5 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_argument");
        assert_eq!(body["status"], 400);
        assert!(body["field_errors"]["temperature"].is_string());
        assert!(body["trace_id"].is_string());

        let (status, body) = send(&router, "POST", "/api/chat", Some(json!({ "nope": 1 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_malformed_conversation_id() {
        let router = router();
        let (status, body) =
            send(&router, "GET", "/api/conversations/not-a-uuid/messages", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["field_errors"]["session_id"].is_string());
    }

    #[tokio::test]
    async fn test_search_requires_retrieval() {
        let router = router();
        let (status, body) =
            send(&router, "POST", "/api/search", Some(json!({ "query": "rag" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_health_and_info() {
        let router = router();

        let (status, body) = send(&router, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert!(body["retrieval"].is_null());
        assert_eq!(body["stats"]["conversations"], 0);

        let (status, body) = send(&router, "GET", "/api/info", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "agentic-rag");

        let (status, _) = send(&router, "GET", "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
