//! Application state for the RAG server

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::RagConfig;
use crate::error::Result;
use crate::orchestrator::ChatOrchestrator;
use crate::providers::{Generator, OllamaEmbedder, PlaceholderGenerator};
use crate::retrieval::{Retriever, SimilarityIndex};
use crate::storage::{ConversationDb, DocumentDb};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: RagConfig,
    conversations: ConversationDb,
    documents: DocumentDb,
    orchestrator: ChatOrchestrator,
    /// Cancelled when the server shuts down
    shutdown: CancellationToken,
    started_at: DateTime<Utc>,
    ready: RwLock<bool>,
}

impl AppState {
    /// Open the databases named in `config` and wire up the chat pipeline
    pub async fn new(config: RagConfig) -> Result<Self> {
        tracing::info!("Initializing RAG application state...");

        let conversations = ConversationDb::new(&config.storage.conversations_path)?;
        tracing::info!(
            "Conversation store opened at {}",
            config.storage.conversations_path.display()
        );

        let documents = DocumentDb::new(&config.storage.documents_path)?;
        tracing::info!(
            "Document store opened at {}",
            config.storage.documents_path.display()
        );

        Self::with_stores(config, conversations, documents, Arc::new(PlaceholderGenerator::new()))
    }

    /// Build state around already-open stores
    pub fn with_stores(
        config: RagConfig,
        conversations: ConversationDb,
        documents: DocumentDb,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let mut orchestrator = ChatOrchestrator::new(
            Arc::new(conversations.clone()),
            Arc::new(conversations.clone()),
            generator,
            config.chat.clone(),
        )
        .with_policies(
            config.resilience.store.to_policy()?,
            config.resilience.generation.to_policy()?,
        );

        if config.retrieval.enabled {
            let embedder = Arc::new(OllamaEmbedder::new(&config.embeddings)?);
            let index = SimilarityIndex::new(Arc::new(documents.clone()), config.retrieval.max_k);
            orchestrator = orchestrator.with_retriever(Retriever::new(
                embedder,
                index,
                config.embeddings.model.clone(),
                config.retrieval.top_k,
                config.retrieval.metric,
            ));
            tracing::info!(
                "Retrieval enabled (model: {}, top_k: {}, metric: {})",
                config.embeddings.model,
                config.retrieval.top_k,
                config.retrieval.metric
            );
        } else {
            tracing::info!("Retrieval disabled");
        }

        tracing::info!("Chat generator: {}", orchestrator.model());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                conversations,
                documents,
                orchestrator,
                shutdown: CancellationToken::new(),
                started_at: Utc::now(),
                ready: RwLock::new(true),
            }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn orchestrator(&self) -> &ChatOrchestrator {
        &self.inner.orchestrator
    }

    pub fn conversations(&self) -> &ConversationDb {
        &self.inner.conversations
    }

    pub fn documents(&self) -> &DocumentDb {
        &self.inner.documents
    }

    /// Token for one request; cancelled on shutdown
    pub fn request_token(&self) -> CancellationToken {
        self.inner.shutdown.child_token()
    }

    /// Cancel in-flight work and stop reporting ready
    pub fn shutdown(&self) {
        self.set_ready(false);
        self.inner.shutdown.cancel();
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }
}
