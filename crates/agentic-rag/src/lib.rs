//! agentic-rag: Retrieval-augmented conversations with durable history
//!
//! A chat turn resolves a session, optionally retrieves chunks from a vector
//! index, asks a generator for an answer, and persists both sides of the
//! exchange together with an execution trace. Transient store and generator
//! faults are retried with bounded backoff; anything that still fails after
//! the session is known is reported as a degraded result.

pub mod config;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod session;
pub mod storage;
pub mod types;
pub mod util;
pub mod validation;

pub use config::RagConfig;
pub use error::{Error, ErrorKind, Result};
pub use executor::{run_with_retry, RetryPolicy};
pub use orchestrator::ChatOrchestrator;
pub use retrieval::{DistanceMetric, Retriever, SimilarityIndex};
pub use session::SessionManager;
pub use storage::{ConversationDb, DocumentDb};
pub use types::{ChatRequest, ChatResult, Conversation, Message, MessageRole};
