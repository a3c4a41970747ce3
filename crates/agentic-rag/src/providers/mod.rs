//! Provider abstractions for storage, embeddings, and answer generation
//!
//! The orchestration core only talks to these traits, so stores and models
//! can be swapped without touching it.

pub mod conversation_store;
pub mod document_store;
pub mod embedding;
pub mod generator;
pub mod ollama;
pub mod placeholder;

pub use conversation_store::{ConversationStore, ExecutionLog};
pub use document_store::DocumentStore;
pub use embedding::EmbeddingProvider;
pub use generator::{Generation, GenerationRequest, Generator};
pub use ollama::OllamaEmbedder;
pub use placeholder::{PlaceholderGenerator, PLACEHOLDER_MODEL};
