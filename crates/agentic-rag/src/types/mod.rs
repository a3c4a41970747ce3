//! Core types for the RAG system

pub mod chat;
pub mod conversation;
pub mod document;
pub mod execution;

/// Free-form JSON metadata attached to records
pub type Metadata = serde_json::Map<String, serde_json::Value>;

pub use chat::{
    ChatMetadata, ChatRequest, ChatResult, HistoryResponse, Source, TurnError, TurnStatus,
};
pub use conversation::{
    Conversation, ConversationStatus, Message, MessageRole, NewMessage,
    DEFAULT_CONVERSATION_TITLE,
};
pub use document::{
    Chunk, Document, DocumentStatus, Embedding, NewChunk, NewDocument, ScoredChunk,
};
pub use execution::{AgentExecution, ExecutionStatus, Outcome, ToolInvocation};
