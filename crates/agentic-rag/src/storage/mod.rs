//! Storage module for persistent data storage
//!
//! Provides SQLite-based persistence for conversations, execution traces, and
//! the document knowledge base.

mod columns;
mod conversation_db;
mod document_db;

pub use conversation_db::{ConversationDb, ConversationDbStats};
pub use document_db::{DocumentDb, DocumentDbStats};
