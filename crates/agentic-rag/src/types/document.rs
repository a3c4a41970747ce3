//! Document, chunk and embedding types for the knowledge base

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use uuid::Uuid;

use super::Metadata;
use crate::error::Error;

/// Lifecycle of an ingested document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Registered, chunks not yet embedded
    Pending,
    /// Chunked and searchable
    Indexed,
    /// Ingestion failed
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Indexed => "indexed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "indexed" => Ok(Self::Indexed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::invalid(format!("Unknown document status: {}", other))),
        }
    }
}

/// A document that has been ingested
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: Uuid,
    /// Display title
    pub title: Option<String>,
    /// Where the document came from (path, URL, ...)
    pub source: Option<String>,
    /// Full text
    pub content: String,
    /// SHA-256 of the content, unique across documents
    pub content_hash: String,
    /// Free-form type label (e.g. "pdf", "faq")
    pub document_type: Option<String>,
    /// Lifecycle status
    pub status: DocumentStatus,
    /// Additional metadata
    pub metadata: Metadata,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Input for registering a new document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: Option<String>,
    pub source: Option<String>,
    pub content: String,
    pub document_type: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewDocument {
    /// Create a document input from its text
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Hex-encoded SHA-256 of the content
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A contiguous slice of a document, indexed for retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Parent document ID
    pub document_id: Uuid,
    /// Position within the document, contiguous from 0
    pub chunk_index: u32,
    /// Chunk text
    pub content: String,
    /// Approximate token count
    pub token_count: u32,
    /// Character offset where the chunk starts in the document
    pub start_char: Option<u32>,
    /// Character offset where the chunk ends in the document
    pub end_char: Option<u32>,
    /// Additional metadata
    pub metadata: Metadata,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Input for appending a chunk to a document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewChunk {
    pub content: String,
    pub start_char: Option<u32>,
    pub end_char: Option<u32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewChunk {
    /// Create a chunk input from its text
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Set the character span
    pub fn with_span(mut self, start_char: u32, end_char: u32) -> Self {
        self.start_char = Some(start_char);
        self.end_char = Some(end_char);
        self
    }
}

/// Vector representation of a chunk produced by one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// Unique embedding ID
    pub id: Uuid,
    /// Chunk this vector represents
    pub chunk_id: Uuid,
    /// Model that produced the vector
    pub model_name: String,
    /// The vector itself
    pub vector: Vec<f32>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Embedding {
    /// Vector dimensionality
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// A retrieved chunk with its metric score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The matched chunk
    pub chunk: Chunk,
    /// Model whose embedding matched
    pub model_name: String,
    /// Metric score. Direction depends on the metric used.
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        let a = NewDocument::new("hello world");
        let b = NewDocument::new("hello world").with_title("Greeting");
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 64);
        assert_ne!(a.content_hash(), NewDocument::new("hello").content_hash());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("indexed".parse::<DocumentStatus>().unwrap(), DocumentStatus::Indexed);
        assert!("archived".parse::<DocumentStatus>().is_err());
    }
}
