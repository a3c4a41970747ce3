//! Answer generation seam

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Message, ScoredChunk};

/// Everything a generator may look at for one turn
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// The user's query
    pub query: &'a str,
    /// Retrieved chunks, best first. Empty when retrieval was off.
    pub context: &'a [ScoredChunk],
    /// Transcript in order, ending with this turn's user message
    pub history: &'a [Message],
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Generator output
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub tokens_used: u32,
    /// Chunk IDs the answer drew on
    pub sources: Vec<Uuid>,
    pub model: String,
}

/// Trait for answer generation
///
/// Implementations:
/// - `PlaceholderGenerator`: deterministic keyword responses
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce an answer for one turn
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Generation>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
