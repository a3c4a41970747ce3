//! Document store provider trait for chunk lookup and vector search

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::retrieval::DistanceMetric;
use crate::types::{Chunk, ScoredChunk};

/// Read side of the knowledge base used by retrieval
///
/// Implementations:
/// - `DocumentDb`: SQLite tables with brute-force scoring
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Dimension registered for a model, `None` if the model is unknown
    async fn embedding_dimension(&self, model: &str) -> Result<Option<usize>>;

    /// Up to `k` chunks embedded by `model`, ranked by `metric`
    async fn similarity_search(
        &self,
        vector: &[f32],
        model: &str,
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredChunk>>;

    /// Fetch one chunk by ID
    async fn get_chunk(&self, id: Uuid) -> Result<Option<Chunk>>;

    /// Check if the store is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
