//! Similarity index over the document store

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::providers::{DocumentStore, EmbeddingProvider};
use crate::types::ScoredChunk;

use super::metric::DistanceMetric;

/// Default upper bound on `k`
pub const DEFAULT_MAX_K: usize = 100;

/// Validated nearest-neighbour search with a stable ranking
///
/// The store does the heavy lifting. The index checks the query, then
/// re-filters and re-ranks whatever the store returns so results never mix
/// models and ties always break the same way.
#[derive(Clone)]
pub struct SimilarityIndex {
    store: Arc<dyn DocumentStore>,
    max_k: usize,
}

impl SimilarityIndex {
    /// Create an index with the given upper bound on `k`
    pub fn new(store: Arc<dyn DocumentStore>, max_k: usize) -> Self {
        Self { store, max_k }
    }

    /// Largest accepted `k`
    pub fn max_k(&self) -> usize {
        self.max_k
    }

    /// Up to `k` chunks embedded by `model`, best first under `metric`
    pub async fn search(
        &self,
        query: &[f32],
        model: &str,
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 || k > self.max_k {
            return Err(Error::invalid_field(
                "k",
                format!("k must be between 1 and {}, but was {}", self.max_k, k),
            ));
        }
        if query.is_empty() {
            return Err(Error::invalid_field("query_vector", "query vector cannot be empty"));
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(Error::invalid_field(
                "query_vector",
                "query vector must contain only finite values",
            ));
        }

        let dimension = self.store.embedding_dimension(model).await?.ok_or_else(|| {
            Error::invalid_field("model", format!("No embeddings registered for model '{}'", model))
        })?;
        if dimension != query.len() {
            return Err(Error::invalid_field(
                "query_vector",
                format!(
                    "query vector has {} dimensions but model '{}' uses {}",
                    query.len(),
                    model,
                    dimension
                ),
            ));
        }

        let mut results = self
            .store
            .similarity_search(query, model, k, metric)
            .await?;

        results.retain(|r| r.model_name == model);
        metric.rank(&mut results);
        results.truncate(k);

        tracing::debug!(
            "Similarity search on {} ({}, k={}) returned {} chunks",
            model,
            metric,
            k,
            results.len()
        );

        Ok(results)
    }
}

/// Embeds a text query and searches the index with fixed settings
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: SimilarityIndex,
    model: String,
    top_k: usize,
    metric: DistanceMetric,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: SimilarityIndex,
        model: impl Into<String>,
        top_k: usize,
        metric: DistanceMetric,
    ) -> Self {
        Self {
            embedder,
            index,
            model: model.into(),
            top_k,
            metric,
        }
    }

    /// Embedding model searched against
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Default number of chunks returned
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Metric used for ranking
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Underlying index
    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    /// Embed `query` and return its nearest chunks
    pub async fn retrieve(&self, query: &str, top_k: Option<usize>) -> Result<Vec<ScoredChunk>> {
        let vector = self.embedder.embed(query).await?;
        self.index
            .search(&vector, &self.model, top_k.unwrap_or(self.top_k), self.metric)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{Chunk, Metadata};
    use async_trait::async_trait;
    use chrono::Utc;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Store that returns every row unsorted, including rows of other models
    struct LooseStore {
        dimension: Option<usize>,
        rows: Vec<(Uuid, String, Vec<f32>)>,
    }

    fn chunk(id: Uuid) -> Chunk {
        Chunk {
            id,
            document_id: Uuid::nil(),
            chunk_index: 0,
            content: format!("chunk {}", id),
            token_count: 2,
            start_char: None,
            end_char: None,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    #[async_trait]
    impl DocumentStore for LooseStore {
        async fn embedding_dimension(&self, _model: &str) -> Result<Option<usize>> {
            Ok(self.dimension)
        }

        async fn similarity_search(
            &self,
            vector: &[f32],
            _model: &str,
            _k: usize,
            metric: DistanceMetric,
        ) -> Result<Vec<ScoredChunk>> {
            Ok(self
                .rows
                .iter()
                .rev()
                .map(|(id, model, v)| ScoredChunk {
                    chunk: chunk(*id),
                    model_name: model.clone(),
                    score: metric.score(vector, v),
                })
                .collect())
        }

        async fn get_chunk(&self, id: Uuid) -> Result<Option<Chunk>> {
            Ok(self.rows.iter().find(|r| r.0 == id).map(|r| chunk(r.0)))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "loose"
        }
    }

    fn index_with(rows: Vec<(Uuid, String, Vec<f32>)>) -> SimilarityIndex {
        SimilarityIndex::new(
            Arc::new(LooseStore {
                dimension: Some(2),
                rows,
            }),
            DEFAULT_MAX_K,
        )
    }

    #[tokio::test]
    async fn test_filters_model_and_truncates() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let index = index_with(vec![
            (a, "m1".into(), vec![1.0, 0.0]),
            (b, "m2".into(), vec![1.0, 0.0]),
            (c, "m1".into(), vec![0.0, 1.0]),
        ]);

        let results = index
            .search(&[1.0, 0.0], "m1", 5, DistanceMetric::Cosine)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.model_name == "m1"));
        assert_eq!(results[0].chunk.id, a);

        let one = index
            .search(&[1.0, 0.0], "m1", 1, DistanceMetric::Euclidean)
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].chunk.id, a);
    }

    #[tokio::test]
    async fn test_rejects_bad_queries() {
        let index = index_with(vec![]);

        for (vector, k) in [
            (vec![], 3),
            (vec![f32::NAN, 1.0], 3),
            (vec![1.0, 0.0, 0.0], 3),
            (vec![1.0, 0.0], 0),
            (vec![1.0, 0.0], DEFAULT_MAX_K + 1),
        ] {
            let err = index
                .search(&vector, "m1", k, DistanceMetric::Cosine)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[tokio::test]
    async fn test_unknown_model_vs_empty_model() {
        let unknown = SimilarityIndex::new(
            Arc::new(LooseStore {
                dimension: None,
                rows: vec![],
            }),
            DEFAULT_MAX_K,
        );
        let err = unknown
            .search(&[1.0, 0.0], "nope", 3, DistanceMetric::Cosine)
            .await
            .unwrap_err();
        assert!(err.field_errors().unwrap().contains_key("model"));

        let empty = index_with(vec![]);
        let results = empty
            .search(&[1.0, 0.0], "m1", 3, DistanceMetric::Cosine)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        fn dimensions(&self) -> usize {
            self.0.len()
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_retriever_uses_defaults() {
        let ids: Vec<Uuid> = (1..=4).map(Uuid::from_u128).collect();
        let index = index_with(
            ids.iter()
                .enumerate()
                .map(|(i, id)| (*id, "m1".to_string(), vec![1.0, i as f32]))
                .collect(),
        );
        let retriever = Retriever::new(
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
            index,
            "m1",
            2,
            DistanceMetric::Cosine,
        );

        let results = retriever.retrieve("anything", None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, ids[0]);

        let all = retriever.retrieve("anything", Some(10)).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    fn rows_strategy() -> impl Strategy<Value = Vec<(u8, Vec<f32>)>> {
        prop::collection::vec(
            (0u8..3, prop::collection::vec(-4i8..=4, 2).prop_map(|v| {
                v.into_iter().map(f32::from).collect::<Vec<f32>>()
            })),
            0..24,
        )
    }

    proptest! {
        #[test]
        fn prop_search_is_bounded_filtered_and_deterministic(
            rows in rows_strategy(),
            query in prop::collection::vec(-4i8..=4, 2),
            k in 1usize..10,
            euclidean in any::<bool>(),
        ) {
            let query: Vec<f32> = query.into_iter().map(f32::from).collect();
            let metric = if euclidean { DistanceMetric::Euclidean } else { DistanceMetric::Cosine };
            let index = index_with(
                rows.iter()
                    .enumerate()
                    .map(|(i, (m, v))| (Uuid::from_u128(i as u128 + 1), format!("m{}", m), v.clone()))
                    .collect(),
            );

            let first = tokio_test::block_on(index.search(&query, "m0", k, metric)).unwrap();
            let second = tokio_test::block_on(index.search(&query, "m0", k, metric)).unwrap();

            prop_assert!(first.len() <= k);
            prop_assert!(first.iter().all(|r| r.model_name == "m0"));
            let first_ids: Vec<Uuid> = first.iter().map(|r| r.chunk.id).collect();
            let second_ids: Vec<Uuid> = second.iter().map(|r| r.chunk.id).collect();
            prop_assert_eq!(first_ids, second_ids);
            for pair in first.windows(2) {
                prop_assert_ne!(metric.compare(pair[0].score, pair[1].score), std::cmp::Ordering::Greater);
            }
        }
    }
}
