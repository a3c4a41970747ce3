//! Distance metrics and the ranking order they induce

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::types::ScoredChunk;

/// Metric used to score a stored vector against a query vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cosine distance`, higher is better
    #[default]
    Cosine,
    /// L2 distance, lower is better
    Euclidean,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
        }
    }

    /// Score `candidate` against `query`. Both must have the same length.
    pub fn score(&self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(query, candidate),
            Self::Euclidean => euclidean_distance(query, candidate),
        }
    }

    /// Whether larger scores rank first
    pub fn higher_is_better(&self) -> bool {
        matches!(self, Self::Cosine)
    }

    /// Order two scores so the better one sorts first
    pub fn compare(&self, a: f32, b: f32) -> Ordering {
        if self.higher_is_better() {
            b.total_cmp(&a)
        } else {
            a.total_cmp(&b)
        }
    }

    /// Sort scored chunks best first. Exact ties fall back to chunk id ascending.
    pub fn rank(&self, results: &mut [ScoredChunk]) {
        results.sort_by(|a, b| {
            self.compare(a.score, b.score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            other => Err(Error::invalid_field(
                "metric",
                format!("Unknown distance metric: {}", other),
            )),
        }
    }
}

/// Cosine similarity accumulated in f64. A zero-norm vector scores 0.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, Metadata};
    use chrono::Utc;
    use uuid::Uuid;

    fn scored(id: Uuid, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id,
                document_id: Uuid::nil(),
                chunk_index: 0,
                content: String::new(),
                token_count: 0,
                start_char: None,
                end_char: None,
                metadata: Metadata::new(),
                created_at: Utc::now(),
            },
            model_name: "m".into(),
            score,
        }
    }

    #[test]
    fn test_cosine() {
        let m = DistanceMetric::Cosine;
        assert!((m.score(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(m.score(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(m.score(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_euclidean() {
        let m = DistanceMetric::Euclidean;
        assert!((m.score(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert_eq!(m.score(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_rank_direction_and_ties() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        let other = Uuid::from_u128(3);

        let mut results = vec![scored(high, 0.5), scored(other, 0.9), scored(low, 0.5)];
        DistanceMetric::Cosine.rank(&mut results);
        let ids: Vec<_> = results.iter().map(|r| r.chunk.id).collect();
        assert_eq!(ids, vec![other, low, high]);

        DistanceMetric::Euclidean.rank(&mut results);
        let ids: Vec<_> = results.iter().map(|r| r.chunk.id).collect();
        assert_eq!(ids, vec![low, high, other]);
    }

    #[test]
    fn test_parse() {
        assert_eq!("L2".parse::<DistanceMetric>().unwrap(), DistanceMetric::Euclidean);
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }
}
