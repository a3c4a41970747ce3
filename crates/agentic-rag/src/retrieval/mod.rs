//! Vector retrieval: distance metrics, the similarity index, and the retriever

pub mod index;
pub mod metric;

pub use index::{Retriever, SimilarityIndex, DEFAULT_MAX_K};
pub use metric::DistanceMetric;
