//! Vector index trait, shared types and cosine similarity.
pub mod memory;
pub mod vectorize;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::indexer::ChunkMetadata;

pub use memory::InMemoryIndex;
pub use vectorize::{VectorizeConfig, VectorizeIndex};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index backend error: {0}")]
    Backend(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("index lock poisoned")]
    Lock,

    #[error("index {0} does not exist")]
    NotCreated(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
    DotProduct,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::DotProduct => "dot-product",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// Storage for chunk embeddings.
///
/// All implementations must be `Send + Sync` so one index can be shared
/// behind `Arc` by concurrent queries and an ingestion run.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Prepares the index for vectors of `dimension`.
    async fn create_index(&self, dimension: usize, metric: DistanceMetric)
    -> Result<(), IndexError>;

    async fn insert(
        &self,
        id: &str,
        vector: Vec<f32>,
        metadata: ChunkMetadata,
    ) -> Result<(), IndexError> {
        self.upsert(vec![IndexEntry {
            id: id.to_string(),
            vector,
            metadata,
        }])
        .await
        .map(|_| ())
    }

    /// Writes entries, replacing existing ids. Every vector is validated
    /// before anything is written. Returns the number of entries written.
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<usize, IndexError>;

    /// Removes ids; absent ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<(), IndexError>;

    /// Top `top_k` hits with score >= `threshold`, best first.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>, IndexError>;

    /// Drops every stored vector.
    async fn delete_index(&self) -> Result<(), IndexError>;

    /// Configured vector dimension.
    fn dimension(&self) -> usize;
}

pub(crate) fn check_dimensions(expected: usize, entries: &[IndexEntry]) -> Result<(), IndexError> {
    match entries.iter().find(|e| e.vector.len() != expected) {
        Some(bad) => Err(IndexError::DimensionMismatch {
            expected,
            actual: bad.vector.len(),
        }),
        None => Ok(()),
    }
}

/// Cosine similarity; 0 for a zero-norm vector or mismatched lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
