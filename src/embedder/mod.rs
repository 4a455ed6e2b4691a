/// Embedder trait and shared types for text embedding.
pub mod mock;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

pub use mock::MockEmbedder;
pub use openai::OpenAiEmbedder;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("embedding service error: {0}")]
    Response(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding batch length mismatch: sent {expected}, got {actual}")]
    BatchLength { expected: usize, actual: usize },
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let vectors = self.embed_batch(&[text.to_string()]).await?;
        let [vector]: [Vec<f32>; 1] =
            vectors
                .try_into()
                .map_err(|v: Vec<Vec<f32>>| EmbedderError::BatchLength {
                    expected: 1,
                    actual: v.len(),
                })?;
        Ok(vector)
    }

    /// Embed multiple texts; output order and length match the input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Checks a batch response against the request size and the fixed dimension.
pub fn check_batch(
    sent: usize,
    dimensions: usize,
    vectors: &[Vec<f32>],
) -> Result<(), EmbedderError> {
    if vectors.len() != sent {
        return Err(EmbedderError::BatchLength {
            expected: sent,
            actual: vectors.len(),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
        return Err(EmbedderError::DimensionMismatch {
            expected: dimensions,
            actual: bad.len(),
        });
    }
    Ok(())
}
