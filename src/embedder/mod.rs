/// Embedder trait and shared types for text embedding.
///
/// The index and the retriever only ever see `dyn Embedder`; which provider
/// backs it is decided once at startup from configuration.
pub mod mock;
pub mod openai;

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("embedding request failed: {0}")]
    RequestFailed(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedder misconfigured: {0}")]
    Misconfigured(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`. Output must be deterministic for identical input, and
/// `embed_batch` must return one vector per input in input order.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut vectors = self.embed_batch(&[text])?;
        vectors
            .pop()
            .ok_or_else(|| EmbedderError::InvalidResponse("no vector returned".to_string()))
    }

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;

    /// Model identifier reported by introspection endpoints.
    fn model_name(&self) -> &str;
}

/// Scale `vector` to unit length in place. Zero vectors are left untouched.
pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm_sq: f32 = vector.iter().map(|v| v * v).sum();
    if norm_sq > 0.0 {
        let inv = 1.0 / norm_sq.sqrt();
        for v in vector.iter_mut() {
            *v *= inv;
        }
    }
}
