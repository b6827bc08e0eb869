/// Deterministic hashing embedder.
///
/// Hashes lowercase word tokens into a fixed number of buckets (a "hashed
/// bag of words"), so texts sharing vocabulary land close together while the
/// whole thing stays offline and reproducible. Used by tests and by the
/// `mock` embedding provider.
///
/// `DefaultHasher` output may change between Rust releases, so vectors are
/// only comparable within one build of the binary. Collections are rebuilt
/// at startup and never reused across builds.
use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbedderError, l2_normalize};

pub const MOCK_MODEL_NAME: &str = "hashed-bag-of-words";

/// A mock embedder that produces deterministic vectors from token hashes.
pub struct MockEmbedder {
    pub dimensions: usize,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let hash = hasher.finish();
        let index = (hash % self.dimensions as u64) as usize;
        // Top bit picks the sign so unrelated tokens partly cancel out.
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        if self.dimensions == 0 {
            return Err(EmbedderError::Misconfigured(
                "dimensions must be positive".to_string(),
            ));
        }

        let mut embedding = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        let mut tokens = 0usize;
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let (index, sign) = self.bucket(token);
            embedding[index] += sign;
            tokens += 1;
        }

        // Token-free input still gets a stable, non-zero vector.
        if tokens == 0 {
            let (index, sign) = self.bucket(&lowered);
            embedding[index] = sign;
        }

        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        MOCK_MODEL_NAME
    }
}
