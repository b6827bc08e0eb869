//! Query-time orchestration: embed, over-fetch, threshold, truncate.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::db::IndexError;
use crate::db::index::VectorIndex;
use crate::embedder::{Embedder, EmbedderError};
use crate::indexer::chunker::ChunkMetadata;

/// Candidates fetched per requested result, leaving headroom for the
/// score threshold without a second round trip.
pub const OVERFETCH_FACTOR: usize = 2;

/// Decimal places kept in reported scores.
pub const SCORE_DECIMALS: i32 = 4;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("query text must not be empty")]
    InvalidQuery,

    #[error("vector store is not ready yet")]
    NotReady,

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("index query failed: {0}")]
    Index(IndexError),
}

impl From<IndexError> for RetrievalError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::NotReady => RetrievalError::NotReady,
            IndexError::Embedding(e) => RetrievalError::Embedding(e),
            other => RetrievalError::Index(other),
        }
    }
}

/// One ranked retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub score: f64,
    pub text: String,
    pub metadata: ChunkMetadata,
}

pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Up to `top_k` chunks whose similarity is at least `min_score`, best first.
    ///
    /// Fewer than `top_k` results come back when not enough over-fetched
    /// candidates clear the threshold; the list is never padded.
    pub fn query(
        &self,
        text: &str,
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        if text.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery);
        }
        if !self.index.is_ready() {
            return Err(RetrievalError::NotReady);
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(text)?;
        let limit = top_k.saturating_mul(OVERFETCH_FACTOR).max(top_k);
        let candidates = self.index.search(&query_vector, limit)?;
        let candidate_count = candidates.len();

        // Threshold on the raw similarity; rounding is presentation only.
        let results: Vec<ScoredChunk> = candidates
            .into_iter()
            .filter(|n| n.similarity >= min_score)
            .take(top_k)
            .map(|n| ScoredChunk {
                chunk_id: n.chunk_id,
                score: round_score(n.similarity),
                text: n.text,
                metadata: n.metadata,
            })
            .collect();

        debug!(
            top_k,
            min_score,
            candidates = candidate_count,
            returned = results.len(),
            "query served"
        );
        Ok(results)
    }
}

/// Round to [`SCORE_DECIMALS`] places for stable output.
pub fn round_score(score: f64) -> f64 {
    let factor = 10f64.powi(SCORE_DECIMALS);
    (score * factor).round() / factor
}
