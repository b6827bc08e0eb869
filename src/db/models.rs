use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::indexer::chunker::ChunkMetadata;

/// A nearest-neighbor hit returned by [`super::index::VectorIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// `1 - cosine_distance`, not re-normalized.
    pub similarity: f64,
}

/// Snapshot of the live collection.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub collection: String,
    pub generation: u64,
    pub entries: usize,
    pub dimensions: usize,
    pub built_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}
