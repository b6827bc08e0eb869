use crate::dataset::{self, DatasetError, Record};
use crate::db::IndexError;
use crate::db::index::VectorIndex;
use crate::embedder::Embedder;
use crate::indexer::chunker::{self, ChunkError};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Outcome of a full rebuild.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BuildReport {
    pub records: usize,
    pub chunks: usize,
    pub generation: u64,
    pub dimensions: usize,
    pub elapsed_ms: u64,
}

/// Load → chunk → embed → build pipeline feeding one [`VectorIndex`].
pub struct Indexer {
    pub index: Arc<VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Indexer {
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            chunk_size,
            chunk_overlap,
        }
    }

    /// Rebuild the index from the dataset file at `path`.
    pub fn index_dataset<P: AsRef<Path>>(&self, path: P) -> Result<BuildReport, IndexerError> {
        let records = dataset::load_dataset(path)?;
        self.index_records(&records)
    }

    /// Rebuild the index from already-loaded records.
    ///
    /// The chunk parameters are checked before anything is embedded, and the
    /// previous index stays live if any step fails.
    pub fn index_records(&self, records: &[Record]) -> Result<BuildReport, IndexerError> {
        let started = Instant::now();
        let chunks = chunker::chunk_records(records, self.chunk_size, self.chunk_overlap)?;
        info!(
            records = records.len(),
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            chunk_overlap = self.chunk_overlap,
            "records chunked"
        );

        let stats = self.index.build(&chunks, self.embedder.as_ref())?;

        Ok(BuildReport {
            records: records.len(),
            chunks: chunks.len(),
            generation: stats.generation,
            dimensions: stats.dimensions,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}
