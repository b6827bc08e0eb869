//! The swappable vector index.
//!
//! Readers clone the live [`Collection`] handle under a short read lock and
//! query it without holding the lock. A build stages a brand-new collection,
//! fills it completely, and only then flips the live pointer, so a query sees
//! either the whole old entry set or the whole new one. A failed build leaves
//! the previous collection live.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use super::models::{IndexStats, Neighbor};
use super::{Collection, IndexError, remove_if_exists};
use crate::embedder::Embedder;
use crate::indexer::chunker::Chunk;

const COLLECTION_EXTENSION: &str = "sqlite";

pub struct VectorIndex {
    name: String,
    /// Directory for collection files; `None` keeps collections in memory.
    directory: Option<PathBuf>,
    live: RwLock<Option<Arc<Collection>>>,
    next_generation: AtomicU64,
    /// Single-writer lock: builds never interleave.
    build_lock: Mutex<()>,
}

impl VectorIndex {
    /// An index whose collections live only in memory.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::with_directory(name, None)
    }

    /// An index whose collections are SQLite files under `directory`.
    pub fn persistent(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self::with_directory(name, Some(directory.into()))
    }

    fn with_directory(name: impl Into<String>, directory: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory,
            live: RwLock::new(None),
            next_generation: AtomicU64::new(1),
            build_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Whether a build has completed successfully.
    pub fn is_ready(&self) -> bool {
        self.live.read().is_some()
    }

    /// Number of entries in the live collection (0 before the first build).
    pub fn len(&self) -> usize {
        self.live.read().as_ref().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> Option<IndexStats> {
        self.current().map(|c| stats_of(&c))
    }

    fn current(&self) -> Option<Arc<Collection>> {
        self.live.read().clone()
    }

    /// Embed `chunks` and replace the whole entry set with them.
    pub fn build(&self, chunks: &[Chunk], embedder: &dyn Embedder) -> Result<IndexStats, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyInput);
        }

        let _guard = self.build_lock.lock();
        let started = Instant::now();

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = embedder.embed_batch(&texts)?;
        if vectors.len() != chunks.len() {
            return Err(IndexError::EmbeddingCountMismatch {
                expected: chunks.len(),
                found: vectors.len(),
            });
        }

        let dimensions = vectors[0].len();
        if dimensions == 0 {
            return Err(IndexError::ZeroDimension);
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                found: bad.len(),
            });
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let path = self.collection_path(generation);
        if let Some(dir) = &self.directory {
            std::fs::create_dir_all(dir)?;
        }

        let staged = Collection::create(path.as_deref(), &self.name, generation, dimensions)
            .and_then(|mut c| c.insert_all(chunks, &vectors).map(|()| c));
        let staged = match staged {
            Ok(c) => Arc::new(c),
            Err(e) => {
                if let Some(path) = &path {
                    let _ = remove_if_exists(path);
                }
                return Err(e);
            }
        };

        let stats = stats_of(&staged);
        let previous = self.live.write().replace(staged);

        info!(
            collection = %self.name,
            generation,
            entries = stats.entries,
            dimensions,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "collection swapped in"
        );

        match previous {
            Some(old) => {
                if let Some(old_path) = old.path()
                    && let Err(e) = remove_if_exists(old_path)
                {
                    warn!(path = %old_path.display(), error = %e, "failed to discard previous collection");
                }
            }
            None => self.purge_stale(path.as_deref()),
        }

        Ok(stats)
    }

    /// Nearest neighbors of `query_vector`, most similar first.
    ///
    /// Returns at most `min(limit, len)` hits.
    pub fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<Neighbor>, IndexError> {
        let collection = self.current().ok_or(IndexError::NotReady)?;
        collection.search(query_vector, limit)
    }

    fn collection_path(&self, generation: u64) -> Option<PathBuf> {
        self.directory
            .as_ref()
            .map(|dir| dir.join(format!("{}-{generation}.{COLLECTION_EXTENSION}", self.name)))
    }

    /// Drop collection files left behind under this name by earlier processes.
    fn purge_stale(&self, keep: Option<&Path>) {
        let Some(dir) = &self.directory else {
            return;
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };

        let prefix = format!("{}-", self.name);
        for entry in entries.flatten() {
            let path = entry.path();
            if Some(path.as_path()) == keep {
                continue;
            }
            let is_stale = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|stem| stem.strip_prefix(&prefix))
                .is_some_and(|generation| generation.parse::<u64>().is_ok())
                && path.extension().and_then(|e| e.to_str()) == Some(COLLECTION_EXTENSION);
            if is_stale && let Err(e) = remove_if_exists(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove stale collection");
            }
        }
    }
}

fn stats_of(collection: &Collection) -> IndexStats {
    IndexStats {
        collection: collection.name().to_string(),
        generation: collection.generation(),
        entries: collection.len(),
        dimensions: collection.dimensions(),
        built_at: collection.built_at(),
        path: collection.path().map(Path::to_path_buf),
    }
}
