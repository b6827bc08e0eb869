//! Vector index storage using SQLite and sqlite-vec.
//!
//! A [`Collection`] is one fully-built generation of the index: a SQLite
//! database (file or in-memory) holding chunk rows plus a `vec0` table of
//! their embeddings. [`index::VectorIndex`] owns the live collection and
//! swaps in a new one on every rebuild.
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use sqlite_vec::sqlite3_vec_init;
use std::path::{Path, PathBuf};
use std::sync::Once;
use thiserror::Error;
use tracing::debug;

use chrono::{DateTime, Utc};

use crate::embedder::EmbedderError;
use crate::indexer::chunker::Chunk;

pub mod index;
pub mod models;
pub mod search;

/// Errors raised by the vector index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("chunk list is empty, cannot build vector store")]
    EmptyInput,

    #[error("vector store is not ready yet")]
    NotReady,

    #[error("embedder returned {found} vectors for {expected} chunks")]
    EmbeddingCountMismatch { expected: usize, found: usize },

    #[error("vector dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("embedding vectors must not be empty")]
    ZeroDimension,

    #[error(transparent)]
    Embedding(#[from] EmbedderError),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

fn schema_sql(dimensions: usize) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS collection_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entries (
    position INTEGER PRIMARY KEY,
    chunk_id TEXT NOT NULL UNIQUE,
    content TEXT NOT NULL,
    row_index INTEGER NOT NULL,
    sentiment TEXT NOT NULL,
    source TEXT NOT NULL,
    date TEXT NOT NULL,
    user_id TEXT NOT NULL,
    location TEXT NOT NULL,
    confidence_score REAL NOT NULL,
    chunk_index INTEGER NOT NULL,
    char_start INTEGER NOT NULL,
    char_end INTEGER NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS vec_entries USING vec0(
    embedding FLOAT[{dimensions}]
);
"#
    )
}

/// One fully-populated generation of a named collection.
pub struct Collection {
    name: String,
    generation: u64,
    path: Option<PathBuf>,
    dimensions: usize,
    len: usize,
    built_at: DateTime<Utc>,
    pub(crate) conn: Mutex<Connection>,
}

impl Collection {
    /// Create an empty collection. `path: None` keeps it in memory.
    pub(crate) fn create(
        path: Option<&Path>,
        name: &str,
        generation: u64,
        dimensions: usize,
    ) -> Result<Self, IndexError> {
        init_sqlite_vec();

        let conn = match path {
            Some(path) => {
                // Leftover from an earlier process using the same generation.
                remove_if_exists(path)?;
                Connection::open(path)?
            }
            None => Connection::open_in_memory()?,
        };

        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        debug!(collection = name, generation, vec_version, "staging collection");

        conn.execute_batch(&schema_sql(dimensions))?;

        Ok(Self {
            name: name.to_string(),
            generation,
            path: path.map(Path::to_path_buf),
            dimensions,
            len: 0,
            built_at: Utc::now(),
            conn: Mutex::new(conn),
        })
    }

    /// Write every chunk and its vector in a single transaction.
    pub(crate) fn insert_all(
        &mut self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), IndexError> {
        let conn = self.conn.get_mut();
        let tx = conn.transaction()?;

        for (i, (chunk, vector)) in chunks.iter().zip(vectors).enumerate() {
            // vec0 rowids start at 1
            let position = (i + 1) as i64;
            let meta = &chunk.metadata;
            tx.execute(
                r#"
                INSERT INTO entries (
                    position, chunk_id, content, row_index, sentiment, source, date,
                    user_id, location, confidence_score, chunk_index, char_start, char_end
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    position,
                    chunk.id,
                    chunk.text,
                    meta.row_index as i64,
                    meta.sentiment,
                    meta.source,
                    meta.date,
                    meta.user_id,
                    meta.location,
                    meta.confidence_score,
                    meta.chunk_index as i64,
                    meta.char_start as i64,
                    meta.char_end as i64,
                ],
            )?;
            tx.execute(
                "INSERT INTO vec_entries (rowid, embedding) VALUES (?, ?)",
                params![position, serialize_vector(vector)],
            )?;
        }

        self.built_at = Utc::now();
        tx.execute(
            "INSERT OR REPLACE INTO collection_info (key, value) VALUES ('name', ?), ('generation', ?), ('built_at', ?)",
            params![self.name, self.generation.to_string(), self.built_at.to_rfc3339()],
        )?;
        tx.commit()?;

        self.len = chunks.len();
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

/// Remove a file, treating "already gone" as success.
pub(crate) fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Helper to serialize a float32 vector into bytes for vec0 virtual table
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_schema() {
        let collection = Collection::create(None, "test", 1, 8).expect("create collection");
        let conn = collection.conn.lock();

        let tables: usize = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('collection_info', 'entries', 'vec_entries');",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
        assert!(collection.is_empty());
        assert_eq!(collection.dimensions(), 8);
        assert!(collection.path().is_none());
    }

    #[test]
    fn test_file_backed_collection_replaces_leftover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c-1.sqlite");
        std::fs::write(&path, b"not a database").unwrap();

        let collection = Collection::create(Some(&path), "c", 1, 4).unwrap();
        assert_eq!(collection.path(), Some(path.as_path()));
        assert!(path.exists());
    }

    #[test]
    fn test_remove_if_exists_ignores_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_if_exists(&dir.path().join("missing.sqlite")).is_ok());
    }

    #[test]
    fn test_serialize_vector() {
        let vec = vec![1.0, 2.0, -3.5];
        let bytes = serialize_vector(&vec);
        assert_eq!(bytes.len(), 12);

        // 1.0f32 in hex: 0x3f800000 -> little endian: 00 00 80 3f
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x80, 0x3f]);
        // 2.0f32 in hex: 0x40000000 -> little endian: 00 00 00 40
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x00, 0x40]);
        // -3.5f32 in hex: 0xc0600000 -> little endian: 00 00 60 c0
        assert_eq!(&bytes[8..12], &[0x00, 0x00, 0x60, 0xc0]);
    }
}
