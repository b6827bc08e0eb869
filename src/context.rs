//! Process-wide state shared by the HTTP and MCP surfaces.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, EmbeddingProvider, TOP_K_RANGE};
use crate::db::index::VectorIndex;
use crate::embedder::Embedder;
use crate::embedder::mock::MockEmbedder;
use crate::embedder::openai::{OpenAiEmbedder, OpenAiEmbedderOptions};
use crate::generation::{Generator, OpenAiGenerator};
use crate::indexer::core::{BuildReport, Indexer, IndexerError};
use crate::retriever::Retriever;

pub const VECTOR_DB_LABEL: &str = "sqlite-vec (local)";

/// Upper bound accepted for a request's `max_output_tokens`.
pub const MAX_OUTPUT_TOKENS_LIMIT: u32 = 4096;

/// A request parameter outside its accepted range.
#[derive(Error, Debug, PartialEq)]
#[error("{0}")]
pub struct ParamError(pub String);

/// Static introspection payload for `GET /config` and the `get_config` tool.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfigSummary {
    pub dataset_path: String,
    pub vector_store_path: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub chunk_total: usize,
    pub default_top_k: usize,
    pub default_min_score: f64,
    pub vector_db: String,
    pub embedding_model: String,
}

pub struct AppContext {
    pub config: Config,
    pub indexer: Indexer,
    pub retriever: Retriever,
    pub generator: Option<Arc<dyn Generator>>,
    chunk_total: AtomicUsize,
    /// Held from dataset load through the `chunk_total` update.
    rebuild_lock: Mutex<()>,
}

impl AppContext {
    pub fn new(
        config: Config,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generator: Option<Arc<dyn Generator>>,
    ) -> Self {
        let indexer = Indexer::new(
            index.clone(),
            embedder.clone(),
            config.chunk_size,
            config.chunk_overlap,
        );
        let retriever = Retriever::new(index, embedder);
        Self {
            config,
            indexer,
            retriever,
            generator,
            chunk_total: AtomicUsize::new(0),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Wire the index, embedder and optional generator described by `config`.
    ///
    /// Builds blocking HTTP clients, so call it outside the async runtime.
    /// Nothing is indexed yet; follow up with [`AppContext::rebuild`].
    pub fn from_config(config: Config, api_key: Option<&str>) -> anyhow::Result<Self> {
        let api_key = api_key.map(str::trim).filter(|k| !k.is_empty());

        let index = Arc::new(match &config.vector_dir {
            Some(dir) => VectorIndex::persistent(config.collection_name.clone(), dir),
            None => VectorIndex::in_memory(config.collection_name.clone()),
        });

        let embedder: Arc<dyn Embedder> = match config.embedding.provider {
            EmbeddingProvider::Mock => Arc::new(MockEmbedder::new(config.embedding.mock_dimensions)),
            EmbeddingProvider::Openai => Arc::new(
                OpenAiEmbedder::new(OpenAiEmbedderOptions {
                    api_key: api_key.unwrap_or_default().to_string(),
                    base_url: config.embedding.base_url.clone(),
                    model: config.embedding.model.clone(),
                    dimensions: config.embedding.dimensions,
                    timeout: Duration::from_secs(config.embedding.timeout_secs),
                    max_retries: config.embedding.max_retries,
                    batch_size: config.embedding.batch_size,
                })
                .context("failed to initialise the embedding provider")?,
            ),
        };

        let generator: Option<Arc<dyn Generator>> = match (config.generation.enabled, api_key) {
            (true, Some(key)) => Some(Arc::new(
                OpenAiGenerator::new(
                    key,
                    &config.generation.base_url,
                    config.generation.model.clone(),
                    Duration::from_secs(config.generation.timeout_secs),
                )
                .context("failed to initialise the answer generator")?,
            )),
            (true, None) => {
                warn!("OPENAI_API_KEY is not set; answer generation disabled");
                None
            }
            (false, _) => None,
        };

        info!(
            collection = %config.collection_name,
            store = %config.vector_store_label(),
            embedding_model = embedder.model_name(),
            generation = generator.is_some(),
            "application context ready"
        );
        Ok(Self::new(config, index, embedder, generator))
    }

    /// Reload the configured dataset and swap in a fresh collection.
    ///
    /// Blocking; async callers go through `spawn_blocking`.
    pub fn rebuild(&self) -> Result<BuildReport, IndexerError> {
        let _guard = self.rebuild_lock.lock();
        let report = self.indexer.index_dataset(&self.config.dataset_path)?;
        self.chunk_total.store(report.chunks, Ordering::Release);
        info!(
            records = report.records,
            chunks = report.chunks,
            generation = report.generation,
            elapsed_ms = report.elapsed_ms,
            "index rebuilt"
        );
        Ok(report)
    }

    pub fn chunk_total(&self) -> usize {
        self.chunk_total.load(Ordering::Acquire)
    }

    pub fn config_summary(&self) -> ConfigSummary {
        ConfigSummary {
            dataset_path: self.config.dataset_path.clone(),
            vector_store_path: self.config.vector_store_label(),
            chunk_size: self.config.chunk_size,
            chunk_overlap: self.config.chunk_overlap,
            chunk_total: self.chunk_total(),
            default_top_k: self.config.default_top_k,
            default_min_score: self.config.default_min_score,
            vector_db: VECTOR_DB_LABEL.to_string(),
            embedding_model: self.indexer.embedder.model_name().to_string(),
        }
    }

    /// Fill in defaults and range-check per-request retrieval parameters.
    pub fn resolve_params(
        &self,
        top_k: Option<usize>,
        min_score: Option<f64>,
    ) -> Result<(usize, f64), ParamError> {
        let top_k = top_k.unwrap_or(self.config.default_top_k);
        if !TOP_K_RANGE.contains(&top_k) {
            return Err(ParamError(format!(
                "top_k must be between {} and {}",
                TOP_K_RANGE.start(),
                TOP_K_RANGE.end()
            )));
        }
        let min_score = min_score.unwrap_or(self.config.default_min_score);
        if !(0.0..=1.0).contains(&min_score) {
            return Err(ParamError(
                "min_score must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok((top_k, min_score))
    }

    pub fn resolve_max_output_tokens(&self, requested: Option<u32>) -> Result<u32, ParamError> {
        let tokens = requested.unwrap_or(self.config.generation.max_output_tokens);
        if tokens == 0 || tokens > MAX_OUTPUT_TOKENS_LIMIT {
            return Err(ParamError(format!(
                "max_output_tokens must be between 1 and {MAX_OUTPUT_TOKENS_LIMIT}"
            )));
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::MockEmbedder;
    use std::fs;

    fn context_for(dataset: &str) -> (tempfile::TempDir, AppContext) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.csv");
        fs::write(&path, dataset).unwrap();
        let config = Config {
            dataset_path: path.to_string_lossy().into_owned(),
            vector_dir: None,
            ..Config::default()
        };
        let ctx = AppContext::new(
            config,
            Arc::new(VectorIndex::in_memory("ctx")),
            Arc::new(MockEmbedder::new(32)),
            None,
        );
        (dir, ctx)
    }

    #[test]
    fn test_from_config_mock_provider() {
        let mut config = Config::default();
        config.vector_dir = None;
        config.embedding.provider = EmbeddingProvider::Mock;
        config.embedding.mock_dimensions = 48;

        let ctx = AppContext::from_config(config.clone(), None).unwrap();
        assert!(ctx.generator.is_none(), "no key means no generator");
        assert_eq!(ctx.indexer.embedder.dimensions(), 48);
        assert!(!ctx.retriever.index().is_ready());

        let ctx = AppContext::from_config(config, Some("sk-test")).unwrap();
        assert!(ctx.generator.is_some());
    }

    #[test]
    fn test_from_config_openai_requires_key() {
        let config = Config {
            vector_dir: None,
            ..Config::default()
        };
        assert!(AppContext::from_config(config, Some("  ")).is_err());
    }

    #[test]
    fn test_rebuild_updates_chunk_total() {
        let (_dir, ctx) = context_for("Text,Sentiment\nGreat service,Positive\nToo slow,Negative\n");
        assert_eq!(ctx.chunk_total(), 0);
        let report = ctx.rebuild().unwrap();
        assert_eq!(report.chunks, 2);
        assert_eq!(ctx.config_summary().chunk_total, 2);
        assert!(ctx.retriever.index().is_ready());
    }

    #[test]
    fn test_concurrent_rebuilds_keep_chunk_total_in_step() {
        let (dir, ctx) = context_for("Text,Sentiment\nGreat service,Positive\n");
        let dataset = dir.path().join("dataset.csv");
        let long = format!("Text\n{}\n", "slow checkout again ".repeat(40));

        std::thread::scope(|s| {
            for i in 0..6 {
                let ctx = &ctx;
                let dataset = &dataset;
                let long = &long;
                s.spawn(move || {
                    if i % 2 == 0 {
                        // Rewritten only while no other rebuild can be reading it.
                        let _guard = ctx.rebuild_lock.lock();
                        fs::write(dataset, long).unwrap();
                    }
                    ctx.rebuild().unwrap();
                });
            }
        });

        assert_eq!(ctx.chunk_total(), ctx.retriever.index().len());
        assert!(ctx.chunk_total() > 1);
        assert_eq!(ctx.retriever.index().stats().unwrap().generation, 6);
    }

    #[test]
    fn test_config_summary() {
        let (_dir, ctx) = context_for("Text\nhello\n");
        let summary = ctx.config_summary();
        assert_eq!(summary.vector_store_path, ":memory:");
        assert_eq!(summary.vector_db, VECTOR_DB_LABEL);
        assert_eq!(summary.embedding_model, "hashed-bag-of-words");
        assert_eq!(summary.default_top_k, 4);
    }

    #[test]
    fn test_resolve_params() {
        let (_dir, ctx) = context_for("Text\nhello\n");
        assert_eq!(ctx.resolve_params(None, None).unwrap(), (4, 0.62));
        assert_eq!(ctx.resolve_params(Some(10), Some(0.0)).unwrap(), (10, 0.0));
        assert!(ctx.resolve_params(Some(0), None).is_err());
        assert!(ctx.resolve_params(Some(11), None).is_err());
        assert!(ctx.resolve_params(None, Some(1.01)).is_err());
        assert!(ctx.resolve_params(None, Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_resolve_max_output_tokens() {
        let (_dir, ctx) = context_for("Text\nhello\n");
        assert_eq!(ctx.resolve_max_output_tokens(None).unwrap(), 512);
        assert!(ctx.resolve_max_output_tokens(Some(0)).is_err());
        assert!(ctx.resolve_max_output_tokens(Some(5000)).is_err());
    }
}
