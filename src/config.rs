/// Configuration module for sentirag.
///
/// Handles loading, validating, and providing default configuration values.
/// Values come from a JSON file first and environment variables second.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Bounds accepted for a request's `top_k`.
pub const TOP_K_RANGE: std::ops::RangeInclusive<usize> = 1..=10;

// ── Default value functions ──────────────────────────────────────────

fn default_dataset_path() -> String {
    "./data/dataset.csv".to_string()
}

fn default_vector_dir() -> Option<String> {
    Some("./vector_store".to_string())
}

fn default_frontend_dir() -> String {
    "./frontend".to_string()
}

fn default_collection_name() -> String {
    "sentiment_rag".to_string()
}

fn default_chunk_size() -> usize {
    260
}

fn default_chunk_overlap() -> usize {
    40
}

fn default_top_k() -> usize {
    4
}

fn default_min_score() -> f64 {
    0.62
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_batch_size() -> usize {
    64
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

fn default_mock_dimensions() -> usize {
    384
}

fn default_generation_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_max_output_tokens() -> u32 {
    512
}

fn default_generation_timeout_secs() -> u64 {
    60
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_dataset_path")]
    pub dataset_path: String,

    /// `null` keeps collections in memory only.
    #[serde(default = "default_vector_dir")]
    pub vector_dir: Option<String>,

    #[serde(default = "default_frontend_dir")]
    pub frontend_dir: String,

    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    #[serde(default = "default_min_score")]
    pub default_min_score: f64,

    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
    /// Offline hashing embedder.
    Mock,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Vector size of the mock provider.
    #[serde(default = "default_mock_dimensions")]
    pub mock_dimensions: usize,
}

fn default_provider() -> EmbeddingProvider {
    EmbeddingProvider::Openai
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
            vector_dir: default_vector_dir(),
            frontend_dir: default_frontend_dir(),
            collection_name: default_collection_name(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            default_top_k: default_top_k(),
            default_min_score: default_min_score(),
            bind: default_bind(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            base_url: default_base_url(),
            dimensions: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout_secs(),
            max_retries: default_max_retries(),
            mock_dimensions: default_mock_dimensions(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            model: default_generation_model(),
            base_url: default_base_url(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file, then apply environment overrides.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and, for the
    /// default path only, writes it out as a template.
    pub fn load(config_path: &str) -> Result<Self> {
        let mut cfg = Self::load_file(config_path)?;
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    fn load_file(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;
        let cfg: Config =
            serde_json::from_str(&data).with_context(|| format!("invalid JSON in {path}"))?;

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Override file values from an environment-like lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DATASET_PATH") {
            self.dataset_path = v;
        }
        if let Some(v) = get("VECTOR_DIR") {
            self.vector_dir = Some(v);
        }
        if let Some(v) = get("FRONTEND_DIR") {
            self.frontend_dir = v;
        }
        if let Some(v) = get("COLLECTION_NAME") {
            self.collection_name = v;
        }
        if let Some(v) = get("CHUNK_SIZE") {
            self.chunk_size = parse_var("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("CHUNK_OVERLAP") {
            self.chunk_overlap = parse_var("CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = get("DEFAULT_TOP_K") {
            self.default_top_k = parse_var("DEFAULT_TOP_K", &v)?;
        }
        if let Some(v) = get("DEFAULT_MIN_SCORE") {
            self.default_min_score = parse_var("DEFAULT_MIN_SCORE", &v)?;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = get("EMBEDDING_PROVIDER") {
            self.embedding.provider = match v.trim().to_ascii_lowercase().as_str() {
                "openai" => EmbeddingProvider::Openai,
                "mock" => EmbeddingProvider::Mock,
                other => anyhow::bail!("EMBEDDING_PROVIDER must be openai or mock, got {other}"),
            };
        }
        if let Some(v) = get("GENERATION_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = get("SENTIRAG_BIND") {
            self.bind = v;
        }
        Ok(())
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(
            self.chunk_size > self.chunk_overlap,
            "chunk_size ({}) must be greater than chunk_overlap ({})",
            self.chunk_size,
            self.chunk_overlap
        );
        anyhow::ensure!(
            TOP_K_RANGE.contains(&self.default_top_k),
            "default_top_k must be within {TOP_K_RANGE:?}"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.default_min_score),
            "default_min_score must be within [0, 1]"
        );
        anyhow::ensure!(
            !self.collection_name.trim().is_empty(),
            "collection_name must not be empty"
        );
        anyhow::ensure!(
            self.embedding.batch_size > 0,
            "embedding.batch_size must be positive"
        );
        anyhow::ensure!(
            self.embedding.mock_dimensions > 0,
            "embedding.mock_dimensions must be positive"
        );
        Ok(())
    }

    /// Human-readable index location for introspection.
    #[must_use]
    pub fn vector_store_label(&self) -> String {
        self.vector_dir
            .clone()
            .unwrap_or_else(|| ":memory:".to_string())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {key}={value}: {e}"))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 260);
        assert_eq!(config.chunk_overlap, 40);
        assert_eq!(config.default_top_k, 4);
        assert_eq!(config.default_min_score, 0.62);
        assert_eq!(config.collection_name, "sentiment_rag");
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.embedding.provider, EmbeddingProvider::Openai);
        assert_eq!(config.generation.model, "gpt-4.1-mini");
        assert!(config.generation.enabled);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"chunk_size": 500, "vector_dir": null, "embedding": {"provider": "mock"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.chunk_size, 500);
        assert!(config.vector_dir.is_none());
        assert_eq!(config.vector_store_label(), ":memory:");
        assert_eq!(config.embedding.provider, EmbeddingProvider::Mock);
        // Other fields should have defaults
        assert_eq!(config.chunk_overlap, 40);
        assert_eq!(config.embedding.batch_size, 64);
    }

    #[test]
    fn test_load_missing_explicit_path_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = Config::load_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.chunk_size, 260);
        assert!(!path.exists(), "templates are only written for the default path");
    }

    #[test]
    fn test_load_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_file(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[
                ("DATASET_PATH", "/data/reviews.csv"),
                ("CHUNK_SIZE", "300"),
                ("CHUNK_OVERLAP", "50"),
                ("DEFAULT_TOP_K", "6"),
                ("DEFAULT_MIN_SCORE", "0.5"),
                ("EMBEDDING_PROVIDER", "MOCK"),
                ("COLLECTION_NAME", ""),
            ]))
            .unwrap();
        assert_eq!(config.dataset_path, "/data/reviews.csv");
        assert_eq!(config.chunk_size, 300);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.default_top_k, 6);
        assert_eq!(config.default_min_score, 0.5);
        assert_eq!(config.embedding.provider, EmbeddingProvider::Mock);
        // Blank values are ignored.
        assert_eq!(config.collection_name, "sentiment_rag");
    }

    #[test]
    fn test_env_override_parse_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(lookup(&[("CHUNK_SIZE", "big")]))
            .unwrap_err();
        assert!(err.to_string().contains("CHUNK_SIZE"));
        assert!(
            config
                .apply_overrides(lookup(&[("EMBEDDING_PROVIDER", "onnx")]))
                .is_err()
        );
    }

    #[test]
    fn test_validate_ok() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_chunk_overlap() {
        let mut config = Config::default();
        config.chunk_overlap = config.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = Config::default();
        config.default_top_k = 11;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.default_min_score = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.collection_name = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.chunk_size, config.chunk_size);
        assert_eq!(parsed.dataset_path, config.dataset_path);
        assert_eq!(parsed.embedding.model, config.embedding.model);
    }
}
