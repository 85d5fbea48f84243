//! Configuration parsing and validation.
//!
//! tiermem is configured via a TOML file passed with `--config`. Every
//! section and field has a default, so an empty file is a valid config.
//!
//! # Example
//!
//! ```toml
//! [storage]
//! dir = "./data/memory"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! top_k = 5
//! min_score = 0.0
//!
//! [embedding]
//! provider = "local"            # "disabled" | "local" | "openai" | "ollama"
//! model = "all-minilm-l6-v2"
//!
//! [timeouts]
//! embed_secs = 300
//!
//! [tiers]
//! ephemeral_ttl_secs = 86400
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tiermem_core::chunk;
use tiermem_core::rank::{RankParams, DEFAULT_CANDIDATE_K_MIN};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub timeouts: TimeoutsConfig,
    pub tiers: TiersConfig,
}

/// Where the metadata database and vector collections live.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/memory"),
        }
    }
}

impl StorageConfig {
    pub fn metadata_db(&self) -> PathBuf {
        self.dir.join("metadata.sqlite")
    }

    pub fn vector_db(&self) -> PathBuf {
        self.dir.join("vectors.sqlite")
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_score: f64,
    /// Per-tier candidate floor: each tier is asked for `max(top_k, this)`.
    pub candidate_k_min: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.0,
            candidate_k_min: DEFAULT_CANDIDATE_K_MIN,
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self, top_k: usize, min_score: f64) -> RankParams {
        RankParams {
            top_k,
            min_score,
            candidate_k_min: self.candidate_k_min,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    pub batch_size: usize,
    pub max_retries: u32,
    /// Per-request HTTP timeout for remote providers.
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Deadlines for every blocking external call.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub model_load_secs: u64,
    pub embed_secs: u64,
    pub store_write_secs: u64,
    pub load_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            model_load_secs: 300,
            embed_secs: 300,
            store_write_secs: 300,
            load_secs: 60,
        }
    }
}

impl TimeoutsConfig {
    pub fn model_load(&self) -> Duration {
        Duration::from_secs(self.model_load_secs)
    }
    pub fn embed(&self) -> Duration {
        Duration::from_secs(self.embed_secs)
    }
    pub fn store_write(&self) -> Duration {
        Duration::from_secs(self.store_write_secs)
    }
    pub fn load(&self) -> Duration {
        Duration::from_secs(self.load_secs)
    }
}

/// Per-tier policy.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TiersConfig {
    /// TTL applied to `ephemeral` ingests that don't pass one explicitly.
    pub ephemeral_ttl_secs: Option<i64>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    chunk::validate_params(config.chunking.chunk_size, config.chunking.chunk_overlap)
        .context("invalid [chunking] section")?;

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if !config.retrieval.min_score.is_finite() {
        bail!("retrieval.min_score must be a finite number");
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, openai, or ollama.",
            other
        ),
    }

    let t = &config.timeouts;
    if t.model_load_secs == 0 || t.embed_secs == 0 || t.store_write_secs == 0 || t.load_secs == 0
    {
        bail!("[timeouts] values must be > 0");
    }

    if let Some(ttl) = config.tiers.ephemeral_ttl_secs {
        if ttl <= 0 {
            bail!("tiers.ephemeral_ttl_secs must be > 0");
        }
    }

    Ok(())
}
