//! In-process embeddings via fastembed.
//!
//! The ONNX model is downloaded from Hugging Face on first use and cached.
//! Loading happens once per [`LocalEmbedder`]; every later call reuses the
//! same session. Inference runs on the blocking thread pool.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

use tiermem_core::embedding::Embedder;

use crate::config::EmbeddingConfig;

pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: OnceCell<Arc<Mutex<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        // Fail on unknown names at construction, not on first use.
        config_to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or_else(|| default_dims(&model_name));

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: OnceCell::new(),
        })
    }

    async fn model(&self) -> Result<Arc<Mutex<fastembed::TextEmbedding>>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                let fastembed_model = config_to_fastembed_model(&self.model_name)?;
                let name = self.model_name.clone();
                tracing::info!(model = %name, "loading local embedding model");
                let loaded = tokio::task::spawn_blocking(move || {
                    fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(fastembed_model)
                            .with_show_download_progress(false),
                    )
                    .map_err(|e| anyhow!("Failed to initialize local embedding model {}: {}", name, e))
                })
                .await??;
                Ok::<_, anyhow::Error>(Arc::new(Mutex::new(loaded)))
            })
            .await?;
        Ok(model.clone())
    }
}

fn default_dims(model_name: &str) -> usize {
    match model_name {
        "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "multilingual-e5-base" => 768,
        "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
        _ => 384,
    }
}

fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn warm_up(&self) -> Result<()> {
        self.model().await.map(|_| ())
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.model().await?;
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            guard
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}
