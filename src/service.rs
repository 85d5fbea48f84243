//! The memory facade.
//!
//! [`MemoryService`] owns one of everything: the metadata tracker, the
//! tiered vector store, the embedding service and the document source.
//! Callers drive the whole memory through four operations:
//!
//! | Operation | Module |
//! |-----------|--------|
//! | [`ingest_documents`](MemoryService::ingest_documents) | [`crate::ingest`] |
//! | [`retrieve_context`](MemoryService::retrieve_context) | [`crate::retrieve`] |
//! | [`get_stats`](MemoryService::get_stats) | here |
//! | [`cleanup_expired`](MemoryService::cleanup_expired) | [`crate::cleanup`] |
//!
//! Writers to a tier's vectors hold that tier's mutex. A writer never holds
//! two tier locks at once. Readers take no locks.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use tiermem_core::embedding::Embedder;
use tiermem_core::store::VectorStore;
use tiermem_core::{MemoryError, RetrievedChunk, Tier};

use crate::config::Config;
use crate::embedding::{create_embedder, EmbeddingService};
use crate::loader::{DocumentSource, PlainTextSource};
use crate::tracker::{MetadataTracker, TrackerStats};
use crate::vector_store::SqliteVectorStore;
use crate::{db, migrate};

/// Snapshot returned by [`MemoryService::get_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    /// Vectors across all tiers.
    pub total_chunks: usize,
    /// Vectors per tier; all three tiers are always present.
    pub tier_counts: BTreeMap<String, usize>,
    pub metadata_stats: TrackerStats,
    pub embedding_model: String,
}

pub struct MemoryService {
    pub(crate) config: Config,
    pub(crate) tracker: MetadataTracker,
    pub(crate) store: Arc<dyn VectorStore>,
    pub(crate) embeddings: EmbeddingService,
    pub(crate) source: Arc<dyn DocumentSource>,
    tier_locks: [Mutex<()>; 3],
}

impl MemoryService {
    /// Open the memory under `[storage].dir` with the configured embedder.
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        Self::open_with_embedder(config, embedder).await
    }

    /// Open the memory with an explicit embedding backend.
    ///
    /// Creates and migrates both databases if needed, then finishes any
    /// deletes a previous process left half done.
    pub async fn open_with_embedder(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let tracker = MetadataTracker::open(&config.storage.metadata_db())
            .await
            .context("Failed to open metadata database")?;

        let vector_pool = db::connect(&config.storage.vector_db())
            .await
            .context("Failed to open vector database")?;
        migrate::migrate_vectors(&vector_pool).await?;
        let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::new(vector_pool));

        let service = Self::from_parts(
            config.clone(),
            tracker,
            store,
            EmbeddingService::from_config(embedder, config),
            Arc::new(PlainTextSource),
        );

        let recovered = service.recover_pending_deletes().await?;
        if !recovered.is_empty() {
            tracing::info!(
                chunks = recovered.chunks_purged,
                documents = recovered.documents_deleted,
                orphans = recovered.orphan_vectors_deleted,
                "finished interrupted deletes"
            );
        }
        Ok(service)
    }

    /// Assemble a service from already-opened parts.
    pub fn from_parts(
        config: Config,
        tracker: MetadataTracker,
        store: Arc<dyn VectorStore>,
        embeddings: EmbeddingService,
        source: Arc<dyn DocumentSource>,
    ) -> Self {
        Self {
            config,
            tracker,
            store,
            embeddings,
            source,
            tier_locks: Default::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tracker(&self) -> &MetadataTracker {
        &self.tracker
    }

    pub fn store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }

    pub fn embeddings(&self) -> &EmbeddingService {
        &self.embeddings
    }

    /// Load the embedding model now instead of on first use.
    pub async fn warm_up(&self) -> tiermem_core::Result<()> {
        self.embeddings.warm_up().await
    }

    pub(crate) async fn lock_tier(&self, tier: Tier) -> MutexGuard<'_, ()> {
        self.tier_locks[tier.index()].lock().await
    }

    /// Vector counts per tier plus the tracker's view.
    pub async fn get_stats(&self) -> tiermem_core::Result<MemoryStats> {
        let mut tier_counts = BTreeMap::new();
        for tier in Tier::ALL {
            let n = self.store.count(tier).await.map_err(MemoryError::Store)?;
            tier_counts.insert(tier.as_str().to_string(), n);
        }
        let metadata_stats = self
            .tracker
            .get_stats()
            .await
            .map_err(MemoryError::Tracker)?;

        Ok(MemoryStats {
            total_chunks: tier_counts.values().sum(),
            tier_counts,
            metadata_stats,
            embedding_model: self.embeddings.model_name().to_string(),
        })
    }

    /// Render ranked chunks as an annotated context block.
    pub fn format_context(&self, chunks: &[RetrievedChunk]) -> String {
        tiermem_core::rank::format_context(chunks)
    }
}
