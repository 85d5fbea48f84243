//! Expiry, tier clearing, and recovery of interrupted deletes.
//!
//! Every delete follows the tracker's mark-pending → delete vectors →
//! delete rows protocol. Whatever a crash or an error leaves pending is
//! picked up by [`MemoryService::recover_pending_deletes`].

use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use tiermem_core::{MemoryError, Tier};

use crate::config::Config;
use crate::service::MemoryService;
use crate::tracker::{ChunkRef, ExpiredDocument};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpiryFailure {
    pub document_id: i64,
    pub file_path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    /// Expired documents removed.
    pub expired_count: usize,
    /// Chunks of those documents.
    pub chunks_deleted: usize,
    /// Documents that could not be removed; they stay pending.
    pub failures: Vec<ExpiryFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearReport {
    pub tier: Tier,
    pub documents_deleted: usize,
    pub vectors_deleted: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    pub chunks_purged: usize,
    pub documents_deleted: usize,
    /// Vectors with no tracker row at all (left by an aborted ingest).
    pub orphan_vectors_deleted: usize,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.chunks_purged == 0 && self.documents_deleted == 0 && self.orphan_vectors_deleted == 0
    }
}

fn group_by_tier(chunks: &[ChunkRef]) -> BTreeMap<Tier, Vec<String>> {
    let mut grouped: BTreeMap<Tier, Vec<String>> = BTreeMap::new();
    for chunk in chunks {
        grouped
            .entry(chunk.tier)
            .or_default()
            .push(chunk.chunk_id.clone());
    }
    grouped
}

impl MemoryService {
    /// Remove every document whose TTL has run out.
    ///
    /// A document that fails is logged, left pending, and reported; the
    /// pass continues with the rest.
    pub async fn cleanup_expired(&self) -> tiermem_core::Result<CleanupReport> {
        self.cleanup_expired_at(chrono::Utc::now().timestamp()).await
    }

    /// [`cleanup_expired`](Self::cleanup_expired) as of `now` (unix seconds).
    pub async fn cleanup_expired_at(&self, now: i64) -> tiermem_core::Result<CleanupReport> {
        let expired = self
            .tracker
            .get_expired_documents_at(now)
            .await
            .map_err(MemoryError::Tracker)?;
        let mut report = CleanupReport::default();

        for doc in expired {
            match self.delete_expired_document(&doc, now).await {
                Ok(Some(chunks)) => {
                    report.expired_count += 1;
                    report.chunks_deleted += chunks;
                    tracing::info!(
                        document_id = doc.document_id,
                        path = %doc.file_path,
                        chunks,
                        "expired document removed"
                    );
                }
                Ok(None) => {
                    tracing::debug!(path = %doc.file_path, "document re-ingested before expiry, kept");
                }
                Err(source) => {
                    let err = MemoryError::ExpiryDelete {
                        document_id: doc.document_id,
                        source,
                    };
                    tracing::error!(path = %doc.file_path, error = %err, "expiry delete failed");
                    report.failures.push(ExpiryFailure {
                        document_id: doc.document_id,
                        file_path: doc.file_path,
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Delete one expired document under its tier's lock.
    ///
    /// The listing is re-checked once the lock is held, so a document that
    /// was moved or whose TTL was refreshed in the meantime is left alone
    /// (`None`). Otherwise returns the number of chunks removed.
    async fn delete_expired_document(
        &self,
        doc: &ExpiredDocument,
        now: i64,
    ) -> anyhow::Result<Option<usize>> {
        let tier = doc.tier;
        let (chunks, deleted) = {
            let _guard = self.lock_tier(tier).await;
            let Some(chunks) = self
                .tracker
                .claim_document(doc.document_id, tier, Some(now))
                .await?
            else {
                return Ok(None);
            };
            let in_tier: Vec<String> = chunks
                .iter()
                .filter(|c| c.tier == tier)
                .map(|c| c.chunk_id.clone())
                .collect();
            self.delete_vectors(tier, &in_tier).await?;
            let deleted = self
                .tracker
                .delete_claimed_document(doc.document_id, tier)
                .await?;
            if !deleted {
                self.tracker.purge_chunks(&in_tier).await?;
            }
            (chunks, deleted)
        };

        let elsewhere: Vec<ChunkRef> = chunks.iter().filter(|c| c.tier != tier).cloned().collect();
        self.delete_stray_vectors(&elsewhere).await?;
        Ok(deleted.then_some(chunks.len()))
    }

    /// Delete vectors of claimed chunk rows that live outside the tier being
    /// deleted from, one tier lock at a time, then purge their rows.
    ///
    /// A failed vector delete is left for recovery.
    async fn delete_stray_vectors(&self, chunks: &[ChunkRef]) -> anyhow::Result<()> {
        for (tier, ids) in group_by_tier(chunks) {
            let _guard = self.lock_tier(tier).await;
            match self.delete_vectors(tier, &ids).await {
                Ok(_) => {
                    self.tracker.purge_chunks(&ids).await?;
                }
                Err(e) => {
                    tracing::warn!(tier = %tier, error = %e, "stray vectors left for recovery")
                }
            }
        }
        Ok(())
    }

    async fn delete_vectors(&self, tier: Tier, ids: &[String]) -> anyhow::Result<usize> {
        let write_timeout = self.config.timeouts.store_write();
        match tokio::time::timeout(write_timeout, self.store.delete(tier, ids)).await {
            Ok(result) => result,
            Err(_) => bail!(MemoryError::Timeout {
                operation: "vector delete",
                seconds: write_timeout.as_secs(),
            }),
        }
    }

    /// Delete every document of `tier` and every vector stored in it.
    ///
    /// Documents are listed, claimed, and deleted while the tier's lock is
    /// held, so an ingest into `tier` lands either wholly before or wholly
    /// after the clear. Chunk rows of those documents that still point into
    /// another tier (a move that was not finished) are removed from there
    /// afterwards.
    pub async fn clear_tier(&self, tier: Tier) -> tiermem_core::Result<ClearReport> {
        let mut elsewhere: Vec<ChunkRef> = Vec::new();

        let (documents_deleted, vectors_deleted) = {
            let _guard = self.lock_tier(tier).await;
            let documents = self
                .tracker
                .documents_in_tier(tier)
                .await
                .map_err(MemoryError::Tracker)?;

            let mut claimed = Vec::with_capacity(documents.len());
            for doc in &documents {
                let chunks = self
                    .tracker
                    .claim_document(doc.id, tier, None)
                    .await
                    .map_err(MemoryError::Tracker)?;
                if let Some(chunks) = chunks {
                    elsewhere.extend(chunks.into_iter().filter(|c| c.tier != tier));
                    claimed.push(doc.id);
                }
            }

            let removed = self.store.clear(tier).await.map_err(MemoryError::Store)?;
            self.tracker
                .purge_tier_chunks(tier)
                .await
                .map_err(MemoryError::Tracker)?;

            let mut deleted = 0;
            for id in claimed {
                if self
                    .tracker
                    .delete_claimed_document(id, tier)
                    .await
                    .map_err(MemoryError::Tracker)?
                {
                    deleted += 1;
                }
            }
            (deleted, removed)
        };

        self.delete_stray_vectors(&elsewhere)
            .await
            .map_err(MemoryError::Tracker)?;

        tracing::warn!(tier = %tier, documents = documents_deleted, vectors = vectors_deleted, "tier cleared");
        Ok(ClearReport {
            tier,
            documents_deleted,
            vectors_deleted,
        })
    }

    /// Finish deletes that a crash or error interrupted, and remove vectors
    /// that no chunk row owns.
    ///
    /// Runs automatically when the service is opened.
    pub async fn recover_pending_deletes(&self) -> tiermem_core::Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        let pending = self
            .tracker
            .pending_chunks()
            .await
            .map_err(MemoryError::Tracker)?;
        for (tier, ids) in group_by_tier(&pending) {
            let _guard = self.lock_tier(tier).await;
            match self.delete_vectors(tier, &ids).await {
                Ok(_) => {
                    report.chunks_purged += self
                        .tracker
                        .purge_chunks(&ids)
                        .await
                        .map_err(MemoryError::Tracker)? as usize;
                }
                Err(e) => tracing::warn!(tier = %tier, error = %e, "pending vectors still present"),
            }
        }

        for document_id in self
            .tracker
            .pending_documents()
            .await
            .map_err(MemoryError::Tracker)?
        {
            // Chunk rows that survived the loop above still point at vectors.
            let remaining = self
                .tracker
                .all_chunk_refs(document_id)
                .await
                .map_err(MemoryError::Tracker)?;
            if !remaining.is_empty() {
                continue;
            }
            self.tracker
                .delete_document(document_id)
                .await
                .map_err(MemoryError::Tracker)?;
            report.documents_deleted += 1;
        }

        for tier in Tier::ALL {
            let _guard = self.lock_tier(tier).await;
            let known: HashSet<String> = self
                .tracker
                .chunk_ids_in_tier(tier)
                .await
                .map_err(MemoryError::Tracker)?
                .into_iter()
                .collect();
            let orphans: Vec<String> = self
                .store
                .ids(tier)
                .await
                .map_err(MemoryError::Store)?
                .into_iter()
                .filter(|id| !known.contains(id))
                .collect();
            if orphans.is_empty() {
                continue;
            }
            match self.delete_vectors(tier, &orphans).await {
                Ok(removed) => report.orphan_vectors_deleted += removed,
                Err(e) => tracing::warn!(tier = %tier, error = %e, "orphan vectors still present"),
            }
        }

        Ok(report)
    }
}

/// Run `tmem cleanup`.
pub async fn run_cleanup(config: &Config) -> Result<()> {
    let service = MemoryService::open(config).await?;
    let report = service.cleanup_expired().await?;

    println!("cleanup");
    println!("  expired documents: {}", report.expired_count);
    println!("  chunks deleted: {}", report.chunks_deleted);
    if !report.failures.is_empty() {
        println!("  failures: {}", report.failures.len());
        for f in &report.failures {
            println!("    {} (id {}): {}", f.file_path, f.document_id, f.error);
        }
        bail!("{} expired document(s) could not be removed", report.failures.len());
    }
    println!("ok");
    Ok(())
}

/// Run `tmem clear <tier> --yes`.
pub async fn run_clear(config: &Config, tier: Tier, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("Refusing to clear tier '{}' without --yes", tier);
    }
    let service = MemoryService::open(config).await?;
    let report = service.clear_tier(tier).await?;

    println!("clear {}", report.tier);
    println!("  documents deleted: {}", report.documents_deleted);
    println!("  vectors deleted: {}", report.vectors_deleted);
    println!("ok");
    Ok(())
}
