//! Batch ingestion.
//!
//! A batch runs in five phases:
//!
//! 1. **Plan**: per file, load the text (under the `load` deadline), compare
//!    its hash and tier with the tracker, and chunk it if it needs
//!    (re-)embedding. A file that fails here is recorded and skipped.
//! 2. **Embed** every new chunk of the batch. Any failure aborts the batch
//!    before anything is written.
//! 3. **Write vectors** into the target tier (under the `store_write`
//!    deadline). On failure the new ids are removed again and the batch
//!    aborts.
//! 4. **Commit** documents and chunk rows in one tracker transaction,
//!    marking replaced chunk rows pending. On failure the new vectors are
//!    removed and the batch aborts.
//! 5. **Drop replaced vectors** and purge their pending rows. Failures are
//!    logged; recovery finishes the job on the next open.
//!
//! The target tier's lock is held from phase 1 through phase 5. Replaced
//! vectors living in other tiers are removed afterwards, each under its own
//! tier's lock.

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use tiermem_core::chunk::{split_text, validate_params};
use tiermem_core::store::VectorEntry;
use tiermem_core::{MemoryError, Tier};

use crate::config::{ChunkingConfig, Config};
use crate::loader::expand_paths;
use crate::service::MemoryService;
use crate::tracker::{ChunkRef, IngestEntry};

/// Parameters shared by every file of a batch.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub tier: Tier,
    /// Seconds after `created_at` at which the document expires. `None`
    /// falls back to `[tiers].ephemeral_ttl_secs` for the ephemeral tier and
    /// means "never" otherwise.
    pub ttl_seconds: Option<i64>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Copied onto the document row and every chunk.
    pub metadata: Map<String, Value>,
}

impl IngestRequest {
    pub fn new(tier: Tier) -> Self {
        let chunking = ChunkingConfig::default();
        Self {
            tier,
            ttl_seconds: None,
            chunk_size: chunking.chunk_size,
            chunk_overlap: chunking.chunk_overlap,
            metadata: Map::new(),
        }
    }

    /// A request using the chunking parameters of `config`.
    pub fn from_config(tier: Tier, config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            ..Self::new(tier)
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: i64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }

    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A file that was skipped, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// `true` when no file of the batch failed.
    pub success: bool,
    /// New chunks embedded and stored.
    pub chunks_ingested: usize,
    /// Files ingested, re-ingested or found unchanged.
    pub files_processed: usize,
    /// Files whose content and tier were already current.
    pub files_unchanged: usize,
    pub files_failed: usize,
    pub failures: Vec<FileFailure>,
}

impl IngestReport {
    fn fail(&mut self, path: &Path, error: impl ToString) {
        self.files_failed += 1;
        self.failures.push(FileFailure {
            path: path.display().to_string(),
            error: error.to_string(),
        });
    }
}

struct NewChunk {
    id: String,
    text: String,
    metadata: Map<String, Value>,
}

/// Phase 1 result for one file.
struct PlannedFile {
    entry: IngestEntry,
    chunks: Vec<NewChunk>,
    /// Chunk rows (and vectors) superseded by `chunks`.
    stale: Vec<ChunkRef>,
}

impl MemoryService {
    /// Ingest `files` into `request.tier`.
    ///
    /// Per-file problems (missing, unsupported, unreadable, empty) are
    /// reported in [`IngestReport::failures`]. Embedding, vector-store and
    /// tracker failures abort the whole batch with an error and leave
    /// storage as it was.
    pub async fn ingest_documents(
        &self,
        files: &[PathBuf],
        request: &IngestRequest,
    ) -> tiermem_core::Result<IngestReport> {
        validate_params(request.chunk_size, request.chunk_overlap)?;
        let ttl_seconds = self.resolve_ttl(request)?;
        let tier = request.tier;
        let mut report = IngestReport::default();

        let guard = self.lock_tier(tier).await;

        // Phase 1
        let mut planned: Vec<PlannedFile> = Vec::with_capacity(files.len());
        let mut seen = HashSet::new();
        for path in files {
            match self.plan_file(path, request, ttl_seconds).await {
                Ok(plan) => {
                    if !seen.insert(plan.entry.file_path.clone()) {
                        report.fail(path, "listed more than once in the batch");
                        continue;
                    }
                    planned.push(plan);
                }
                Err(e @ MemoryError::Tracker(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping file");
                    report.fail(path, e);
                }
            }
        }

        // Phase 2
        let texts: Vec<String> = planned
            .iter()
            .flat_map(|p| p.chunks.iter().map(|c| c.text.clone()))
            .collect();
        let vectors = self.embeddings.embed(&texts).await.inspect_err(|e| {
            tracing::error!(error = %e, chunks = texts.len(), "embedding failed, batch aborted");
        })?;

        let entries: Vec<VectorEntry> = planned
            .iter_mut()
            .flat_map(|p| p.chunks.drain(..))
            .zip(vectors)
            .map(|(chunk, vector)| VectorEntry {
                id: chunk.id,
                text: chunk.text,
                metadata: chunk.metadata,
                vector,
            })
            .collect();
        let new_ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();

        // Phase 3
        if !entries.is_empty() {
            self.write_vectors(tier, &entries, &new_ids).await?;
        }

        // Phase 4
        let ingest_entries: Vec<IngestEntry> = planned.iter().map(|p| p.entry.clone()).collect();
        if let Err(e) = self.tracker.commit_ingest(&ingest_entries).await {
            tracing::error!(error = %e, "tracker commit failed, removing new vectors");
            self.discard_vectors(tier, &new_ids).await;
            return Err(MemoryError::Tracker(e));
        }

        // Phase 5
        let mut stale: BTreeMap<Tier, Vec<String>> = BTreeMap::new();
        for chunk in planned.iter().flat_map(|p| p.stale.iter()) {
            stale.entry(chunk.tier).or_default().push(chunk.chunk_id.clone());
        }
        if let Some(ids) = stale.remove(&tier) {
            self.remove_stale(tier, &ids).await;
        }
        drop(guard);
        for (other, ids) in stale {
            let _guard = self.lock_tier(other).await;
            self.remove_stale(other, &ids).await;
        }

        report.chunks_ingested = entries.len();
        report.files_processed = planned.len();
        report.files_unchanged = planned
            .iter()
            .filter(|p| p.entry.chunk_ids.is_empty())
            .count();
        report.success = report.failures.is_empty();

        tracing::info!(
            tier = %tier,
            files = report.files_processed,
            unchanged = report.files_unchanged,
            failed = report.files_failed,
            chunks = report.chunks_ingested,
            "ingest complete"
        );
        Ok(report)
    }

    fn resolve_ttl(&self, request: &IngestRequest) -> tiermem_core::Result<Option<i64>> {
        let ttl = match (request.ttl_seconds, request.tier) {
            (Some(ttl), _) => Some(ttl),
            (None, Tier::Ephemeral) => self.config.tiers.ephemeral_ttl_secs,
            (None, _) => None,
        };
        if let Some(ttl) = ttl {
            if ttl <= 0 {
                return Err(MemoryError::InvalidInput(format!(
                    "ttl_seconds must be > 0, got {}",
                    ttl
                )));
            }
        }
        Ok(ttl)
    }

    async fn plan_file(
        &self,
        path: &Path,
        request: &IngestRequest,
        ttl_seconds: Option<i64>,
    ) -> tiermem_core::Result<PlannedFile> {
        let load_timeout = self.config.timeouts.load();
        let doc = tokio::time::timeout(load_timeout, self.source.load(path))
            .await
            .map_err(|_| MemoryError::Timeout {
                operation: "document load",
                seconds: load_timeout.as_secs(),
            })?
            .map_err(|e| match e.downcast::<MemoryError>() {
                Ok(err) => err,
                Err(e) => MemoryError::InvalidInput(format!("{:#}", e)),
            })?;

        if doc.text.trim().is_empty() {
            return Err(MemoryError::InvalidInput(format!(
                "{} has no text content",
                doc.path
            )));
        }

        let existing = self
            .tracker
            .find_document(&doc.path)
            .await
            .map_err(MemoryError::Tracker)?;
        let (needs_embedding, stale) = match &existing {
            None => (true, Vec::new()),
            Some(rec)
                if rec.file_hash != doc.content_hash
                    || rec.tier != request.tier
                    || rec.pending_delete =>
            {
                let stale = self
                    .tracker
                    .all_chunk_refs(rec.id)
                    .await
                    .map_err(MemoryError::Tracker)?;
                (true, stale)
            }
            Some(_) => (false, Vec::new()),
        };

        let mut chunks = Vec::new();
        if needs_embedding {
            let texts = split_text(&doc.text, request.chunk_size, request.chunk_overlap)?;
            let total = texts.len();
            for (index, text) in texts.into_iter().enumerate() {
                let mut metadata = request.metadata.clone();
                metadata.insert("source".into(), doc.file_name.clone().into());
                metadata.insert("file_type".into(), doc.file_type.clone().into());
                metadata.insert("file_path".into(), doc.path.clone().into());
                metadata.insert("chunk_index".into(), index.into());
                metadata.insert("total_chunks".into(), total.into());
                metadata.insert("tier".into(), request.tier.as_str().into());
                chunks.push(NewChunk {
                    id: Uuid::new_v4().to_string(),
                    text,
                    metadata,
                });
            }
        }

        Ok(PlannedFile {
            entry: IngestEntry {
                file_path: doc.path,
                file_hash: doc.content_hash,
                tier: request.tier,
                ttl_seconds,
                metadata: request.metadata.clone(),
                replace_chunks: existing.is_some() && needs_embedding,
                chunk_ids: chunks.iter().map(|c| c.id.clone()).collect(),
            },
            chunks,
            stale,
        })
    }

    async fn write_vectors(
        &self,
        tier: Tier,
        entries: &[VectorEntry],
        new_ids: &[String],
    ) -> tiermem_core::Result<()> {
        let dims = self.embeddings.dims();
        if let Some(pinned) = self.store.dims(tier).await.map_err(MemoryError::Store)? {
            if pinned != dims {
                return Err(MemoryError::DimensionMismatch {
                    expected: pinned,
                    actual: dims,
                });
            }
        }

        let write_timeout = self.config.timeouts.store_write();
        match tokio::time::timeout(write_timeout, self.store.upsert(tier, entries)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::error!(tier = %tier, error = %e, "vector write failed, batch aborted");
                self.discard_vectors(tier, new_ids).await;
                Err(MemoryError::StoreWrite(e))
            }
            Err(_) => {
                tracing::error!(tier = %tier, "vector write timed out, batch aborted");
                self.discard_vectors(tier, new_ids).await;
                Err(MemoryError::Timeout {
                    operation: "vector store write",
                    seconds: write_timeout.as_secs(),
                })
            }
        }
    }

    /// Best-effort removal of vectors written by an aborted batch. Leftovers
    /// have no tracker rows and are swept by recovery.
    async fn discard_vectors(&self, tier: Tier, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        let write_timeout = self.config.timeouts.store_write();
        match tokio::time::timeout(write_timeout, self.store.delete(tier, ids)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::warn!(tier = %tier, error = %e, "could not remove vectors of aborted batch")
            }
            Err(_) => tracing::warn!(tier = %tier, "timed out removing vectors of aborted batch"),
        }
    }

    /// Delete superseded vectors, then their pending rows.
    async fn remove_stale(&self, tier: Tier, ids: &[String]) {
        let write_timeout = self.config.timeouts.store_write();
        match tokio::time::timeout(write_timeout, self.store.delete(tier, ids)).await {
            Ok(Ok(removed)) => {
                tracing::debug!(tier = %tier, removed, "replaced vectors deleted");
                if let Err(e) = self.tracker.purge_chunks(ids).await {
                    tracing::warn!(error = %e, "replaced chunk rows left pending");
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(tier = %tier, error = %e, "replaced vectors left for recovery")
            }
            Err(_) => tracing::warn!(tier = %tier, "timed out deleting replaced vectors"),
        }
    }
}

/// Run `tmem ingest`: expand `paths`, ingest them and print a summary.
pub async fn run_ingest(
    config: &Config,
    paths: &[PathBuf],
    recursive: bool,
    request: IngestRequest,
) -> Result<()> {
    let files = expand_paths(paths, recursive)?;
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled; set [embedding] provider to ingest documents");
    }
    let service = MemoryService::open(config).await?;
    let report = service.ingest_documents(&files, &request).await?;

    println!("ingest {}", request.tier);
    println!("  files processed: {}", report.files_processed);
    println!("  files unchanged: {}", report.files_unchanged);
    println!("  chunks ingested: {}", report.chunks_ingested);
    if report.files_failed > 0 {
        println!("  files failed: {}", report.files_failed);
        for failure in &report.failures {
            println!("    {}: {}", failure.path, failure.error);
        }
    }

    if !report.success {
        bail!("{} file(s) could not be ingested", report.files_failed);
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = IngestRequest::new(Tier::Core)
            .with_ttl(60)
            .with_chunking(150, 30)
            .with_metadata("topic", "rust");
        assert_eq!(request.tier, Tier::Core);
        assert_eq!(request.ttl_seconds, Some(60));
        assert_eq!((request.chunk_size, request.chunk_overlap), (150, 30));
        assert_eq!(request.metadata["topic"], "rust");
    }

    #[test]
    fn test_request_defaults_follow_config() {
        let mut config = Config::default();
        config.chunking.chunk_size = 400;
        config.chunking.chunk_overlap = 40;
        let request = IngestRequest::from_config(Tier::Reference, &config);
        assert_eq!((request.chunk_size, request.chunk_overlap), (400, 40));
        assert!(request.ttl_seconds.is_none());

        let plain = IngestRequest::new(Tier::Reference);
        assert_eq!((plain.chunk_size, plain.chunk_overlap), (1000, 200));
    }

    #[test]
    fn test_report_records_failures() {
        let mut report = IngestReport::default();
        report.fail(Path::new("/tmp/missing.md"), "cannot open");
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.failures[0].path, "/tmp/missing.md");
        assert_eq!(report.failures[0].error, "cannot open");
    }
}
