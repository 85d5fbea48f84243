//! End-to-end tests of the memory facade over real SQLite storage.
//!
//! A deterministic bag-of-words embedder stands in for a model so rankings
//! are predictable and no network or ONNX runtime is needed.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use tiermem::config::Config;
use tiermem::ingest::IngestRequest;
use tiermem::service::MemoryService;
use tiermem_core::embedding::Embedder;
use tiermem_core::store::VectorEntry;
use tiermem_core::{MemoryError, Tier};

// ─── Test Embedder ──────────────────────────────────────────────────

const DIMS: usize = 64;

/// Hashes lower-cased words into buckets. Texts sharing words end up close.
struct HashEmbedder {
    dims: usize,
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
}

impl HashEmbedder {
    fn new() -> Self {
        Self::with_dims(DIMS)
    }

    fn with_dims(dims: usize) -> Self {
        Self {
            dims,
            delay: Duration::ZERO,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }
}

fn bucket(word: &str, dims: usize) -> usize {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in word.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    (h % dims as u64) as usize
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            bail!("model crashed");
        }
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; self.dims];
                v[0] = 0.05;
                for word in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    v[bucket(&word.to_lowercase(), self.dims)] += 1.0;
                }
                v
            })
            .collect())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config(tmp: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.dir = tmp.path().join("data");
    config
}

async fn open_with(config: &Config, embedder: Arc<dyn Embedder>) -> MemoryService {
    MemoryService::open_with_embedder(config, embedder)
        .await
        .unwrap()
}

async fn open(tmp: &TempDir) -> MemoryService {
    open_with(&test_config(tmp), Arc::new(HashEmbedder::new())).await
}

fn write(tmp: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = tmp.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn canonical(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap()
        .to_string_lossy()
        .into_owned()
}

const RUST_DOC: &str = "Rust programs are built with cargo. Cargo fetches crates \
    and compiles the rust workspace. The borrow checker keeps rust memory safe.";
const PYTHON_DOC: &str = "Python notebooks are popular for machine learning. \
    Pandas and numpy handle data frames while pytorch trains neural networks.";

fn long_text(sentences: usize, word: &str) -> String {
    (0..sentences)
        .map(|i| format!("Sentence {} talks about {} in some detail. ", i, word))
        .collect()
}

async fn total_vectors(service: &MemoryService) -> usize {
    let mut n = 0;
    for tier in Tier::ALL {
        n += service.store().count(tier).await.unwrap();
    }
    n
}

// ─── Ingest ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ingest_and_retrieve() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let rust = write(&tmp, "rust.md", RUST_DOC);
    let python = write(&tmp, "python.txt", PYTHON_DOC);

    let report = service
        .ingest_documents(&[rust, python], &IngestRequest::new(Tier::Reference))
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.files_processed, 2);
    assert_eq!(report.chunks_ingested, 2);

    let results = service
        .retrieve_context("how does cargo build rust crates", 5, 0.0)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].source(), "rust.md");
    assert_eq!(results[0].tier, Tier::Reference);
    assert!(results[0].score > results[1].score);
    for r in &results {
        assert!((r.score - r.base_score * r.weight).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_chunk_metadata_recorded() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let path = write(&tmp, "notes.md", &long_text(30, "rust"));

    let request = IngestRequest::new(Tier::Core)
        .with_chunking(200, 40)
        .with_metadata("project", "tiermem");
    let report = service.ingest_documents(&[path.clone()], &request).await.unwrap();
    assert!(report.chunks_ingested > 1);

    let results = service.retrieve_context("rust", 50, 0.0).await.unwrap();
    assert_eq!(results.len(), report.chunks_ingested);
    let meta = &results[0].metadata;
    assert_eq!(meta["source"], "notes.md");
    assert_eq!(meta["file_type"], "md");
    assert_eq!(meta["file_path"], canonical(&path).as_str());
    assert_eq!(meta["tier"], "core");
    assert_eq!(meta["project"], "tiermem");
    assert_eq!(meta["total_chunks"], report.chunks_ingested);
}

#[tokio::test]
async fn test_reingest_unchanged_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let path = write(&tmp, "doc.md", &long_text(20, "memory"));
    let request = IngestRequest::new(Tier::Reference).with_chunking(150, 30);

    let first = service.ingest_documents(&[path.clone()], &request).await.unwrap();
    let count = service.store().count(Tier::Reference).await.unwrap();
    assert_eq!(count, first.chunks_ingested);

    let second = service.ingest_documents(&[path.clone()], &request).await.unwrap();
    assert!(second.success);
    assert_eq!(second.files_unchanged, 1);
    assert_eq!(second.chunks_ingested, 0);
    assert_eq!(service.store().count(Tier::Reference).await.unwrap(), count);

    let stats = service.get_stats().await.unwrap();
    assert_eq!(stats.metadata_stats.total_documents, 1);
    assert_eq!(stats.metadata_stats.total_chunks as usize, count);
}

#[tokio::test]
async fn test_changed_content_replaces_chunks() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let path = write(&tmp, "doc.md", &long_text(10, "alpha"));
    let request = IngestRequest::new(Tier::Reference).with_chunking(150, 30);

    service.ingest_documents(&[path.clone()], &request).await.unwrap();
    let before = service
        .tracker()
        .find_document(&canonical(&path))
        .await
        .unwrap()
        .unwrap();
    let old_ids = service.store().ids(Tier::Reference).await.unwrap();

    std::fs::write(&path, long_text(25, "beta")).unwrap();
    let report = service.ingest_documents(&[path.clone()], &request).await.unwrap();

    let after = service
        .tracker()
        .find_document(&canonical(&path))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.created_at, before.created_at);
    assert_ne!(after.file_hash, before.file_hash);

    let new_ids = service.store().ids(Tier::Reference).await.unwrap();
    assert_eq!(new_ids.len(), report.chunks_ingested);
    assert!(old_ids.iter().all(|id| !new_ids.contains(id)));

    let stats = service.get_stats().await.unwrap();
    assert_eq!(stats.metadata_stats.total_chunks as usize, report.chunks_ingested);
    assert_eq!(stats.metadata_stats.pending_deletes, 0);

    let results = service.retrieve_context("alpha", 50, 0.0).await.unwrap();
    assert!(results.iter().all(|r| !r.text.contains("alpha")));
}

#[tokio::test]
async fn test_reingest_into_other_tier_moves_chunks() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let path = write(&tmp, "doc.md", RUST_DOC);

    service
        .ingest_documents(&[path.clone()], &IngestRequest::new(Tier::Reference))
        .await
        .unwrap();
    let report = service
        .ingest_documents(&[path.clone()], &IngestRequest::new(Tier::Core))
        .await
        .unwrap();
    assert_eq!(report.files_unchanged, 0);
    assert_eq!(report.chunks_ingested, 1);

    assert_eq!(service.store().count(Tier::Reference).await.unwrap(), 0);
    assert_eq!(service.store().count(Tier::Core).await.unwrap(), 1);
    assert_eq!(
        service
            .tracker()
            .get_document_tier(&canonical(&path))
            .await
            .unwrap(),
        Some(Tier::Core)
    );

    let results = service.retrieve_context("cargo", 5, 0.0).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].weight, 1.5);
}

#[tokio::test]
async fn test_missing_file_is_isolated() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let good = write(&tmp, "good.md", RUST_DOC);
    let missing = tmp.path().join("missing.md");
    let unsupported = write(&tmp, "slides.pdf", "not really a pdf");
    let blank = write(&tmp, "blank.txt", "   \n\n  ");

    let report = service
        .ingest_documents(
            &[good, missing, unsupported, blank],
            &IngestRequest::new(Tier::Reference),
        )
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.files_failed, 3);
    assert!(report.failures[0].path.ends_with("missing.md"));
    assert!(report.failures[1].error.contains("unsupported"));
    assert!(report.failures[2].error.contains("no text"));
    assert_eq!(service.store().count(Tier::Reference).await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_path_in_batch() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let path = write(&tmp, "doc.md", RUST_DOC);

    let report = service
        .ingest_documents(&[path.clone(), path], &IngestRequest::new(Tier::Reference))
        .await
        .unwrap();
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.files_failed, 1);
    assert_eq!(service.store().count(Tier::Reference).await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_parameters_rejected_before_writes() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let path = write(&tmp, "doc.md", RUST_DOC);

    let bad_chunking = IngestRequest::new(Tier::Reference).with_chunking(100, 100);
    let err = service
        .ingest_documents(&[path.clone()], &bad_chunking)
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());

    let bad_ttl = IngestRequest::new(Tier::Ephemeral).with_ttl(0);
    let err = service.ingest_documents(&[path], &bad_ttl).await.unwrap_err();
    assert!(err.is_invalid_input());

    assert_eq!(total_vectors(&service).await, 0);
    let stats = service.get_stats().await.unwrap();
    assert_eq!(stats.metadata_stats.total_documents, 0);
}

#[tokio::test]
async fn test_embedding_failure_leaves_storage_untouched() {
    let tmp = TempDir::new().unwrap();
    let service = open_with(&test_config(&tmp), Arc::new(HashEmbedder::failing())).await;
    let path = write(&tmp, "doc.md", RUST_DOC);

    let err = service
        .ingest_documents(&[path], &IngestRequest::new(Tier::Core))
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Embedding(_)));

    assert_eq!(total_vectors(&service).await, 0);
    let stats = service.get_stats().await.unwrap();
    assert_eq!(stats.metadata_stats.total_documents, 0);
    assert_eq!(stats.metadata_stats.total_chunks, 0);
}

#[tokio::test]
async fn test_dimension_mismatch_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let first = open_with(&config, Arc::new(HashEmbedder::new())).await;
    let a = write(&tmp, "a.md", RUST_DOC);
    first
        .ingest_documents(&[a], &IngestRequest::new(Tier::Reference))
        .await
        .unwrap();

    let second = open_with(&config, Arc::new(HashEmbedder::with_dims(32))).await;
    let b = write(&tmp, "b.md", PYTHON_DOC);
    let err = second
        .ingest_documents(&[b.clone()], &IngestRequest::new(Tier::Reference))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MemoryError::DimensionMismatch {
            expected: 64,
            actual: 32
        }
    ));

    assert_eq!(second.store().count(Tier::Reference).await.unwrap(), 1);
    assert!(second
        .tracker()
        .find_document(&canonical(&b))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_slow_embedder_times_out() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    config.timeouts.embed_secs = 1;
    let service = open_with(&config, Arc::new(HashEmbedder::slow(Duration::from_secs(3)))).await;
    let path = write(&tmp, "doc.md", RUST_DOC);

    let err = service
        .ingest_documents(&[path], &IngestRequest::new(Tier::Reference))
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Timeout { .. }));
    assert_eq!(total_vectors(&service).await, 0);
}

#[tokio::test]
async fn test_concurrent_ingest_same_tier() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let a = write(&tmp, "a.md", RUST_DOC);
    let b = write(&tmp, "b.md", PYTHON_DOC);
    let request = IngestRequest::new(Tier::Reference);

    let a_files = [a];
    let b_files = [b];
    let (ra, rb) = tokio::join!(
        service.ingest_documents(&a_files, &request),
        service.ingest_documents(&b_files, &request)
    );
    assert!(ra.unwrap().success);
    assert!(rb.unwrap().success);
    assert_eq!(service.store().count(Tier::Reference).await.unwrap(), 2);
    assert_eq!(
        service.get_stats().await.unwrap().metadata_stats.total_documents,
        2
    );
}

/// Every chunk row points at a stored vector and every stored vector has a row.
async fn assert_tracker_matches_store(service: &MemoryService) {
    for tier in Tier::ALL {
        let mut tracked = service.tracker().chunk_ids_in_tier(tier).await.unwrap();
        tracked.sort();
        let stored = service.store().ids(tier).await.unwrap();
        assert_eq!(tracked, stored, "tier {}", tier);
    }
}

#[tokio::test]
async fn test_clear_waits_for_inflight_ingest() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(HashEmbedder::slow(Duration::from_millis(800)));
    let service = open_with(&test_config(&tmp), embedder).await;
    let path = write(&tmp, "rust.md", RUST_DOC);
    let files = [path.clone()];
    let request = IngestRequest::new(Tier::Core);

    let (ingested, cleared) = tokio::join!(service.ingest_documents(&files, &request), async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        service.clear_tier(Tier::Core).await
    });
    assert_eq!(ingested.unwrap().chunks_ingested, 1);
    let cleared = cleared.unwrap();
    assert_eq!(cleared.documents_deleted, 1);
    assert_eq!(cleared.vectors_deleted, 1);

    assert!(service
        .tracker()
        .find_document(&canonical(&path))
        .await
        .unwrap()
        .is_none());
    assert_tracker_matches_store(&service).await;

    // Nothing is left behind that would make a re-ingest look unchanged.
    let report = service.ingest_documents(&files, &request).await.unwrap();
    assert_eq!(report.chunks_ingested, 1);
    assert_eq!(report.files_unchanged, 0);
    let hits = service.retrieve_context("cargo crates", 5, 0.0).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].tier, Tier::Core);
}

#[tokio::test]
async fn test_clear_leaves_concurrent_ingest_into_other_tier() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(HashEmbedder::slow(Duration::from_millis(300)));
    let service = open_with(&test_config(&tmp), embedder).await;
    let core = write(&tmp, "core.md", PYTHON_DOC);
    service
        .ingest_documents(&[core], &IngestRequest::new(Tier::Core))
        .await
        .unwrap();

    let reference = [write(&tmp, "reference.md", RUST_DOC)];
    let request = IngestRequest::new(Tier::Reference);
    let (ingested, cleared) = tokio::join!(
        service.ingest_documents(&reference, &request),
        service.clear_tier(Tier::Core)
    );
    assert!(ingested.unwrap().success);
    assert_eq!(cleared.unwrap().documents_deleted, 1);

    assert_eq!(service.store().count(Tier::Core).await.unwrap(), 0);
    assert_eq!(service.store().count(Tier::Reference).await.unwrap(), 1);
    assert_tracker_matches_store(&service).await;
}

#[tokio::test]
async fn test_expiry_waits_for_inflight_reingest() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(HashEmbedder::slow(Duration::from_millis(800)));
    let service = open_with(&test_config(&tmp), embedder).await;
    let path = write(&tmp, "note.md", RUST_DOC);
    let files = [path.clone()];
    let request = IngestRequest::new(Tier::Ephemeral).with_ttl(10);
    service.ingest_documents(&files, &request).await.unwrap();
    let created = service
        .tracker()
        .find_document(&canonical(&path))
        .await
        .unwrap()
        .unwrap()
        .created_at;

    std::fs::write(&path, PYTHON_DOC).unwrap();
    let (ingested, swept) = tokio::join!(service.ingest_documents(&files, &request), async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        service.cleanup_expired_at(created + 11).await
    });
    assert_eq!(ingested.unwrap().chunks_ingested, 1);

    // The replacement keeps created_at, so it is still expired once the
    // sweep gets the lock, and goes as a whole.
    let swept = swept.unwrap();
    assert_eq!(swept.expired_count, 1);
    assert_eq!(swept.chunks_deleted, 1);
    assert!(swept.failures.is_empty());
    assert!(service
        .tracker()
        .find_document(&canonical(&path))
        .await
        .unwrap()
        .is_none());
    assert_eq!(total_vectors(&service).await, 0);
    assert_tracker_matches_store(&service).await;
}

#[tokio::test]
async fn test_expiry_racing_move_to_other_tier() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(HashEmbedder::slow(Duration::from_millis(800)));
    let service = open_with(&test_config(&tmp), embedder).await;
    let path = write(&tmp, "note.md", RUST_DOC);
    let files = [path.clone()];
    service
        .ingest_documents(&files, &IngestRequest::new(Tier::Ephemeral).with_ttl(10))
        .await
        .unwrap();
    let created = service
        .tracker()
        .find_document(&canonical(&path))
        .await
        .unwrap()
        .unwrap()
        .created_at;

    let promote = IngestRequest::new(Tier::Reference);
    let (ingested, swept) = tokio::join!(service.ingest_documents(&files, &promote), async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        service.cleanup_expired_at(created + 11).await
    });
    assert!(ingested.unwrap().success);
    assert!(swept.unwrap().failures.is_empty());

    // The promoted copy survives with its vector; the expired one is gone.
    let doc = service
        .tracker()
        .find_document(&canonical(&path))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.tier, Tier::Reference);
    assert_eq!(doc.ttl_seconds, None);
    assert_eq!(service.store().count(Tier::Ephemeral).await.unwrap(), 0);
    assert_eq!(service.store().count(Tier::Reference).await.unwrap(), 1);
    assert_tracker_matches_store(&service).await;
}

#[tokio::test]
async fn test_query_during_expiry_pass() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let mut scratch = Vec::new();
    for i in 0..4 {
        scratch.push(write(&tmp, &format!("scratch{}.md", i), &long_text(6, "cargo")));
    }
    service
        .ingest_documents(
            &scratch,
            &IngestRequest::new(Tier::Ephemeral)
                .with_ttl(10)
                .with_chunking(150, 30),
        )
        .await
        .unwrap();
    let keep = write(&tmp, "keep.md", RUST_DOC);
    service
        .ingest_documents(&[keep], &IngestRequest::new(Tier::Reference))
        .await
        .unwrap();

    let mut before: Vec<String> = Vec::new();
    for tier in Tier::ALL {
        before.extend(service.store().ids(tier).await.unwrap());
    }
    let created = service
        .tracker()
        .find_document(&canonical(&scratch[0]))
        .await
        .unwrap()
        .unwrap()
        .created_at;

    let (swept, hits) = tokio::join!(
        service.cleanup_expired_at(created + 3600),
        service.retrieve_context("cargo crates rust", 20, 0.0)
    );
    assert_eq!(swept.unwrap().expired_count, 4);
    let hits = hits.unwrap();
    assert!(hits.iter().any(|h| h.tier == Tier::Reference));
    assert!(hits.iter().all(|h| before.contains(&h.chunk_id)));

    let after = service.retrieve_context("cargo crates rust", 20, 0.0).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].tier, Tier::Reference);
    assert_tracker_matches_store(&service).await;
}

// ─── Retrieval ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_tier_weights_order_equal_passages() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let core = write(&tmp, "core.md", RUST_DOC);
    let ephemeral = write(&tmp, "scratch.md", RUST_DOC);

    service
        .ingest_documents(&[core], &IngestRequest::new(Tier::Core))
        .await
        .unwrap();
    service
        .ingest_documents(&[ephemeral], &IngestRequest::new(Tier::Ephemeral))
        .await
        .unwrap();

    let results = service.retrieve_context("borrow checker", 5, 0.0).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].tier, Tier::Core);
    assert_eq!(results[1].tier, Tier::Ephemeral);
    assert!((results[0].base_score - results[1].base_score).abs() < 1e-6);
    assert!((results[0].score - results[0].base_score * 1.5).abs() < 1e-9);
    assert!((results[1].score - results[1].base_score * 0.7).abs() < 1e-9);
}

#[tokio::test]
async fn test_min_score_and_top_k() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let path = write(&tmp, "doc.md", &long_text(40, "tiers"));
    service
        .ingest_documents(
            &[path],
            &IngestRequest::new(Tier::Reference).with_chunking(120, 20),
        )
        .await
        .unwrap();

    let top3 = service.retrieve_context("tiers", 3, 0.0).await.unwrap();
    assert_eq!(top3.len(), 3);
    assert!(top3.windows(2).all(|w| w[0].score >= w[1].score));

    let threshold = top3[1].score;
    let filtered = service.retrieve_context("tiers", 50, threshold).await.unwrap();
    assert!(!filtered.is_empty());
    assert!(filtered.iter().all(|r| r.score >= threshold));

    assert!(service
        .retrieve_context("tiers", 5, 10.0)
        .await
        .unwrap()
        .is_empty());
    assert!(service
        .retrieve_context("tiers", 5, f64::NAN)
        .await
        .unwrap_err()
        .is_invalid_input());
}

#[tokio::test]
async fn test_empty_store_and_blank_query() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(HashEmbedder::new());
    let service = open_with(&test_config(&tmp), embedder.clone()).await;

    assert!(service.retrieve_context("anything", 5, 0.0).await.unwrap().is_empty());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);

    let path = write(&tmp, "doc.md", RUST_DOC);
    service
        .ingest_documents(&[path], &IngestRequest::new(Tier::Reference))
        .await
        .unwrap();
    assert!(service.retrieve_context("   ", 5, 0.0).await.unwrap().is_empty());
    assert!(service.retrieve_context("cargo", 0, 0.0).await.unwrap().is_empty());
    assert_eq!(service.format_context(&[]), "");
}

#[tokio::test]
async fn test_query_tracks_access() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let path = write(&tmp, "doc.md", RUST_DOC);
    service
        .ingest_documents(&[path], &IngestRequest::new(Tier::Reference))
        .await
        .unwrap();

    let results = service.retrieve_context("cargo", 1, 0.0).await.unwrap();
    service.retrieve_context("cargo", 1, 0.0).await.unwrap();

    let stats = service
        .tracker()
        .chunk_stats(&results[0].chunk_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.access_count, 2);
    assert!(stats.last_accessed.is_some());
}

#[tokio::test]
async fn test_format_context_output() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let path = write(&tmp, "rust.md", RUST_DOC);
    service
        .ingest_documents(&[path], &IngestRequest::new(Tier::Core))
        .await
        .unwrap();

    let results = service.retrieve_context("cargo", 1, 0.0).await.unwrap();
    let context = service.format_context(&results);
    assert!(context.starts_with("[Context 1 - Tier: core, Source: rust.md, Relevance: "));
    assert!(context.contains("Rust programs are built with cargo."));
}

// ─── Expiry, clear, recovery ────────────────────────────────────────

#[tokio::test]
async fn test_ttl_expiry_boundary() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let short = write(&tmp, "short.md", &long_text(12, "scratch"));
    let keep = write(&tmp, "keep.md", RUST_DOC);

    let report = service
        .ingest_documents(
            &[short.clone()],
            &IngestRequest::new(Tier::Ephemeral)
                .with_ttl(100)
                .with_chunking(150, 30),
        )
        .await
        .unwrap();
    service
        .ingest_documents(&[keep], &IngestRequest::new(Tier::Reference))
        .await
        .unwrap();

    let created = service
        .tracker()
        .find_document(&canonical(&short))
        .await
        .unwrap()
        .unwrap()
        .created_at;

    let none = service.cleanup_expired_at(created + 100).await.unwrap();
    assert_eq!(none.expired_count, 0);

    let swept = service.cleanup_expired_at(created + 101).await.unwrap();
    assert_eq!(swept.expired_count, 1);
    assert_eq!(swept.chunks_deleted, report.chunks_ingested);
    assert!(swept.failures.is_empty());

    assert_eq!(service.store().count(Tier::Ephemeral).await.unwrap(), 0);
    assert_eq!(service.store().count(Tier::Reference).await.unwrap(), 1);
    assert!(service
        .tracker()
        .find_document(&canonical(&short))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_ttl_expires_in_real_time() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let path = write(&tmp, "note.md", RUST_DOC);
    service
        .ingest_documents(&[path], &IngestRequest::new(Tier::Ephemeral).with_ttl(1))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(2100)).await;
    let report = service.cleanup_expired().await.unwrap();
    assert_eq!(report.expired_count, 1);
    assert_eq!(report.chunks_deleted, 1);
    assert_eq!(total_vectors(&service).await, 0);
}

#[tokio::test]
async fn test_ephemeral_default_ttl() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    config.tiers.ephemeral_ttl_secs = Some(600);
    let service = open_with(&config, Arc::new(HashEmbedder::new())).await;
    let scratch = write(&tmp, "scratch.md", RUST_DOC);
    let kept = write(&tmp, "kept.md", PYTHON_DOC);

    service
        .ingest_documents(&[scratch.clone()], &IngestRequest::new(Tier::Ephemeral))
        .await
        .unwrap();
    service
        .ingest_documents(&[kept.clone()], &IngestRequest::new(Tier::Reference))
        .await
        .unwrap();

    let tracker = service.tracker();
    let scratch_doc = tracker.find_document(&canonical(&scratch)).await.unwrap().unwrap();
    let kept_doc = tracker.find_document(&canonical(&kept)).await.unwrap().unwrap();
    assert_eq!(scratch_doc.ttl_seconds, Some(600));
    assert_eq!(kept_doc.ttl_seconds, None);
}

#[tokio::test]
async fn test_clear_tier() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let a = write(&tmp, "a.md", RUST_DOC);
    let b = write(&tmp, "b.md", PYTHON_DOC);
    service
        .ingest_documents(&[a.clone()], &IngestRequest::new(Tier::Core))
        .await
        .unwrap();
    service
        .ingest_documents(&[b], &IngestRequest::new(Tier::Reference))
        .await
        .unwrap();

    let report = service.clear_tier(Tier::Core).await.unwrap();
    assert_eq!(report.documents_deleted, 1);
    assert_eq!(report.vectors_deleted, 1);

    assert_eq!(service.store().count(Tier::Core).await.unwrap(), 0);
    assert_eq!(service.store().count(Tier::Reference).await.unwrap(), 1);
    assert!(service
        .tracker()
        .find_document(&canonical(&a))
        .await
        .unwrap()
        .is_none());

    // The cleared tier accepts new writes.
    let report = service
        .ingest_documents(&[a], &IngestRequest::new(Tier::Core))
        .await
        .unwrap();
    assert_eq!(report.chunks_ingested, 1);
}

#[tokio::test]
async fn test_recovery_on_open_finishes_pending_delete() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let path = write(&tmp, "doc.md", &long_text(15, "pending"));

    {
        let service = open_with(&config, Arc::new(HashEmbedder::new())).await;
        service
            .ingest_documents(
                &[path.clone()],
                &IngestRequest::new(Tier::Reference).with_chunking(150, 30),
            )
            .await
            .unwrap();
        let doc = service
            .tracker()
            .find_document(&canonical(&path))
            .await
            .unwrap()
            .unwrap();
        // Simulate a crash right after the first deletion step.
        service.tracker().mark_document_pending(doc.id).await.unwrap();
    }

    let service = open_with(&config, Arc::new(HashEmbedder::new())).await;
    assert!(service
        .tracker()
        .find_document(&canonical(&path))
        .await
        .unwrap()
        .is_none());
    assert_eq!(total_vectors(&service).await, 0);
    assert_eq!(
        service.get_stats().await.unwrap().metadata_stats.pending_deletes,
        0
    );
}

#[tokio::test]
async fn test_recovery_sweeps_orphan_vectors() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let path = write(&tmp, "doc.md", RUST_DOC);
    service
        .ingest_documents(&[path], &IngestRequest::new(Tier::Reference))
        .await
        .unwrap();

    // A vector written by a batch that never reached its tracker commit.
    let mut vector = vec![0.0; DIMS];
    vector[1] = 1.0;
    service
        .store()
        .upsert(
            Tier::Reference,
            &[VectorEntry {
                id: "orphan".to_string(),
                text: "orphaned passage".to_string(),
                metadata: Default::default(),
                vector,
            }],
        )
        .await
        .unwrap();

    let report = service.recover_pending_deletes().await.unwrap();
    assert_eq!(report.orphan_vectors_deleted, 1);
    assert_eq!(report.documents_deleted, 0);
    assert_eq!(
        service.store().ids(Tier::Reference).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_stats_per_tier() {
    let tmp = TempDir::new().unwrap();
    let service = open(&tmp).await;
    let empty = service.get_stats().await.unwrap();
    assert_eq!(empty.total_chunks, 0);
    assert_eq!(empty.tier_counts.len(), 3);
    assert_eq!(empty.embedding_model, "hash-bow");

    let a = write(&tmp, "a.md", RUST_DOC);
    let b = write(&tmp, "b.md", PYTHON_DOC);
    service
        .ingest_documents(&[a, b], &IngestRequest::new(Tier::Core))
        .await
        .unwrap();

    let stats = service.get_stats().await.unwrap();
    assert_eq!(stats.total_chunks, 2);
    assert_eq!(stats.tier_counts["core"], 2);
    assert_eq!(stats.tier_counts["ephemeral"], 0);
    assert_eq!(stats.metadata_stats.document_counts["core"], 2);
}
