//! The facade-owned embedding service.
//!
//! Wraps one [`Embedder`] and enforces, on every call:
//!
//! - the model is warmed up exactly once, under the `model_load` deadline;
//! - each batch finishes within the `embed` deadline;
//! - the backend returned one vector per input, each exactly D long,
//!   finite and non-zero;
//! - outputs are L2-normalised.
//!
//! Any violation is an error. There is no fallback backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use tiermem_core::embedding::{l2_normalize, validate_embeddings, Embedder};
use tiermem_core::{MemoryError, Result};

use crate::config::Config;

pub struct EmbeddingService {
    embedder: Arc<dyn Embedder>,
    warmed: OnceCell<()>,
    batch_size: usize,
    model_load_timeout: Duration,
    embed_timeout: Duration,
}

impl EmbeddingService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
        model_load_timeout: Duration,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            warmed: OnceCell::new(),
            batch_size: batch_size.max(1),
            model_load_timeout,
            embed_timeout,
        }
    }

    pub fn from_config(embedder: Arc<dyn Embedder>, config: &Config) -> Self {
        Self::new(
            embedder,
            config.embedding.batch_size,
            config.timeouts.model_load(),
            config.timeouts.embed(),
        )
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Output dimensionality D.
    pub fn dims(&self) -> usize {
        self.embedder.dims()
    }

    pub fn is_warm(&self) -> bool {
        self.warmed.initialized()
    }

    /// Load the model if this is the first call. A failed load is not
    /// cached; the next call tries again.
    pub async fn warm_up(&self) -> Result<()> {
        self.warmed
            .get_or_try_init(|| async {
                let started = std::time::Instant::now();
                tokio::time::timeout(self.model_load_timeout, self.embedder.warm_up())
                    .await
                    .map_err(|_| MemoryError::Timeout {
                        operation: "embedding model load",
                        seconds: self.model_load_timeout.as_secs(),
                    })?
                    .map_err(|e| MemoryError::Embedding(format!("{:#}", e)))?;
                tracing::info!(
                    model = self.embedder.model_name(),
                    dims = self.embedder.dims(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "embedding model ready"
                );
                Ok::<(), MemoryError>(())
            })
            .await?;
        Ok(())
    }

    /// Embed `texts` in `batch_size` batches, returning unit vectors in
    /// input order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.warm_up().await?;

        let dims = self.dims();
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let mut vectors = tokio::time::timeout(self.embed_timeout, self.embedder.embed(batch))
                .await
                .map_err(|_| MemoryError::Timeout {
                    operation: "embedding",
                    seconds: self.embed_timeout.as_secs(),
                })?
                .map_err(|e| MemoryError::Embedding(format!("{:#}", e)))?;

            validate_embeddings(&vectors, batch.len(), dims)?;
            for v in vectors.iter_mut() {
                l2_normalize(v);
            }
            out.append(&mut vectors);
        }

        tracing::debug!(count = out.len(), dims, "embedded texts");
        Ok(out)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| MemoryError::Embedding("empty embedding response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        dims: usize,
        output_dims: usize,
        delay: Duration,
        warmups: AtomicUsize,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(dims: usize) -> Self {
            Self {
                dims,
                output_dims: dims,
                delay: Duration::ZERO,
                warmups: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn warm_up(&self) -> anyhow::Result<()> {
            self.warmups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![1.0; self.output_dims];
                    v[0] += t.len() as f32;
                    v
                })
                .collect())
        }
    }

    fn service(embedder: Arc<Scripted>, batch_size: usize) -> EmbeddingService {
        EmbeddingService::new(
            embedder,
            batch_size,
            Duration::from_secs(5),
            Duration::from_millis(200),
        )
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {}", i)).collect()
    }

    #[tokio::test]
    async fn test_batches_and_normalises() {
        let embedder = Arc::new(Scripted::new(4));
        let svc = service(embedder.clone(), 3);

        let vectors = svc.embed(&texts(7)).await.unwrap();
        assert_eq!(vectors.len(), 7);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        for v in &vectors {
            assert_eq!(v.len(), 4);
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn test_warm_up_runs_once() {
        let embedder = Arc::new(Scripted::new(2));
        let svc = service(embedder.clone(), 8);
        assert!(!svc.is_warm());

        svc.warm_up().await.unwrap();
        svc.embed(&texts(2)).await.unwrap();
        svc.embed_query("q").await.unwrap();

        assert!(svc.is_warm());
        assert_eq!(embedder.warmups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let mut scripted = Scripted::new(4);
        scripted.output_dims = 3;
        let svc = service(Arc::new(scripted), 8);

        let err = svc.embed(&texts(1)).await.unwrap_err();
        assert!(matches!(
            err,
            MemoryError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let mut scripted = Scripted::new(2);
        scripted.delay = Duration::from_secs(2);
        let svc = service(Arc::new(scripted), 8);

        let err = svc.embed(&texts(1)).await.unwrap_err();
        assert!(matches!(err, MemoryError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_empty_input_skips_backend() {
        let embedder = Arc::new(Scripted::new(2));
        let svc = service(embedder.clone(), 8);
        assert!(svc.embed(&[]).await.unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(embedder.warmups.load(Ordering::SeqCst), 0);
    }
}
