//! Error kinds surfaced by the memory layer.
//!
//! Trait seams ([`VectorStore`](crate::store::VectorStore),
//! [`Embedder`](crate::embedding::Embedder)) return `anyhow::Result`; the
//! facade maps their failures onto these kinds so callers can tell an
//! invalid request apart from a batch that was aborted.

use thiserror::Error;

/// Convenience alias for results carrying a [`MemoryError`].
pub type Result<T, E = MemoryError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum MemoryError {
    /// Rejected before any side effect (bad parameters, missing file).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown tier '{0}': must be core, reference, or ephemeral")]
    UnknownTier(String),

    /// The embedding backend failed. Fatal for an ingestion batch.
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },

    #[error("vector store write failed: {0:#}")]
    StoreWrite(#[source] anyhow::Error),

    #[error("vector store error: {0:#}")]
    Store(#[source] anyhow::Error),

    #[error("metadata tracker error: {0:#}")]
    Tracker(#[source] anyhow::Error),

    /// Deleting an expired document failed. Logged by the reaper, which
    /// keeps going with the remaining documents.
    #[error("failed to delete expired document {document_id}: {source:#}")]
    ExpiryDelete {
        document_id: i64,
        #[source]
        source: anyhow::Error,
    },
}

impl MemoryError {
    /// `true` for errors that reject a request without touching storage.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::UnknownTier(_))
    }
}
