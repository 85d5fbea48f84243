//! Embedder trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! plus pure helpers for validating, normalising, serialising and comparing
//! vectors.
//!
//! Concrete backends (OpenAI, Ollama, fastembed) and the guarded
//! embedding service live in the `tiermem` app crate.

use anyhow::Result;
use async_trait::async_trait;

use crate::error::MemoryError;

/// A text-embedding backend.
///
/// One backend is selected per deployment and never swapped at runtime;
/// every vector it returns must have exactly [`dims`](Embedder::dims)
/// components.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Output dimensionality D.
    fn dims(&self) -> usize;

    /// Load whatever the backend needs before the first call.
    ///
    /// Backends without expensive setup keep the default no-op.
    async fn warm_up(&self) -> Result<()> {
        Ok(())
    }

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Check a backend's output against the request.
///
/// Fails when the vector count differs from `expected_count`, any vector is
/// not `dims` long, contains a NaN/infinite component, or is all zeros.
pub fn validate_embeddings(
    vectors: &[Vec<f32>],
    expected_count: usize,
    dims: usize,
) -> Result<(), MemoryError> {
    if vectors.len() != expected_count {
        return Err(MemoryError::Embedding(format!(
            "backend returned {} vectors for {} inputs",
            vectors.len(),
            expected_count
        )));
    }
    for (i, v) in vectors.iter().enumerate() {
        if v.len() != dims {
            return Err(MemoryError::DimensionMismatch {
                expected: dims,
                actual: v.len(),
            });
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(MemoryError::Embedding(format!(
                "vector {} contains non-finite values",
                i
            )));
        }
        if v.iter().all(|x| *x == 0.0) {
            return Err(MemoryError::Embedding(format!("vector {} is all zeros", i)));
        }
    }
    Ok(())
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use tiermem_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-length operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance `1 - cos`, in `[0.0, 2.0]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
