//! Tiered vector storage abstraction.
//!
//! A [`VectorStore`] holds one independent similarity index per [`Tier`].
//! Every collection pins its dimensionality D on the first write; later
//! writes and queries with a different length are rejected so that vectors
//! of different models can never be mixed inside one collection.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::models::Tier;

/// A vector to be written, with the passage it was computed from.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Chunk UUID.
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
    pub vector: Vec<f32>,
}

/// A nearest-neighbour hit from [`VectorStore::query`].
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
    /// Cosine distance `1 - cos`; smaller is closer.
    pub distance: f64,
}

/// Abstract tiered vector backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorStore::upsert) | Insert or replace vectors by id |
/// | [`query`](VectorStore::query) | `k` nearest neighbours, ascending distance |
/// | [`delete`](VectorStore::delete) | Remove vectors by id |
/// | [`count`](VectorStore::count) | Number of vectors in a tier |
/// | [`clear`](VectorStore::clear) | Remove every vector in a tier |
/// | [`dims`](VectorStore::dims) | Pinned dimensionality, if any |
/// | [`ids`](VectorStore::ids) | Every id stored in a tier |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace `entries` in `tier`, all or nothing.
    async fn upsert(&self, tier: Tier, entries: &[VectorEntry]) -> Result<()>;

    /// Return up to `k` neighbours of `vector`, closest first.
    ///
    /// An empty collection yields an empty list.
    async fn query(&self, tier: Tier, vector: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Delete the given ids from `tier`, returning how many existed.
    async fn delete(&self, tier: Tier, ids: &[String]) -> Result<usize>;

    async fn count(&self, tier: Tier) -> Result<usize>;

    /// Delete every vector in `tier`, returning how many were removed.
    /// The pinned dimensionality is kept.
    async fn clear(&self, tier: Tier) -> Result<usize>;

    async fn dims(&self, tier: Tier) -> Result<Option<usize>>;

    /// Every id in `tier`, sorted. Used to find vectors the tracker no
    /// longer knows about.
    async fn ids(&self, tier: Tier) -> Result<Vec<String>>;
}

/// Reject entries whose length differs from the collection's pinned `dims`
/// (or from each other when nothing is pinned yet).
pub fn check_entry_dims(pinned: Option<usize>, entries: &[VectorEntry]) -> Result<Option<usize>> {
    let expected = pinned.or_else(|| entries.first().map(|e| e.vector.len()));
    if let Some(d) = expected {
        if d == 0 {
            anyhow::bail!("cannot store zero-length vectors");
        }
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != d) {
            anyhow::bail!(
                "vector '{}' has {} dimensions, collection expects {}",
                bad.id,
                bad.vector.len(),
                d
            );
        }
    }
    Ok(expected)
}
