//! In-memory [`VectorStore`] for tests and embedding in other hosts.
//!
//! One map per tier behind `std::sync::RwLock`. Queries are a brute-force
//! cosine scan taken under a single read guard, so each query sees one
//! consistent snapshot of its tier.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::embedding::cosine_distance;
use crate::models::Tier;

use super::{check_entry_dims, Neighbor, VectorEntry, VectorStore};

struct StoredVector {
    text: String,
    metadata: Map<String, Value>,
    vector: Vec<f32>,
}

#[derive(Default)]
struct Collection {
    dims: Option<usize>,
    vectors: HashMap<String, StoredVector>,
}

/// In-memory tiered store.
pub struct InMemoryVectorStore {
    tiers: [RwLock<Collection>; 3],
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            tiers: Default::default(),
        }
    }

    fn collection(&self, tier: Tier) -> &RwLock<Collection> {
        &self.tiers[tier.index()]
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory vector store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, tier: Tier, entries: &[VectorEntry]) -> Result<()> {
        let mut coll = self.collection(tier).write().map_err(poisoned)?;
        let dims = check_entry_dims(coll.dims, entries)?;
        coll.dims = dims;
        for e in entries {
            coll.vectors.insert(
                e.id.clone(),
                StoredVector {
                    text: e.text.clone(),
                    metadata: e.metadata.clone(),
                    vector: e.vector.clone(),
                },
            );
        }
        Ok(())
    }

    async fn query(&self, tier: Tier, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let coll = self.collection(tier).read().map_err(poisoned)?;
        if k == 0 || coll.vectors.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(d) = coll.dims {
            if vector.len() != d {
                anyhow::bail!(
                    "query vector has {} dimensions, tier '{}' expects {}",
                    vector.len(),
                    tier,
                    d
                );
            }
        }

        let mut hits: Vec<Neighbor> = coll
            .vectors
            .iter()
            .map(|(id, sv)| Neighbor {
                id: id.clone(),
                text: sv.text.clone(),
                metadata: sv.metadata.clone(),
                distance: cosine_distance(vector, &sv.vector) as f64,
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete(&self, tier: Tier, ids: &[String]) -> Result<usize> {
        let mut coll = self.collection(tier).write().map_err(poisoned)?;
        Ok(ids
            .iter()
            .filter(|id| coll.vectors.remove(id.as_str()).is_some())
            .count())
    }

    async fn count(&self, tier: Tier) -> Result<usize> {
        Ok(self.collection(tier).read().map_err(poisoned)?.vectors.len())
    }

    async fn clear(&self, tier: Tier) -> Result<usize> {
        let mut coll = self.collection(tier).write().map_err(poisoned)?;
        let removed = coll.vectors.len();
        coll.vectors.clear();
        Ok(removed)
    }

    async fn dims(&self, tier: Tier) -> Result<Option<usize>> {
        Ok(self.collection(tier).read().map_err(poisoned)?.dims)
    }

    async fn ids(&self, tier: Tier) -> Result<Vec<String>> {
        let coll = self.collection(tier).read().map_err(poisoned)?;
        let mut ids: Vec<String> = coll.vectors.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
