//! Tier-weighted retrieval across all collections.
//!
//! The ranking algorithm operates entirely through the [`VectorStore`]
//! trait. The caller embeds the query and passes the vector in.
//!
//! # Scoring Algorithm
//!
//! 1. For every tier, fetch `candidate_k = max(top_k, candidate_k_min)`
//!    nearest neighbours.
//! 2. `base_score = 1 - distance`; `score = base_score × tier weight`.
//! 3. Drop candidates with `score < min_score`.
//! 4. Pool tiers in order core, reference, ephemeral.
//! 5. Stable sort by `score` descending (ties keep pool order).
//! 6. Truncate to `top_k`.

use anyhow::Result;

use crate::models::{RetrievedChunk, Tier};
use crate::store::{Neighbor, VectorStore};

/// Default floor for per-tier candidate fetches.
pub const DEFAULT_CANDIDATE_K_MIN: usize = 10;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy)]
pub struct RankParams {
    /// Maximum results to return.
    pub top_k: usize,
    /// Results scoring below this (after weighting) are discarded.
    pub min_score: f64,
    /// Lower bound on neighbours fetched per tier.
    pub candidate_k_min: usize,
}

impl RankParams {
    pub fn new(top_k: usize, min_score: f64) -> Self {
        Self {
            top_k,
            min_score,
            candidate_k_min: DEFAULT_CANDIDATE_K_MIN,
        }
    }

    pub fn candidate_k(&self) -> usize {
        self.top_k.max(self.candidate_k_min)
    }
}

/// Weight, filter and merge per-tier neighbour lists.
///
/// `per_tier` may arrive in any order; pooling always follows [`Tier::ALL`].
pub fn merge_candidates(
    per_tier: Vec<(Tier, Vec<Neighbor>)>,
    params: &RankParams,
) -> Vec<RetrievedChunk> {
    let mut per_tier = per_tier;
    per_tier.sort_by_key(|(tier, _)| tier.index());

    let mut pooled = Vec::new();
    for (tier, neighbors) in per_tier {
        let weight = tier.weight();
        for n in neighbors {
            let base_score = 1.0 - n.distance;
            let score = base_score * weight;
            if score < params.min_score {
                continue;
            }
            pooled.push(RetrievedChunk {
                chunk_id: n.id,
                text: n.text,
                metadata: n.metadata,
                tier,
                score,
                base_score,
                weight,
            });
        }
    }

    // `sort_by` is stable: equal scores keep tier pool order.
    pooled.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    pooled.truncate(params.top_k);
    pooled
}

/// Query every tier of `store` with `query_vec` and rank the union.
pub async fn retrieve<S: VectorStore + ?Sized>(
    store: &S,
    query_vec: &[f32],
    params: &RankParams,
) -> Result<Vec<RetrievedChunk>> {
    if params.top_k == 0 {
        return Ok(Vec::new());
    }

    let k = params.candidate_k();
    let mut per_tier = Vec::with_capacity(Tier::ALL.len());
    for tier in Tier::ALL {
        // A tier that has never been written has no pinned dims and no rows.
        if store.dims(tier).await?.is_none() {
            continue;
        }
        per_tier.push((tier, store.query(tier, query_vec, k).await?));
    }

    Ok(merge_candidates(per_tier, params))
}

/// Render ranked chunks as an annotated text block.
///
/// Each chunk becomes
/// `[Context i - Tier: <tier>, Source: <source>, Relevance: <score>]\n<text>\n`
/// (1-based, score to two decimals); blocks are joined by a blank line.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "[Context {} - Tier: {}, Source: {}, Relevance: {:.2}]\n{}\n",
                i + 1,
                c.tier,
                c.source(),
                c.score,
                c.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
