//! Query-time retrieval across all tiers.

use anyhow::Result;

use tiermem_core::rank;
use tiermem_core::{MemoryError, RetrievedChunk, Tier};

use crate::config::Config;
use crate::service::MemoryService;

impl MemoryService {
    /// The `top_k` passages most similar to `query`, tier-weighted.
    ///
    /// A blank query, `top_k == 0` or an empty store returns an empty list
    /// without touching the embedder. Access statistics of the returned
    /// chunks are updated; a failure there is logged and ignored.
    pub async fn retrieve_context(
        &self,
        query: &str,
        top_k: usize,
        min_score: f64,
    ) -> tiermem_core::Result<Vec<RetrievedChunk>> {
        if !min_score.is_finite() {
            return Err(MemoryError::InvalidInput(format!(
                "min_score must be a finite number, got {}",
                min_score
            )));
        }
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut stored = 0;
        for tier in Tier::ALL {
            stored += self.store.count(tier).await.map_err(MemoryError::Store)?;
        }
        if stored == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self.embeddings.embed_query(query).await?;
        let params = self.config.retrieval.params(top_k, min_score);
        let results = rank::retrieve(self.store.as_ref(), &query_vec, &params)
            .await
            .map_err(MemoryError::Store)?;

        let ids: Vec<String> = results.iter().map(|r| r.chunk_id.clone()).collect();
        if let Err(e) = self.tracker.track_access_many(&ids).await {
            tracing::warn!(error = %e, "failed to record chunk access");
        }

        tracing::debug!(top_k, min_score, hits = results.len(), "query answered");
        Ok(results)
    }
}

/// Run `tmem query`.
///
/// Prints a ranked table, the annotated context block (`--context`) or
/// JSON (`--json`).
pub async fn run_query(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    min_score: Option<f64>,
    context: bool,
    json: bool,
) -> Result<()> {
    let service = MemoryService::open(config).await?;
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let min_score = min_score.unwrap_or(config.retrieval.min_score);
    let results = service.retrieve_context(query, top_k, min_score).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if context {
        println!("{}", service.format_context(&results));
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} ({}, base {:.2} x {:.1})",
            i + 1,
            r.score,
            r.source(),
            r.tier,
            r.base_score,
            r.weight
        );
        let snippet: String = r.text.chars().take(200).collect();
        println!("    {}", snippet.replace('\n', " "));
        println!();
    }
    Ok(())
}
