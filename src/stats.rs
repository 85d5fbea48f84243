//! Memory statistics and health overview.
//!
//! Used by `tmem stats` to show what is stored per tier, how much of it is
//! due for expiry, and whether any deletes are still pending.

use anyhow::Result;

use tiermem_core::Tier;

use crate::config::Config;
use crate::service::MemoryService;

/// Run the stats command: print a summary, or the raw [`MemoryStats`] as
/// JSON.
///
/// [`MemoryStats`]: crate::service::MemoryStats
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let service = MemoryService::open(config).await?;
    let stats = service.get_stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let meta_size = file_size(&config.storage.metadata_db());
    let vector_size = file_size(&config.storage.vector_db());

    println!("tiermem stats");
    println!("=============");
    println!();
    println!("  Storage:     {}", config.storage.dir.display());
    println!("  Size:        {}", format_bytes(meta_size + vector_size));
    println!("  Model:       {}", stats.embedding_model);
    println!();
    println!("  Documents:   {}", stats.metadata_stats.total_documents);
    println!("  Chunks:      {}", stats.total_chunks);
    println!("  Expired:     {}", stats.metadata_stats.expired_documents);
    if stats.metadata_stats.pending_deletes > 0 {
        println!("  Pending:     {}", stats.metadata_stats.pending_deletes);
    }

    println!();
    println!("  {:<12} {:>6} {:>6} {:>8}", "TIER", "WEIGHT", "DOCS", "CHUNKS");
    println!("  {}", "-".repeat(35));
    for tier in Tier::ALL {
        let docs = stats
            .metadata_stats
            .document_counts
            .get(tier.as_str())
            .copied()
            .unwrap_or(0);
        let chunks = stats.tier_counts.get(tier.as_str()).copied().unwrap_or(0);
        println!(
            "  {:<12} {:>6.1} {:>6} {:>8}",
            tier.as_str(),
            tier.weight(),
            docs,
            chunks
        );
    }
    println!();

    Ok(())
}

fn file_size(path: &std::path::Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
