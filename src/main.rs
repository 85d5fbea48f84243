//! # tiermem CLI (`tmem`)
//!
//! The `tmem` binary drives the memory layer from the shell: initialise
//! storage, ingest files into a tier, query, inspect, expire and clear.
//!
//! ## Usage
//!
//! ```bash
//! tmem --config ./config/tmem.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tmem init` | Create both SQLite databases and run migrations |
//! | `tmem ingest <paths..>` | Chunk, embed and store files in a tier |
//! | `tmem query "<text>"` | Tier-weighted semantic search |
//! | `tmem stats` | Per-tier document and chunk counts |
//! | `tmem cleanup` | Remove documents whose TTL has run out |
//! | `tmem clear <tier> --yes` | Delete everything in one tier |
//! | `tmem warmup` | Load the embedding model ahead of time |
//!
//! ## Examples
//!
//! ```bash
//! tmem ingest ./notes --recursive --tier core
//! tmem ingest scratch.md --tier ephemeral --ttl 3600
//! tmem query "how do we deploy" --top-k 3 --context
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tiermem::ingest::IngestRequest;
use tiermem::service::MemoryService;
use tiermem::{cleanup, config, ingest, migrate, retrieve, stats};
use tiermem_core::{MemoryError, Tier};

/// tiermem: a local-first tiered long-term memory for conversational agents.
#[derive(Parser)]
#[command(
    name = "tmem",
    about = "tiermem: a local-first tiered long-term memory for conversational agents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/tmem.toml`. Storage, chunking, retrieval,
    /// embedding, timeout and tier settings are read from this file.
    #[arg(long, global = true, default_value = "./config/tmem.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize both databases.
    ///
    /// Creates `metadata.sqlite` and `vectors.sqlite` under `[storage].dir`
    /// with all tables. Safe to run more than once.
    Init,

    /// Ingest plain-text files (`.txt`, `.md`, `.markdown`) into a tier.
    ///
    /// Unchanged files are skipped; changed files have their chunks
    /// replaced. Directories contribute their supported files.
    Ingest {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Target tier: core, reference, or ephemeral.
        #[arg(long, default_value = "reference", value_parser = parse_tier)]
        tier: Tier,

        /// Expire the documents this many seconds after first ingest.
        #[arg(long)]
        ttl: Option<i64>,

        /// Chunk length in characters (default from `[chunking]`).
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared by consecutive chunks (default from `[chunking]`).
        #[arg(long)]
        chunk_overlap: Option<usize>,

        /// Extra metadata as `key=value`; repeatable.
        #[arg(long = "meta", value_parser = parse_key_value)]
        meta: Vec<(String, String)>,

        /// Descend into subdirectories.
        #[arg(long, short)]
        recursive: bool,
    },

    /// Search the memory.
    Query {
        /// The query text.
        query: String,

        /// Number of results (default from `[retrieval]`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Drop results whose weighted score is below this value.
        #[arg(long)]
        min_score: Option<f64>,

        /// Print the annotated context block instead of a table.
        #[arg(long, conflicts_with = "json")]
        context: bool,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show per-tier statistics.
    Stats {
        /// Print statistics as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove documents whose TTL has expired.
    Cleanup,

    /// Delete every document and vector in one tier.
    Clear {
        #[arg(value_parser = parse_tier)]
        tier: Tier,

        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Load the embedding model now.
    Warmup,
}

fn parse_tier(s: &str) -> Result<Tier, String> {
    s.parse().map_err(|e: MemoryError| e.to_string())
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Memory initialized at {}", cfg.storage.dir.display());
        }
        Commands::Ingest {
            paths,
            tier,
            ttl,
            chunk_size,
            chunk_overlap,
            meta,
            recursive,
        } => {
            let mut request = IngestRequest::from_config(tier, &cfg);
            request.ttl_seconds = ttl;
            if let Some(size) = chunk_size {
                request.chunk_size = size;
            }
            if let Some(overlap) = chunk_overlap {
                request.chunk_overlap = overlap;
            }
            for (key, value) in meta {
                request.metadata.insert(key, Value::String(value));
            }
            ingest::run_ingest(&cfg, &paths, recursive, request).await?;
        }
        Commands::Query {
            query,
            top_k,
            min_score,
            context,
            json,
        } => {
            retrieve::run_query(&cfg, &query, top_k, min_score, context, json).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
        Commands::Cleanup => {
            cleanup::run_cleanup(&cfg).await?;
        }
        Commands::Clear { tier, yes } => {
            cleanup::run_clear(&cfg, tier, yes).await?;
        }
        Commands::Warmup => {
            let service = MemoryService::open(&cfg).await?;
            service
                .warm_up()
                .await
                .context("Failed to load embedding model")?;
            let embeddings = service.embeddings();
            println!(
                "Embedding model ready: {} ({} dims)",
                embeddings.model_name(),
                embeddings.dims()
            );
        }
    }

    Ok(())
}
