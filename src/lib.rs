//! # tiermem
//!
//! A local-first long-term memory layer for conversational agents.
//!
//! tiermem ingests plain-text documents, splits them into overlapping
//! passages, embeds them, and stores the vectors in one of three importance
//! tiers. Queries search every tier and rank hits by similarity times the
//! tier's weight; documents with a TTL are removed once it runs out.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌───────────┐   ┌──────────────────┐
//! │  Loader  │──▶│ Chunker │──▶│ Embedding │──▶│ vectors.sqlite   │
//! │ .txt/.md │   │ (core)  │   │  service  │   │ core/ref/ephem.  │
//! └──────────┘   └─────────┘   └───────────┘   └────────┬─────────┘
//!                                                        │
//!           ┌──────────────────┐   ┌───────────┐         │
//!           │ metadata.sqlite  │◀──│  Memory   │◀────────┘
//!           │ documents/chunks │   │  Service  │──▶ ranked results
//!           └──────────────────┘   └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite connection pools |
//! | [`migrate`] | Schema migrations for both databases |
//! | [`tracker`] | Document and chunk metadata |
//! | [`vector_store`] | SQLite-backed tiered vector store |
//! | [`embedding`] | Embedding backends and the guarded service |
//! | [`loader`] | Plain-text document loading |
//! | [`service`] | The memory facade |
//! | [`ingest`] | Batch ingestion |
//! | [`retrieve`] | Tier-weighted retrieval |
//! | [`cleanup`] | Expiry, tier clearing, recovery |
//! | [`stats`] | `tmem stats` output |

pub mod cleanup;
pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod loader;
pub mod migrate;
pub mod retrieve;
pub mod service;
pub mod stats;
pub mod tracker;
pub mod vector_store;

pub use service::{MemoryService, MemoryStats};
pub use tiermem_core::{MemoryError, RetrievedChunk, Tier};
