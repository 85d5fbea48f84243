//! # tiermem core
//!
//! Shared, runtime-agnostic logic for tiermem: the tier model, the
//! fixed-stride chunker, the vector store abstraction, tier-weighted
//! ranking, and the embedding trait.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. Storage backends and embedding providers
//! live in the `tiermem` app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod rank;
pub mod store;

pub use error::{MemoryError, Result};
pub use models::{RetrievedChunk, Tier};
