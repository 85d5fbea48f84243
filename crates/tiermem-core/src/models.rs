//! Core data models: memory tiers and retrieval results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::MemoryError;

/// Importance partition of the memory.
///
/// Each tier is an independent vector collection. The weight multiplies
/// raw similarity at query time so that `core` passages outrank
/// equally-similar `ephemeral` ones.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Core,
    #[default]
    Reference,
    Ephemeral,
}

impl Tier {
    /// All tiers in retrieval fan-out order.
    pub const ALL: [Tier; 3] = [Tier::Core, Tier::Reference, Tier::Ephemeral];

    pub fn weight(self) -> f64 {
        match self {
            Tier::Core => 1.5,
            Tier::Reference => 1.0,
            Tier::Ephemeral => 0.7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Core => "core",
            Tier::Reference => "reference",
            Tier::Ephemeral => "ephemeral",
        }
    }

    /// Position in [`Tier::ALL`]; used to index per-tier arrays.
    pub fn index(self) -> usize {
        match self {
            Tier::Core => 0,
            Tier::Reference => 1,
            Tier::Ephemeral => 2,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(Tier::Core),
            "reference" => Ok(Tier::Reference),
            "ephemeral" => Ok(Tier::Ephemeral),
            other => Err(MemoryError::UnknownTier(other.to_string())),
        }
    }
}

/// A ranked passage returned by retrieval.
///
/// `score == base_score * weight`, where `base_score = 1 - cosine distance`
/// and `weight` is the tier weight at query time.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub text: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub tier: Tier,
    pub score: f64,
    pub base_score: f64,
    pub weight: f64,
}

impl RetrievedChunk {
    /// Human-readable origin of the chunk (`metadata.source`), if recorded.
    pub fn source(&self) -> &str {
        self.metadata
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
    }
}

/// SHA-256 hex digest of raw content bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
