//! SQLite-backed [`VectorStore`].
//!
//! Each tier is its own table in `vectors.sqlite` (see
//! [`migrate::vector_table`](crate::migrate::vector_table)); embeddings are
//! little-endian f32 BLOBs. The `collections` table pins each tier's
//! dimensionality on first write.
//!
//! Queries are a brute-force cosine scan over a single `SELECT`, which
//! SQLite serves from one read snapshot even while a writer is active.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{Row, SqliteConnection, SqlitePool};

use tiermem_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use tiermem_core::store::{check_entry_dims, Neighbor, VectorEntry, VectorStore};
use tiermem_core::Tier;

use crate::migrate::vector_table;

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Wrap a pool whose schema has already been migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn pinned_dims(conn: &mut SqliteConnection, tier: Tier) -> Result<Option<usize>> {
    let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM collections WHERE tier = ?")
        .bind(tier.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(dims.map(|d| d as usize))
}

fn parse_metadata(id: &str, json: &str) -> Result<Map<String, Value>> {
    serde_json::from_str(json).with_context(|| format!("corrupt metadata for vector '{}'", id))
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, tier: Tier, entries: &[VectorEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        let pinned = pinned_dims(&mut tx, tier).await?;
        let dims = check_entry_dims(pinned, entries)
            .with_context(|| format!("rejected write to tier '{}'", tier))?;
        if let (None, Some(d)) = (pinned, dims) {
            sqlx::query("INSERT INTO collections (tier, dims, created_at) VALUES (?, ?, ?)")
                .bind(tier.as_str())
                .bind(d as i64)
                .bind(chrono::Utc::now().timestamp())
                .execute(&mut *tx)
                .await?;
        }

        let sql = format!(
            r#"
            INSERT INTO {} (id, text, metadata_json, embedding)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                metadata_json = excluded.metadata_json,
                embedding = excluded.embedding
            "#,
            vector_table(tier)
        );
        for e in entries {
            sqlx::query(&sql)
                .bind(&e.id)
                .bind(&e.text)
                .bind(serde_json::to_string(&e.metadata)?)
                .bind(vec_to_blob(&e.vector))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, tier: Tier, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.pool.acquire().await?;
        let Some(dims) = pinned_dims(&mut conn, tier).await? else {
            return Ok(Vec::new());
        };
        if vector.len() != dims {
            bail!(
                "query vector has {} dimensions, tier '{}' expects {}",
                vector.len(),
                tier,
                dims
            );
        }

        let rows = sqlx::query(&format!(
            "SELECT id, text, metadata_json, embedding FROM {}",
            vector_table(tier)
        ))
        .fetch_all(&mut *conn)
        .await?;

        let mut hits: Vec<Neighbor> = rows
            .iter()
            .map(|row| {
                let id: String = row.get("id");
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                let metadata_json: String = row.get("metadata_json");
                Ok(Neighbor {
                    metadata: parse_metadata(&id, &metadata_json)?,
                    id,
                    text: row.get("text"),
                    distance: cosine_distance(vector, &stored) as f64,
                })
            })
            .collect::<Result<_>>()?;

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
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!("DELETE FROM {} WHERE id = ?", vector_table(tier));
        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for id in ids {
            removed += sqlx::query(&sql)
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed as usize)
    }

    async fn count(&self, tier: Tier) -> Result<usize> {
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", vector_table(tier)))
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn clear(&self, tier: Tier) -> Result<usize> {
        let result = sqlx::query(&format!("DELETE FROM {}", vector_table(tier)))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn dims(&self, tier: Tier) -> Result<Option<usize>> {
        let mut conn = self.pool.acquire().await?;
        pinned_dims(&mut conn, tier).await
    }

    async fn ids(&self, tier: Tier) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar(&format!(
            "SELECT id FROM {} ORDER BY id",
            vector_table(tier)
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
