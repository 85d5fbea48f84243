//! Durable document and chunk metadata (`metadata.sqlite`).
//!
//! The tracker records, per file path, the content hash, tier, TTL and
//! timestamps of the document, and per chunk its owning document, position,
//! the tier its vector lives in, and access statistics.
//!
//! # Deletion protocol
//!
//! Deleting vectors and tracker rows cannot share a transaction because they
//! live in different databases. Every delete therefore goes through three
//! steps: mark the rows `pending_delete`, remove the vectors, then remove the
//! rows. A crash between steps leaves pending rows behind, which
//! [`MemoryService::recover_pending_deletes`](crate::service::MemoryService::recover_pending_deletes)
//! finishes on the next open.
//!
//! # Errors
//!
//! [`register_document`](MetadataTracker::register_document) and
//! [`compute_file_hash`] return [`MemoryError`] so a missing file is
//! reported as `InvalidInput`. Everything else returns `anyhow::Result`.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;

use tiermem_core::models::content_hash;
use tiermem_core::{MemoryError, Tier};

use crate::{db, migrate};

/// What [`MetadataTracker::register_document`] did with a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// First time this path was seen.
    Created,
    /// Known path, new hash: the document's chunks must be replaced.
    ContentChanged,
    /// Known path, same hash: only tier/TTL/metadata were updated.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub document_id: i64,
    pub outcome: RegistrationOutcome,
    /// Tier before this registration; `None` for a new document.
    pub previous_tier: Option<Tier>,
    pub file_hash: String,
}

/// A row of the `documents` table.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub file_path: String,
    pub file_hash: String,
    pub tier: Tier,
    pub ttl_seconds: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub metadata: Map<String, Value>,
    pub pending_delete: bool,
}

/// Where a chunk's vector lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkRef {
    pub chunk_id: String,
    pub document_id: i64,
    pub chunk_index: i64,
    pub tier: Tier,
}

/// Access statistics of one chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkStats {
    pub chunk_id: String,
    pub document_id: i64,
    pub chunk_index: i64,
    pub tier: Tier,
    pub last_accessed: Option<i64>,
    pub access_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpiredDocument {
    pub document_id: i64,
    pub file_path: String,
    pub tier: Tier,
    pub created_at: i64,
    pub ttl_seconds: i64,
    /// Every chunk row of the document, ordered by position.
    pub chunks: Vec<ChunkRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackerStats {
    /// Documents per tier; all three tiers are always present.
    pub document_counts: BTreeMap<String, i64>,
    pub total_documents: i64,
    /// Live (not pending) chunk rows.
    pub total_chunks: i64,
    pub expired_documents: i64,
    /// Document and chunk rows still waiting for deletion.
    pub pending_deletes: i64,
}

/// One document's worth of an ingest batch, committed by
/// [`MetadataTracker::commit_ingest`].
#[derive(Debug, Clone)]
pub struct IngestEntry {
    pub file_path: String,
    pub file_hash: String,
    pub tier: Tier,
    pub ttl_seconds: Option<i64>,
    pub metadata: Map<String, Value>,
    /// Mark the document's current chunk rows pending before adding new ones.
    pub replace_chunks: bool,
    /// New chunk ids in position order. Empty for metadata-only updates.
    pub chunk_ids: Vec<String>,
}

pub struct MetadataTracker {
    pool: SqlitePool,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn tracker_err(e: impl Into<anyhow::Error>) -> MemoryError {
    MemoryError::Tracker(e.into())
}

/// SHA-256 hex digest of the file at `path`.
///
/// A missing or unreadable file is [`MemoryError::InvalidInput`].
pub async fn compute_file_hash(path: &Path) -> Result<String, MemoryError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        MemoryError::InvalidInput(format!("cannot read {}: {}", path.display(), e))
    })?;
    Ok(content_hash(&bytes))
}

fn document_from_row(row: &SqliteRow) -> Result<DocumentRecord> {
    let tier: String = row.get("tier");
    let metadata_json: String = row.get("metadata_json");
    let id: i64 = row.get("id");
    Ok(DocumentRecord {
        id,
        file_path: row.get("file_path"),
        file_hash: row.get("file_hash"),
        tier: tier.parse()?,
        ttl_seconds: row.get("ttl_seconds"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        metadata: serde_json::from_str(&metadata_json)
            .with_context(|| format!("corrupt metadata for document {}", id))?,
        pending_delete: row.get("pending_delete"),
    })
}

fn chunk_ref_from_row(row: &SqliteRow) -> Result<ChunkRef> {
    let tier: String = row.get("tier");
    Ok(ChunkRef {
        chunk_id: row.get("chunk_id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        tier: tier.parse()?,
    })
}

struct DocumentUpsert<'a> {
    file_path: &'a str,
    file_hash: &'a str,
    tier: Tier,
    ttl_seconds: Option<i64>,
    metadata_json: String,
    now: i64,
}

/// Insert or update one document row. `created_at` is never changed on
/// update; `updated_at` only moves when the hash does.
async fn upsert_document(
    conn: &mut SqliteConnection,
    doc: &DocumentUpsert<'_>,
) -> Result<Registration> {
    let existing = sqlx::query("SELECT id, file_hash, tier FROM documents WHERE file_path = ?")
        .bind(doc.file_path)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = existing else {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (file_path, file_hash, tier, ttl_seconds,
                                   created_at, updated_at, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(doc.file_path)
        .bind(doc.file_hash)
        .bind(doc.tier.as_str())
        .bind(doc.ttl_seconds)
        .bind(doc.now)
        .bind(doc.now)
        .bind(&doc.metadata_json)
        .execute(&mut *conn)
        .await?;

        tracing::info!(path = doc.file_path, tier = %doc.tier, "document registered");
        return Ok(Registration {
            document_id: result.last_insert_rowid(),
            outcome: RegistrationOutcome::Created,
            previous_tier: None,
            file_hash: doc.file_hash.to_string(),
        });
    };

    let id: i64 = row.get("id");
    let old_hash: String = row.get("file_hash");
    let old_tier: String = row.get("tier");
    let previous_tier: Tier = old_tier.parse()?;

    let outcome = if old_hash != doc.file_hash {
        sqlx::query(
            r#"
            UPDATE documents
            SET file_hash = ?, tier = ?, ttl_seconds = ?, metadata_json = ?,
                updated_at = ?, pending_delete = 0
            WHERE id = ?
            "#,
        )
        .bind(doc.file_hash)
        .bind(doc.tier.as_str())
        .bind(doc.ttl_seconds)
        .bind(&doc.metadata_json)
        .bind(doc.now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        tracing::info!(path = doc.file_path, document_id = id, "document content changed");
        RegistrationOutcome::ContentChanged
    } else {
        sqlx::query(
            r#"
            UPDATE documents
            SET tier = ?, ttl_seconds = ?, metadata_json = ?, pending_delete = 0
            WHERE id = ?
            "#,
        )
        .bind(doc.tier.as_str())
        .bind(doc.ttl_seconds)
        .bind(&doc.metadata_json)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        RegistrationOutcome::Unchanged
    };

    Ok(Registration {
        document_id: id,
        outcome,
        previous_tier: Some(previous_tier),
        file_hash: doc.file_hash.to_string(),
    })
}

async fn insert_chunks(
    conn: &mut SqliteConnection,
    document_id: i64,
    tier: Tier,
    chunk_ids: &[String],
) -> Result<()> {
    for (i, chunk_id) in chunk_ids.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO chunks (chunk_id, document_id, chunk_index, tier)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(chunk_id)
        .bind(document_id)
        .bind(i as i64)
        .bind(tier.as_str())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

impl MetadataTracker {
    /// Open (creating and migrating if needed) the tracker database.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::migrate_metadata(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap a pool whose schema has already been migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Register or update the document at `path`.
    ///
    /// Hashes the file first; nothing is written if it can't be read.
    pub async fn register_document(
        &self,
        path: &str,
        tier: Tier,
        ttl_seconds: Option<i64>,
        metadata: &Map<String, Value>,
    ) -> Result<Registration, MemoryError> {
        let file_hash = compute_file_hash(Path::new(path)).await?;
        let metadata_json = serde_json::to_string(metadata).map_err(tracker_err)?;

        let mut tx = self.pool.begin().await.map_err(tracker_err)?;
        let reg = upsert_document(
            &mut tx,
            &DocumentUpsert {
                file_path: path,
                file_hash: &file_hash,
                tier,
                ttl_seconds,
                metadata_json,
                now: now(),
            },
        )
        .await
        .map_err(MemoryError::Tracker)?;
        tx.commit().await.map_err(tracker_err)?;
        Ok(reg)
    }

    /// Tie `chunk_ids` (in position order) to a document. Ids already
    /// registered are left as they are.
    pub async fn register_chunks(
        &self,
        document_id: i64,
        tier: Tier,
        chunk_ids: &[String],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_chunks(&mut tx, document_id, tier, chunk_ids).await?;
        tx.commit().await?;
        tracing::debug!(document_id, count = chunk_ids.len(), "chunks registered");
        Ok(())
    }

    /// Register every document of an ingest batch in one transaction.
    ///
    /// Returns one [`Registration`] per entry, in order.
    pub async fn commit_ingest(&self, entries: &[IngestEntry]) -> Result<Vec<Registration>> {
        let now = now();
        let mut tx = self.pool.begin().await?;
        let mut registrations = Vec::with_capacity(entries.len());

        for e in entries {
            let reg = upsert_document(
                &mut tx,
                &DocumentUpsert {
                    file_path: &e.file_path,
                    file_hash: &e.file_hash,
                    tier: e.tier,
                    ttl_seconds: e.ttl_seconds,
                    metadata_json: serde_json::to_string(&e.metadata)?,
                    now,
                },
            )
            .await?;

            if e.replace_chunks {
                sqlx::query(
                    "UPDATE chunks SET pending_delete = 1 \
                     WHERE document_id = ? AND pending_delete = 0",
                )
                .bind(reg.document_id)
                .execute(&mut *tx)
                .await?;
            }
            insert_chunks(&mut tx, reg.document_id, e.tier, &e.chunk_ids).await?;
            registrations.push(reg);
        }

        tx.commit().await?;
        Ok(registrations)
    }

    pub async fn track_access(&self, chunk_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE chunks SET last_accessed = ?, access_count = access_count + 1 \
             WHERE chunk_id = ?",
        )
        .bind(now())
        .bind(chunk_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// [`track_access`](Self::track_access) for a whole result list, in one
    /// transaction.
    pub async fn track_access_many(&self, chunk_ids: &[String]) -> Result<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        let ts = now();
        let mut tx = self.pool.begin().await?;
        for id in chunk_ids {
            sqlx::query(
                "UPDATE chunks SET last_accessed = ?, access_count = access_count + 1 \
                 WHERE chunk_id = ?",
            )
            .bind(ts)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn find_document(&self, path: &str) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query("SELECT * FROM documents WHERE file_path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    pub async fn get_document_tier(&self, path: &str) -> Result<Option<Tier>> {
        let tier: Option<String> =
            sqlx::query_scalar("SELECT tier FROM documents WHERE file_path = ?")
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;
        Ok(tier.map(|t| t.parse::<Tier>()).transpose()?)
    }

    /// Tier the chunk's vector was written to.
    pub async fn get_chunk_tier(&self, chunk_id: &str) -> Result<Option<Tier>> {
        let tier: Option<String> = sqlx::query_scalar("SELECT tier FROM chunks WHERE chunk_id = ?")
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tier.map(|t| t.parse::<Tier>()).transpose()?)
    }

    pub async fn chunk_stats(&self, chunk_id: &str) -> Result<Option<ChunkStats>> {
        let row = sqlx::query("SELECT * FROM chunks WHERE chunk_id = ?")
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let tier: String = row.get("tier");
        Ok(Some(ChunkStats {
            chunk_id: row.get("chunk_id"),
            document_id: row.get("document_id"),
            chunk_index: row.get("chunk_index"),
            tier: tier.parse()?,
            last_accessed: row.get("last_accessed"),
            access_count: row.get("access_count"),
        }))
    }

    /// Live chunks of a document, by position.
    pub async fn chunk_refs(&self, document_id: i64) -> Result<Vec<ChunkRef>> {
        let rows = sqlx::query(
            "SELECT chunk_id, document_id, chunk_index, tier FROM chunks \
             WHERE document_id = ? AND pending_delete = 0 ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_ref_from_row).collect()
    }

    /// Every chunk row of a document, pending ones included.
    pub async fn all_chunk_refs(&self, document_id: i64) -> Result<Vec<ChunkRef>> {
        let rows = sqlx::query(
            "SELECT chunk_id, document_id, chunk_index, tier FROM chunks \
             WHERE document_id = ? ORDER BY chunk_index, chunk_id",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_ref_from_row).collect()
    }

    pub async fn documents_in_tier(&self, tier: Tier) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query("SELECT * FROM documents WHERE tier = ? ORDER BY id")
            .bind(tier.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(document_from_row).collect()
    }

    /// Documents whose TTL has run out as of now.
    pub async fn get_expired_documents(&self) -> Result<Vec<ExpiredDocument>> {
        self.get_expired_documents_at(now()).await
    }

    /// Documents with `now - created_at > ttl_seconds`, each with all of
    /// its chunk rows.
    pub async fn get_expired_documents_at(&self, now: i64) -> Result<Vec<ExpiredDocument>> {
        let rows = sqlx::query(
            r#"
            SELECT id, file_path, tier, created_at, ttl_seconds
            FROM documents
            WHERE ttl_seconds IS NOT NULL
              AND (? - created_at) > ttl_seconds
            ORDER BY id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut expired = Vec::with_capacity(rows.len());
        for row in rows {
            let document_id: i64 = row.get("id");
            let tier: String = row.get("tier");
            expired.push(ExpiredDocument {
                document_id,
                file_path: row.get("file_path"),
                tier: tier.parse()?,
                created_at: row.get("created_at"),
                ttl_seconds: row.get("ttl_seconds"),
                chunks: self.all_chunk_refs(document_id).await?,
            });
        }
        Ok(expired)
    }

    /// First deletion step: flag a document and all of its chunk rows.
    pub async fn mark_document_pending(&self, document_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE documents SET pending_delete = 1 WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE chunks SET pending_delete = 1 WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Mark a document and every chunk row it owns pending, but only while
    /// the document still lives in `tier` and, given `expired_at`, is still
    /// expired at that time.
    ///
    /// Returns the claimed chunk rows in position order, or `None` when the
    /// document is gone, was moved, or had its TTL refreshed. The check, the
    /// mark and the read happen in one transaction, so an ingest committing
    /// concurrently is seen either entirely or not at all.
    pub async fn claim_document(
        &self,
        document_id: i64,
        tier: Tier,
        expired_at: Option<i64>,
    ) -> Result<Option<Vec<ChunkRef>>> {
        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query(
            r#"
            UPDATE documents SET pending_delete = 1
            WHERE id = ? AND tier = ?
              AND (? IS NULL OR (ttl_seconds IS NOT NULL AND (? - created_at) > ttl_seconds))
            "#,
        )
        .bind(document_id)
        .bind(tier.as_str())
        .bind(expired_at)
        .bind(expired_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if claimed == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query("UPDATE chunks SET pending_delete = 1 WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        let rows = sqlx::query(
            "SELECT chunk_id, document_id, chunk_index, tier FROM chunks \
             WHERE document_id = ? ORDER BY chunk_index, chunk_id",
        )
        .bind(document_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let chunks = rows.iter().map(chunk_ref_from_row).collect::<Result<_>>()?;
        Ok(Some(chunks))
    }

    /// [`delete_document`](Self::delete_document) for a claimed document.
    ///
    /// Nothing is deleted unless the document is still pending and still in
    /// `tier`; an ingest that re-registered it in the meantime clears the
    /// pending flag. Returns whether the rows were removed.
    pub async fn delete_claimed_document(&self, document_id: i64, tier: Tier) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM chunks
            WHERE document_id = ?
              AND EXISTS (SELECT 1 FROM documents
                          WHERE id = ? AND tier = ? AND pending_delete = 1)
            "#,
        )
        .bind(document_id)
        .bind(document_id)
        .bind(tier.as_str())
        .execute(&mut *tx)
        .await?;
        let removed = sqlx::query(
            "DELETE FROM documents WHERE id = ? AND tier = ? AND pending_delete = 1",
        )
        .bind(document_id)
        .bind(tier.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;

        if removed > 0 {
            tracing::info!(document_id, tier = %tier, "document deleted from tracker");
        }
        Ok(removed > 0)
    }

    pub async fn pending_chunks(&self) -> Result<Vec<ChunkRef>> {
        let rows = sqlx::query(
            "SELECT chunk_id, document_id, chunk_index, tier FROM chunks \
             WHERE pending_delete = 1 ORDER BY document_id, chunk_index",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_ref_from_row).collect()
    }

    pub async fn pending_documents(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT id FROM documents WHERE pending_delete = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Ids of every chunk row, live or pending, whose vector lives in `tier`.
    pub async fn chunk_ids_in_tier(&self, tier: Tier) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT chunk_id FROM chunks WHERE tier = ? ORDER BY chunk_id")
            .bind(tier.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Remove chunk rows whose vectors are already gone.
    pub async fn purge_chunks(&self, chunk_ids: &[String]) -> Result<u64> {
        if chunk_ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for id in chunk_ids {
            removed += sqlx::query("DELETE FROM chunks WHERE chunk_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    /// Remove every chunk row whose vector lived in `tier`.
    pub async fn purge_tier_chunks(&self, tier: Tier) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE tier = ?")
            .bind(tier.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete a document's chunk rows, then the document row.
    pub async fn delete_document(&self, document_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!(document_id, "document deleted from tracker");
        Ok(())
    }

    pub async fn get_stats(&self) -> Result<TrackerStats> {
        self.get_stats_at(now()).await
    }

    async fn get_stats_at(&self, now: i64) -> Result<TrackerStats> {
        let mut document_counts: BTreeMap<String, i64> = Tier::ALL
            .iter()
            .map(|t| (t.as_str().to_string(), 0))
            .collect();
        let rows = sqlx::query("SELECT tier, COUNT(*) AS n FROM documents GROUP BY tier")
            .fetch_all(&self.pool)
            .await?;
        for row in &rows {
            document_counts.insert(row.get("tier"), row.get("n"));
        }
        let total_documents: i64 = document_counts.values().sum();

        let total_chunks: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE pending_delete = 0")
                .fetch_one(&self.pool)
                .await?;

        let expired_documents: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents \
             WHERE ttl_seconds IS NOT NULL AND (? - created_at) > ttl_seconds",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let pending_deletes: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM documents WHERE pending_delete = 1) \
                  + (SELECT COUNT(*) FROM chunks WHERE pending_delete = 1)",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(TrackerStats {
            document_counts,
            total_documents,
            total_chunks,
            expired_documents,
            pending_deletes,
        })
    }
}
