//! Schema migrations for the metadata and vector databases.
//!
//! Every statement is `CREATE ... IF NOT EXISTS`, so running the
//! migrations repeatedly (`tmem init`, or on every open) is safe.

use anyhow::Result;
use sqlx::SqlitePool;

use tiermem_core::Tier;

use crate::config::Config;
use crate::db;

/// Create the `documents` and `chunks` tables used by the tracker.
pub async fn migrate_metadata(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT NOT NULL UNIQUE,
            file_hash TEXT NOT NULL,
            tier TEXT NOT NULL,
            ttl_seconds INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            pending_delete INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // No UNIQUE(document_id, chunk_index): replaced chunks linger as
    // pending rows until their vectors are gone.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            chunk_id TEXT PRIMARY KEY,
            document_id INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            tier TEXT NOT NULL,
            last_accessed INTEGER,
            access_count INTEGER NOT NULL DEFAULT 0,
            pending_delete INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_pending ON chunks(pending_delete)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_tier ON documents(tier)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_ttl ON documents(ttl_seconds) \
         WHERE ttl_seconds IS NOT NULL",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the `collections` table and one vector table per tier.
pub async fn migrate_vectors(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            tier TEXT PRIMARY KEY,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for tier in Tier::ALL {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{{}}',
                embedding BLOB NOT NULL
            )
            "#,
            vector_table(tier)
        ))
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Table holding the vectors of `tier`.
pub fn vector_table(tier: Tier) -> &'static str {
    match tier {
        Tier::Core => "vectors_core",
        Tier::Reference => "vectors_reference",
        Tier::Ephemeral => "vectors_ephemeral",
    }
}

/// Create both databases under `[storage].dir` and run all migrations.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let meta = db::connect(&config.storage.metadata_db()).await?;
    migrate_metadata(&meta).await?;
    meta.close().await;

    let vectors = db::connect(&config.storage.vector_db()).await?;
    migrate_vectors(&vectors).await?;
    vectors.close().await;

    Ok(())
}
