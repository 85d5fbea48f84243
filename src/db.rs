//! SQLite connection management.
//!
//! Both the metadata tracker (`metadata.sqlite`) and the vector
//! collections (`vectors.sqlite`) open their file through [`connect`].
//! WAL mode is enabled on every connection so retrieval can read while an
//! ingest or cleanup pass is writing.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Open (creating if needed) a pooled connection to the SQLite file at `path`.
///
/// Parent directories are created automatically.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create storage directory: {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", path.display()))?;

    Ok(pool)
}
