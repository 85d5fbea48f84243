//! Plain-text document loading.
//!
//! Format conversion (PDF, HTML, ...) happens upstream; the memory layer
//! only consumes UTF-8 text. [`DocumentSource`] is the seam for plugging in
//! another loader, [`PlainTextSource`] reads `.txt` and Markdown files from
//! disk.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use tiermem_core::models::content_hash;
use tiermem_core::MemoryError;

/// Extensions accepted by [`PlainTextSource`].
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

/// A loaded document, keyed by its canonical path.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Canonical path; the tracker's natural key.
    pub path: String,
    /// File name shown as the chunk's `source`.
    pub file_name: String,
    /// Lower-case extension without the dot.
    pub file_type: String,
    pub text: String,
    /// SHA-256 of the raw file bytes.
    pub content_hash: String,
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn load(&self, path: &Path) -> Result<LoadedDocument>;
}

/// Reads UTF-8 `.txt`, `.md` and `.markdown` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextSource;

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub fn is_supported(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension_of(path).as_str())
}

#[async_trait]
impl DocumentSource for PlainTextSource {
    async fn load(&self, path: &Path) -> Result<LoadedDocument> {
        let file_type = extension_of(path);
        if !is_supported(path) {
            return Err(MemoryError::InvalidInput(format!(
                "unsupported file type '{}': {}",
                file_type,
                path.display()
            ))
            .into());
        }

        let canonical = tokio::fs::canonicalize(path).await.map_err(|e| {
            MemoryError::InvalidInput(format!("cannot open {}: {}", path.display(), e))
        })?;
        let bytes = tokio::fs::read(&canonical)
            .await
            .with_context(|| format!("Failed to read {}", canonical.display()))?;
        let content_hash = content_hash(&bytes);
        let text = String::from_utf8(bytes).map_err(|_| {
            MemoryError::InvalidInput(format!("{} is not valid UTF-8", canonical.display()))
        })?;

        let file_name = canonical
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(LoadedDocument {
            path: canonical.to_string_lossy().into_owned(),
            file_name,
            file_type,
            text,
            content_hash,
        })
    }
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Expand CLI inputs into a list of files.
///
/// Files are passed through untouched (missing ones are reported later by
/// the ingest). Directories contribute their supported files, sorted;
/// subdirectories only when `recursive` is set. VCS and build directories
/// are skipped.
pub fn expand_paths(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let excludes = build_globset(&["**/.git/**", "**/target/**", "**/node_modules/**"])?;
    let mut files = Vec::new();

    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }

        let mut found = Vec::new();
        let max_depth = if recursive { usize::MAX } else { 1 };
        for entry in WalkDir::new(input).max_depth(max_depth) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(input).unwrap_or(path);
            if excludes.is_match(relative) || !is_supported(path) {
                continue;
            }
            found.push(path.to_path_buf());
        }
        if found.is_empty() {
            tracing::warn!(dir = %input.display(), "no supported files found in directory");
        }
        found.sort();
        files.extend(found);
    }

    if files.is_empty() {
        bail!("no input files given");
    }
    Ok(files)
}
