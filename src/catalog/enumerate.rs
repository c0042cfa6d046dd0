//! Directory listing primitives.
//!
//! Callers pass paths that have already been through the
//! [`Sandbox`](crate::Sandbox). Symbolic links are never followed: they are
//! left out of listings the same way the size aggregator and archive
//! builder leave them out.

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{CatalogError, Result};

/// An immediate child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Immediate directory and regular-file children of `dir`, sorted by name.
pub async fn list_children(dir: &Path) -> Result<Vec<ChildEntry>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| CatalogError::io(dir, e))?;

    let mut children = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CatalogError::io(dir, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| CatalogError::io(entry.path(), e))?;
        if !(file_type.is_dir() || file_type.is_file()) {
            debug!(path = %entry.path().display(), "skipping non-regular entry");
            continue;
        }
        children.push(ChildEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: file_type.is_dir(),
        });
    }

    children.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(children)
}

/// Names of the immediate subdirectories of `dir`, sorted.
pub async fn list_subdirectories(dir: &Path) -> Result<Vec<String>> {
    Ok(list_children(dir)
        .await?
        .into_iter()
        .filter(|child| child.is_dir)
        .map(|child| child.name)
        .collect())
}

/// One entry found by [`walk_tree`].
#[derive(Debug)]
pub struct WalkedEntry {
    /// Absolute path
    pub path: PathBuf,
    /// Path relative to the walked directory
    pub relative: PathBuf,
    pub is_dir: bool,
    pub metadata: Metadata,
}

/// Every directory and regular file below `dir`, excluding `dir` itself.
///
/// Any read error fails the whole walk.
pub async fn walk_tree(dir: PathBuf, cancel: CancellationToken) -> Result<Vec<WalkedEntry>> {
    tokio::task::spawn_blocking(move || walk_tree_blocking(&dir, &cancel)).await?
}

fn walk_tree_blocking(dir: &Path, cancel: &CancellationToken) -> Result<Vec<WalkedEntry>> {
    let mut walked = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).follow_links(false) {
        if cancel.is_cancelled() {
            return Err(CatalogError::Cancelled);
        }
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        let file_type = entry.file_type();
        if !(file_type.is_dir() || file_type.is_file()) {
            debug!(path = %entry.path().display(), "skipping non-regular entry");
            continue;
        }

        let metadata = entry.metadata().map_err(|e| walk_error(dir, e))?;
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(entry.file_name()));
        walked.push(WalkedEntry {
            path: entry.path().to_path_buf(),
            relative,
            is_dir: file_type.is_dir(),
            metadata,
        });
    }
    Ok(walked)
}

/// Convert a walk failure, keeping the path it happened at.
pub(crate) fn walk_error(root: &Path, err: walkdir::Error) -> CatalogError {
    let path = err.path().unwrap_or(root).to_path_buf();
    CatalogError::io(path, err.into())
}
