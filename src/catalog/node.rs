//! Catalog records returned to callers.
//!
//! These are projections of the filesystem taken at request time; nothing
//! here is stored between requests.

use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;
use std::cmp::Ordering;
use std::path::Path;
use std::time::SystemTime;

use crate::sandbox::slash_path;

/// Error marker recorded on a year-make whose models could not be read.
pub const YEAR_MAKE_READ_ERROR: &str = "Failed to read models";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Directory,
    File,
}

/// A directory or file below a model directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Bytes; recursive total for directories
    pub size: u64,
    /// 1 for files; recursive regular-file count for directories
    pub file_count: u64,
    /// RFC 3339 local time, empty when the platform has no mtime
    pub modified: String,
    /// Lower-cased with leading dot; empty for directories
    pub extension: String,
    pub is_downloadable: bool,
    /// Path of the containing directory relative to the model, "" at the top
    pub parent_directory: String,
    /// Path relative to the model
    pub full_path: String,
}

impl CatalogNode {
    /// Directory node; downloadable only when it holds any bytes.
    pub fn directory(relative: &Path, modified: Option<SystemTime>, size: u64, file_count: u64) -> Self {
        Self {
            name: file_name(relative),
            kind: NodeKind::Directory,
            size,
            file_count,
            modified: format_modified(modified),
            extension: String::new(),
            is_downloadable: size > 0,
            parent_directory: parent_of(relative),
            full_path: slash_path(relative),
        }
    }

    pub fn file(relative: &Path, modified: Option<SystemTime>, size: u64) -> Self {
        let extension = relative
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        Self {
            name: file_name(relative),
            kind: NodeKind::File,
            size,
            file_count: 1,
            modified: format_modified(modified),
            extension,
            is_downloadable: true,
            parent_directory: parent_of(relative),
            full_path: slash_path(relative),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// Directories first, then files; by name within each kind.
pub fn node_order(a: &CatalogNode, b: &CatalogNode) -> Ordering {
    match (a.kind, b.kind) {
        (NodeKind::Directory, NodeKind::File) => Ordering::Less,
        (NodeKind::File, NodeKind::Directory) => Ordering::Greater,
        _ => a.name.cmp(&b.name).then_with(|| a.full_path.cmp(&b.full_path)),
    }
}

/// A year-make and the models beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearMakeGroup {
    pub year_make: String,
    pub models: Vec<String>,
    pub model_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl YearMakeGroup {
    pub fn new(year_make: impl Into<String>, models: Vec<String>) -> Self {
        Self {
            year_make: year_make.into(),
            model_count: models.len(),
            models,
            error: None,
        }
    }

    /// A group whose models could not be listed.
    pub fn unreadable(year_make: impl Into<String>) -> Self {
        Self {
            year_make: year_make.into(),
            models: Vec::new(),
            model_count: 0,
            error: Some(YEAR_MAKE_READ_ERROR.to_string()),
        }
    }
}

/// Every year-make with its models, plus totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryStructure {
    pub total_year_makes: usize,
    pub total_models: usize,
    pub structure: Vec<YearMakeGroup>,
}

impl DirectoryStructure {
    pub fn new(structure: Vec<YearMakeGroup>) -> Self {
        Self {
            total_year_makes: structure.len(),
            total_models: structure.iter().map(|g| g.model_count).sum(),
            structure,
        }
    }
}

fn file_name(relative: &Path) -> String {
    relative
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parent_of(relative: &Path) -> String {
    relative.parent().map(slash_path).unwrap_or_default()
}

fn format_modified(modified: Option<SystemTime>) -> String {
    modified
        .map(|t| DateTime::<Local>::from(t).to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}
