//! Error types for catalog and archive operations.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::zip::ZipError;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors surfaced by the catalog, sandbox and archive builder.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The requested path resolves outside the catalog root.
    #[error("path escapes the catalog root: {path}")]
    Traversal { path: PathBuf },

    /// The target directory or file does not exist.
    #[error("not found: {path}")]
    NotFound { path: PathBuf },

    /// A directory was found where a regular file was expected.
    #[error("not a file: {path}")]
    NotAFile { path: PathBuf },

    /// A year-make, model or directory argument that is not a single name.
    #[error("not a single path component: {name:?}")]
    InvalidName { name: String },

    /// A file was found where a directory was expected.
    #[error("not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("zip error: {0}")]
    Zip(#[from] ZipError),

    /// The operation observed its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// A blocking task panicked or was aborted before reporting a result.
    #[error("background task failed: {0}")]
    Task(String),
}

impl CatalogError {
    /// Classify an I/O error raised while touching `path`.
    ///
    /// `NotFound` is promoted to its own variant so callers can tell a
    /// missing catalog entry from a permission or disk failure.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if source.kind() == io::ErrorKind::NotFound {
            CatalogError::NotFound { path }
        } else {
            CatalogError::Io { path, source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound { .. })
    }

    pub fn is_traversal(&self) -> bool {
        matches!(self, CatalogError::Traversal { .. })
    }
}

impl From<tokio::task::JoinError> for CatalogError {
    fn from(err: tokio::task::JoinError) -> Self {
        CatalogError::Task(err.to_string())
    }
}
