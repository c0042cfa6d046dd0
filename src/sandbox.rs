//! Path containment for the catalog root.
//!
//! Every path that reaches the filesystem is built here. Requested segments
//! are checked lexically first (no `..`, no absolute or prefixed components),
//! then the joined candidate is canonicalized and must sit at or below the
//! canonical root. Canonicalization resolves symlinks, so a link that points
//! outside the root is rejected as a traversal.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{CatalogError, Result};

/// A fixed, canonical catalog root.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Canonicalize `root` once; it must exist and be a directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let canonical = root
            .canonicalize()
            .map_err(|e| CatalogError::io(root, e))?;
        if !canonical.is_dir() {
            return Err(CatalogError::NotADirectory { path: canonical });
        }
        Ok(Self { root: canonical })
    }

    /// The canonical root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join `segments` under the root without touching the filesystem.
    ///
    /// Empty segments are skipped; a segment may hold several
    /// `/`-separated components. Fails with `Traversal` on any `..`,
    /// root or prefix component.
    pub fn join<S: AsRef<str>>(&self, segments: &[S]) -> Result<PathBuf> {
        let mut candidate = self.root.clone();
        for segment in segments {
            let segment = segment.as_ref();
            for component in Path::new(segment).components() {
                match component {
                    Component::Normal(part) => candidate.push(part),
                    Component::CurDir => {}
                    Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                        return Err(CatalogError::Traversal {
                            path: PathBuf::from(segment),
                        });
                    }
                }
            }
        }
        Ok(candidate)
    }

    /// Resolve `segments` to a canonical path inside the root.
    pub fn validate<S: AsRef<str>>(&self, segments: &[S]) -> Result<PathBuf> {
        let candidate = self.join(segments)?;
        let canonical = candidate
            .canonicalize()
            .map_err(|e| CatalogError::io(&candidate, e))?;

        // Component-wise, so "/srv/catalog-evil" is not under "/srv/catalog".
        if !canonical.starts_with(&self.root) {
            debug!(path = %candidate.display(), resolved = %canonical.display(), "rejected escaping path");
            return Err(CatalogError::Traversal { path: candidate });
        }
        Ok(canonical)
    }
}

/// Check that `name` is exactly one plain path component.
///
/// Year-makes, models and model directories are single names. `..`, root
/// and prefix components fail with `Traversal`; anything else that is not
/// one normal component (separators, `.`, empty) fails with `InvalidName`.
pub fn single_name(name: &str) -> Result<&str> {
    let components: Vec<_> = Path::new(name).components().collect();
    if components
        .iter()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return Err(CatalogError::Traversal {
            path: PathBuf::from(name),
        });
    }
    match components.as_slice() {
        [Component::Normal(_)] if !name.contains(['/', '\\']) => Ok(name),
        _ => Err(CatalogError::InvalidName {
            name: name.to_string(),
        }),
    }
}

/// Render a relative path with `/` separators regardless of platform.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
