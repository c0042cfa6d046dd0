//! Catalog configuration.

use serde::Deserialize;
use std::path::PathBuf;

/// Root directory used when nothing else is configured.
pub const DEFAULT_ROOT: &str = "DiscoveryDrawings";

/// Settings for a [`Catalog`](crate::Catalog).
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Directory every catalog path is confined to
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Shared directory where archives are staged
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Cap on concurrently running size-aggregation walks across all
    /// requests. `None` keeps one walk per directory child with no cap.
    #[serde(default)]
    pub max_concurrent_walks: Option<usize>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            temp_dir: default_temp_dir(),
            max_concurrent_walks: None,
        }
    }
}

impl CatalogConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn with_max_concurrent_walks(mut self, limit: Option<usize>) -> Self {
        // A zero-permit pool would never make progress.
        self.max_concurrent_walks = limit.filter(|n| *n > 0);
        self
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT)
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir()
}
