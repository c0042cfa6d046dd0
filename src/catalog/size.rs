//! Recursive directory size and file count.
//!
//! One blocking task is spawned per immediate child of the measured
//! directory. Tasks add into two shared atomic counters and are all joined
//! before the totals are read. Unreadable entries contribute nothing: a
//! best-effort figure is more useful to a listing than an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{CatalogError, Result};

/// Totals for one measured directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeTotals {
    pub bytes: u64,
    pub files: u64,
}

#[derive(Default)]
struct Counters {
    bytes: AtomicU64,
    files: AtomicU64,
}

impl Counters {
    fn add_file(&self, len: u64) {
        self.bytes.fetch_add(len, Ordering::Relaxed);
        self.files.fetch_add(1, Ordering::Relaxed);
    }

    fn totals(&self) -> SizeTotals {
        SizeTotals {
            bytes: self.bytes.load(Ordering::Relaxed),
            files: self.files.load(Ordering::Relaxed),
        }
    }
}

/// Measures directories by fanning out one task per child.
#[derive(Debug, Clone, Default)]
pub struct SizeAggregator {
    /// Shared across every request when a walk cap is configured.
    permits: Option<Arc<Semaphore>>,
}

impl SizeAggregator {
    pub fn new(max_concurrent_walks: Option<usize>) -> Self {
        Self {
            permits: max_concurrent_walks.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// Total bytes and regular-file count beneath `dir`.
    ///
    /// Returns zeros if `dir` itself cannot be listed. Fails only when
    /// `cancel` fires or a task dies.
    pub async fn aggregate(&self, dir: &Path, cancel: &CancellationToken) -> Result<SizeTotals> {
        let children = match read_children(dir).await {
            Ok(children) => children,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "cannot list directory for sizing");
                return Ok(SizeTotals::default());
            }
        };

        let counters = Arc::new(Counters::default());
        let mut tasks = JoinSet::new();

        for (path, is_dir) in children {
            let permit = match &self.permits {
                Some(permits) => {
                    let acquire = permits.clone().acquire_owned();
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(CatalogError::Cancelled),
                        permit = acquire => Some(
                            permit.map_err(|e| CatalogError::Task(e.to_string()))?,
                        ),
                    }
                }
                None => None,
            };

            let counters = counters.clone();
            let cancel = cancel.clone();
            tasks.spawn_blocking(move || {
                let _permit = permit;
                if is_dir {
                    walk_into(&path, &counters, &cancel);
                } else {
                    match std::fs::symlink_metadata(&path) {
                        Ok(meta) => counters.add_file(meta.len()),
                        Err(err) => {
                            debug!(path = %path.display(), error = %err, "skipping unreadable file")
                        }
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            joined?;
        }

        if cancel.is_cancelled() {
            return Err(CatalogError::Cancelled);
        }
        Ok(counters.totals())
    }
}

/// Immediate children that are directories or regular files.
async fn read_children(dir: &Path) -> std::io::Result<Vec<(PathBuf, bool)>> {
    let mut children = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if file_type.is_dir() || file_type.is_file() {
            children.push((entry.path(), file_type.is_dir()));
        }
    }
    Ok(children)
}

/// Depth-first walk adding every regular file under `dir`.
fn walk_into(dir: &Path, counters: &Counters, cancel: &CancellationToken) {
    for entry in WalkDir::new(dir).follow_links(false) {
        if cancel.is_cancelled() {
            return;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(path = %dir.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => counters.add_file(meta.len()),
            Err(err) => debug!(path = %entry.path().display(), error = %err, "skipping unreadable file"),
        }
    }
}
