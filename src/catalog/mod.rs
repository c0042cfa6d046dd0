//! The read-only catalog: `<root>/<yearMake>/<model>/[<subdirectory>/]<file>`.
//!
//! [`Catalog`] is the boundary every caller goes through. Each operation
//! validates its path segments against the [`Sandbox`] before touching the
//! filesystem, so request input never reaches `std::fs` unchecked.

pub(crate) mod enumerate;
mod node;
mod size;

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::archive::{ArchiveBuilder, ArchiveHandoff};
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::sandbox::{Sandbox, single_name};

pub use enumerate::{ChildEntry, WalkedEntry, list_children, list_subdirectories, walk_tree};
pub use node::{
    CatalogNode, DirectoryStructure, NodeKind, YEAR_MAKE_READ_ERROR, YearMakeGroup, node_order,
};
pub use size::{SizeAggregator, SizeTotals};

/// Sandboxed access to the catalog tree.
#[derive(Debug, Clone)]
pub struct Catalog {
    sandbox: Sandbox,
    sizer: SizeAggregator,
    archiver: ArchiveBuilder,
}

impl Catalog {
    /// Open the catalog described by `config`. The root must exist.
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let sandbox = Sandbox::new(&config.root)?;
        debug!(root = %sandbox.root().display(), "catalog opened");

        Ok(Self {
            sandbox,
            sizer: SizeAggregator::new(config.max_concurrent_walks.filter(|n| *n > 0)),
            archiver: ArchiveBuilder::new(&config.temp_dir),
        })
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Every year-make with its models.
    ///
    /// A year-make whose models cannot be read is kept with an error marker
    /// instead of failing the whole listing.
    pub async fn file_structure(&self) -> Result<DirectoryStructure> {
        let year_makes = self.year_makes().await?;
        let mut groups = Vec::with_capacity(year_makes.len());

        for year_make in year_makes {
            let dir = self.sandbox.join(&[year_make.as_str()])?;
            match list_subdirectories(&dir).await {
                Ok(models) => groups.push(YearMakeGroup::new(year_make, models)),
                Err(err) => {
                    warn!(year_make = %year_make, error = %err, "failed to read models");
                    groups.push(YearMakeGroup::unreadable(year_make));
                }
            }
        }

        Ok(DirectoryStructure::new(groups))
    }

    /// Year-make directories directly under the root, sorted.
    pub async fn year_makes(&self) -> Result<Vec<String>> {
        list_subdirectories(self.sandbox.root()).await
    }

    /// Model directories under `year_make`, sorted.
    pub async fn models(&self, year_make: &str) -> Result<Vec<String>> {
        single_name(year_make)?;
        let dir = self.directory(&[year_make]).await?;
        list_subdirectories(&dir).await
    }

    /// Every directory and file below a model, directories first.
    ///
    /// Directory nodes carry recursive byte and file totals.
    pub async fn files(
        &self,
        year_make: &str,
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CatalogNode>> {
        names(&[year_make, model])?;
        let model_dir = self.directory(&[year_make, model]).await?;
        let walked = walk_tree(model_dir, cancel.clone()).await?;

        let mut nodes = Vec::with_capacity(walked.len());
        for entry in walked {
            let modified = entry.metadata.modified().ok();
            if entry.is_dir {
                let totals = self.sizer.aggregate(&entry.path, cancel).await?;
                nodes.push(CatalogNode::directory(
                    &entry.relative,
                    modified,
                    totals.bytes,
                    totals.files,
                ));
            } else {
                nodes.push(CatalogNode::file(
                    &entry.relative,
                    modified,
                    entry.metadata.len(),
                ));
            }
        }

        nodes.sort_by(node_order);
        debug!(year_make, model, nodes = nodes.len(), "listed model");
        Ok(nodes)
    }

    /// Where a file would live, without checking that it exists.
    ///
    /// Still rejects `..` and absolute segments.
    pub fn file_path(
        &self,
        year_make: &str,
        model: &str,
        file_name: &str,
        subdirectory: Option<&str>,
    ) -> Result<PathBuf> {
        names(&[year_make, model, file_name])?;
        self.sandbox
            .join(&[year_make, model, subdirectory.unwrap_or_default(), file_name])
    }

    /// The canonical path of an existing regular file, ready to be served.
    pub async fn resolve_file(
        &self,
        year_make: &str,
        model: &str,
        file_name: &str,
        subdirectory: Option<&str>,
    ) -> Result<PathBuf> {
        names(&[year_make, model, file_name])?;
        let path = self.sandbox.validate(&[
            year_make,
            model,
            subdirectory.unwrap_or_default(),
            file_name,
        ])?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| CatalogError::io(&path, e))?;
        if !metadata.is_file() {
            return Err(CatalogError::NotAFile { path });
        }
        Ok(path)
    }

    /// Archive a directory given by its root-relative path, named
    /// `<dirName>.zip`.
    pub async fn create_zip_from_directory(
        &self,
        relative: &str,
        cancel: &CancellationToken,
    ) -> Result<ArchiveHandoff> {
        let dir = self.directory(&[relative]).await?;
        let name = archive_name(&dir);
        self.archiver.build_from_directory(dir, name, cancel).await
    }

    /// Archive one directory inside a model, named `<dirName>.zip`.
    pub async fn zip_model_directory(
        &self,
        year_make: &str,
        model: &str,
        directory: &str,
        cancel: &CancellationToken,
    ) -> Result<ArchiveHandoff> {
        names(&[year_make, model, directory])?;
        let dir = self.directory(&[year_make, model, directory]).await?;
        let name = archive_name(&dir);
        self.archiver.build_from_directory(dir, name, cancel).await
    }

    /// Archive a whole model, named `<yearMake>_<model>_all.zip`.
    pub async fn zip_model(
        &self,
        year_make: &str,
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<ArchiveHandoff> {
        names(&[year_make, model])?;
        let dir = self.directory(&[year_make, model]).await?;
        let name = format!("{year_make}_{model}_all.zip");
        self.archiver.build_from_directory(dir, name, cancel).await
    }

    /// Archive selected model files, named `<yearMake>_<model>_selected.zip`.
    ///
    /// See [`SelectionKey`](crate::SelectionKey) for the key format.
    pub async fn create_zip_from_files(
        &self,
        year_make: &str,
        model: &str,
        keys: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<ArchiveHandoff> {
        names(&[year_make, model])?;
        let model_dir = self.directory(&[year_make, model]).await?;
        let name = format!("{year_make}_{model}_selected.zip");
        debug!(year_make, model, keys = keys.len(), "building selection archive");
        self.archiver
            .build_from_selection(model_dir, keys, name, cancel)
            .await
    }

    /// Validate `segments` and require the result to be a directory.
    async fn directory(&self, segments: &[&str]) -> Result<PathBuf> {
        let path = self.sandbox.validate(segments)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| CatalogError::io(&path, e))?;
        if !metadata.is_dir() {
            return Err(CatalogError::NotADirectory { path });
        }
        Ok(path)
    }
}

fn names(names: &[&str]) -> Result<()> {
    for name in names {
        single_name(name)?;
    }
    Ok(())
}

fn archive_name(dir: &Path) -> String {
    let stem = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "catalog".to_string());
    format!("{stem}.zip")
}
