//! # catzip
//!
//! Read-only access to a catalog of vehicle drawings laid out as
//! `<root>/<yearMake>/<model>/[<subdirectory>/]<file>`, with on-demand zip
//! archives of directories or hand-picked files.
//!
//! Every path a caller supplies is confined to the catalog root by the
//! [`Sandbox`]. Archives are written to temporary files and handed to the
//! caller, who deletes them after sending.
//!
//! ## Example
//!
//! ```no_run
//! use catzip::{Catalog, CatalogConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let catalog = Catalog::new(&CatalogConfig::new("DiscoveryDrawings"))?;
//!
//!     for node in catalog.files("2020-Ford", "F150", &CancellationToken::new()).await? {
//!         println!("{} ({} bytes)", node.full_path, node.size);
//!     }
//!
//!     let archive = catalog.zip_model("2020-Ford", "F150", &CancellationToken::new()).await?;
//!     println!("{} -> {}", archive.download_name, archive.path.display());
//!     archive.discard().await?;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod sandbox;
pub mod zip;

pub use archive::{ArchiveBuilder, ArchiveHandoff, SelectionKey};
pub use catalog::{
    Catalog, CatalogNode, DirectoryStructure, NodeKind, SizeAggregator, SizeTotals,
    YearMakeGroup,
};
pub use cli::Cli;
pub use config::CatalogConfig;
pub use error::{CatalogError, Result};
pub use sandbox::Sandbox;
pub use zip::{ZipExtractor, ZipFileEntry, ZipWriter};
