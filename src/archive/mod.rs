//! Temporary zip archives built from catalog directories or file selections.

mod builder;
mod selection;

pub use builder::{ArchiveBuilder, ArchiveHandoff};
pub use selection::{SELECTION_DELIMITER, SelectionKey};
