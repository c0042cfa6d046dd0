//! ZIP archive writing and reading.
//!
//! Archives produced by the catalog are written by [`ZipWriter`], a strictly
//! sequential streaming writer: each entry's local header is emitted before
//! its data, and sizes and CRC-32 follow in a data descriptor, so a file of
//! any size can be copied into an entry without buffering it or seeking back.
//! The central directory and End of Central Directory (EOCD) record are
//! written by [`ZipWriter::finish`].
//!
//! [`ZipExtractor`] reads archives back the way unzip tools do, starting from
//! the EOCD at the end of the file. It is used to inspect produced archives
//! and to verify them in tests.
//!
//! ## Layout
//!
//! - `structures`: fixed records (EOCD, ZIP64 records, DOS timestamps)
//! - `writer`: streaming archive construction
//! - `parser`: central directory parsing
//! - `extractor`: entry extraction with CRC-32 verification
//!
//! ## Supported features
//!
//! - STORED and DEFLATE entries (the writer always emits DEFLATE)
//! - ZIP64 extensions for entries over 4 GiB, archives over 4 GiB and
//!   archives with more than 65535 entries
//! - UTF-8 entry names (general purpose flag bit 11)
//!
//! No encryption, multi-disk archives or other compression methods.

mod extractor;
mod parser;
mod structures;
mod writer;

pub use extractor::ZipExtractor;
pub use parser::ZipParser;
pub use structures::*;
pub use writer::ZipWriter;

use thiserror::Error;

/// Errors raised while encoding or decoding ZIP structures.
#[derive(Debug, Error)]
pub enum ZipError {
    #[error("not a valid ZIP file")]
    NotAZip,

    #[error("invalid End of Central Directory")]
    InvalidEocd,

    #[error("invalid ZIP64 format")]
    InvalidZip64,

    #[error("invalid Central Directory File Header")]
    InvalidCentralHeader,

    #[error("invalid Local File Header")]
    InvalidLocalHeader,

    #[error("unsupported compression method: {0}")]
    UnsupportedMethod(u16),

    #[error("CRC-32 mismatch for {name}: expected {expected:08x}, got {actual:08x}")]
    CrcMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },

    #[error("entry name too long: {0} bytes")]
    NameTooLong(usize),

    #[error("no entry is open for writing")]
    NoOpenEntry,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
