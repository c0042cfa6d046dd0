//! Streaming ZIP writer.
//!
//! Entries are compressed with DEFLATE as their bytes arrive. Each entry is
//! laid out as:
//!
//! ```text
//! [local file header][name][zip64 extra?][deflate data][data descriptor]
//! ```
//!
//! The local header carries zero sizes and CRC with flag bit 3 set; the real
//! values follow in the data descriptor and are repeated in the central
//! directory. Nothing is ever rewritten, so the output only needs `Write`.

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::Crc;
use flate2::write::DeflateEncoder;
use std::io::{self, Write};

use super::ZipError;
use super::structures::*;

type Result<T> = std::result::Result<T, ZipError>;

/// Entries whose source is at least this large get ZIP64 local headers.
///
/// Kept below 4 GiB because DEFLATE can expand incompressible input slightly.
const ZIP64_ENTRY_THRESHOLD: u64 = 0xF000_0000;

/// Unix regular file, mode 0644, in the high half of the external attributes.
const EXTERNAL_ATTRS_FILE: u32 = 0o100644 << 16;

/// Byte sink that tracks how much has been written.
struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Central directory record for a finished entry.
struct CentralEntry {
    name: String,
    modified: DosDateTime,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    lfh_offset: u64,
    zip64_local: bool,
}

/// The entry currently receiving data.
struct OpenEntry {
    name: String,
    modified: DosDateTime,
    lfh_offset: u64,
    zip64: bool,
    encoder: DeflateEncoder<Vec<u8>>,
    crc: Crc,
    compressed_size: u64,
    uncompressed_size: u64,
}

/// Sequential ZIP archive writer.
///
/// Call [`start_file`](Self::start_file), write the entry's bytes through
/// the [`Write`] impl, repeat, then [`finish`](Self::finish). Starting a new
/// entry closes the previous one.
pub struct ZipWriter<W: Write> {
    out: CountingWriter<W>,
    entries: Vec<CentralEntry>,
    current: Option<OpenEntry>,
}

impl<W: Write> ZipWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            out: CountingWriter { inner, written: 0 },
            entries: Vec::new(),
            current: None,
        }
    }

    /// Number of entries written or in progress.
    pub fn entry_count(&self) -> usize {
        self.entries.len() + usize::from(self.current.is_some())
    }

    /// Bytes emitted so far.
    pub fn bytes_written(&self) -> u64 {
        self.out.written
    }

    /// Begin a new entry named `name`.
    ///
    /// `size_hint` is the expected uncompressed size, used only to decide
    /// whether the local header needs ZIP64 fields.
    pub fn start_file(&mut self, name: &str, modified: DosDateTime, size_hint: u64) -> Result<()> {
        self.finish_entry()?;

        if name.len() > u16::MAX as usize {
            return Err(ZipError::NameTooLong(name.len()));
        }

        let zip64 = size_hint >= ZIP64_ENTRY_THRESHOLD;
        let lfh_offset = self.out.written;
        let out = &mut self.out;

        out.write_all(LFH_SIGNATURE)?;
        out.write_u16::<LittleEndian>(if zip64 { VERSION_ZIP64 } else { VERSION_DEFLATE })?;
        out.write_u16::<LittleEndian>(FLAG_DATA_DESCRIPTOR | FLAG_UTF8)?;
        out.write_u16::<LittleEndian>(CompressionMethod::Deflate.as_u16())?;
        out.write_u16::<LittleEndian>(modified.time)?;
        out.write_u16::<LittleEndian>(modified.date)?;
        out.write_u32::<LittleEndian>(0)?;
        let size_field = if zip64 { ZIP64_U32_SENTINEL } else { 0 };
        out.write_u32::<LittleEndian>(size_field)?;
        out.write_u32::<LittleEndian>(size_field)?;
        out.write_u16::<LittleEndian>(name.len() as u16)?;
        out.write_u16::<LittleEndian>(if zip64 { 20 } else { 0 })?;
        out.write_all(name.as_bytes())?;
        if zip64 {
            out.write_u16::<LittleEndian>(ZIP64_EXTRA_ID)?;
            out.write_u16::<LittleEndian>(16)?;
            out.write_u64::<LittleEndian>(0)?;
            out.write_u64::<LittleEndian>(0)?;
        }

        self.current = Some(OpenEntry {
            name: name.to_string(),
            modified,
            lfh_offset,
            zip64,
            encoder: DeflateEncoder::new(Vec::new(), Compression::default()),
            crc: Crc::new(),
            compressed_size: 0,
            uncompressed_size: 0,
        });
        Ok(())
    }

    /// Close the open entry, if any, writing its data descriptor.
    pub fn finish_entry(&mut self) -> Result<()> {
        let Some(entry) = self.current.take() else {
            return Ok(());
        };

        let OpenEntry {
            name,
            modified,
            lfh_offset,
            zip64,
            encoder,
            crc,
            mut compressed_size,
            uncompressed_size,
        } = entry;

        let tail = encoder.finish()?;
        self.out.write_all(&tail)?;
        compressed_size += tail.len() as u64;

        let crc32 = crc.sum();
        let out = &mut self.out;
        out.write_all(DATA_DESCRIPTOR_SIGNATURE)?;
        out.write_u32::<LittleEndian>(crc32)?;
        if zip64 {
            out.write_u64::<LittleEndian>(compressed_size)?;
            out.write_u64::<LittleEndian>(uncompressed_size)?;
        } else {
            if compressed_size >= ZIP64_U32_SENTINEL as u64
                || uncompressed_size >= ZIP64_U32_SENTINEL as u64
            {
                // The local header already promised 32-bit sizes.
                return Err(ZipError::Io(io::Error::other(format!(
                    "entry {name} outgrew its size hint"
                ))));
            }
            out.write_u32::<LittleEndian>(compressed_size as u32)?;
            out.write_u32::<LittleEndian>(uncompressed_size as u32)?;
        }

        self.entries.push(CentralEntry {
            name,
            modified,
            crc32,
            compressed_size,
            uncompressed_size,
            lfh_offset,
            zip64_local: zip64,
        });
        Ok(())
    }

    /// Write the central directory and end records and return the sink.
    pub fn finish(mut self) -> Result<W> {
        self.finish_entry()?;

        let cd_offset = self.out.written;
        for entry in &self.entries {
            write_central_header(&mut self.out, entry)?;
        }
        let cd_size = self.out.written - cd_offset;
        let total = self.entries.len() as u64;

        let eocd = EndOfCentralDirectory::new(total, cd_size, cd_offset);
        if eocd.is_zip64() {
            let eocd64_offset = self.out.written;
            Zip64EOCD::new(total, cd_size, cd_offset).write_to(&mut self.out)?;
            Zip64EOCDLocator::new(eocd64_offset).write_to(&mut self.out)?;
        }
        eocd.write_to(&mut self.out)?;
        self.out.flush()?;

        Ok(self.out.inner)
    }
}

impl<W: Write> Write for ZipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let entry = self
            .current
            .as_mut()
            .ok_or_else(|| io::Error::other(ZipError::NoOpenEntry))?;

        let n = entry.encoder.write(buf)?;
        entry.crc.update(&buf[..n]);
        entry.uncompressed_size += n as u64;

        // Drain compressed output straight through so memory stays bounded.
        let pending = entry.encoder.get_mut();
        if !pending.is_empty() {
            self.out.write_all(pending)?;
            entry.compressed_size += pending.len() as u64;
            pending.clear();
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

fn write_central_header<W: Write>(out: &mut W, entry: &CentralEntry) -> Result<()> {
    let big_uncompressed = entry.uncompressed_size >= ZIP64_U32_SENTINEL as u64;
    let big_compressed = entry.compressed_size >= ZIP64_U32_SENTINEL as u64;
    let big_offset = entry.lfh_offset >= ZIP64_U32_SENTINEL as u64;

    // Field order inside the ZIP64 extra is fixed by the format.
    let mut extra = Vec::new();
    if big_uncompressed {
        extra.write_u64::<LittleEndian>(entry.uncompressed_size)?;
    }
    if big_compressed {
        extra.write_u64::<LittleEndian>(entry.compressed_size)?;
    }
    if big_offset {
        extra.write_u64::<LittleEndian>(entry.lfh_offset)?;
    }
    let needs_zip64 = !extra.is_empty() || entry.zip64_local;

    out.write_all(CDFH_SIGNATURE)?;
    out.write_u16::<LittleEndian>(VERSION_MADE_BY)?;
    out.write_u16::<LittleEndian>(if needs_zip64 { VERSION_ZIP64 } else { VERSION_DEFLATE })?;
    out.write_u16::<LittleEndian>(FLAG_DATA_DESCRIPTOR | FLAG_UTF8)?;
    out.write_u16::<LittleEndian>(CompressionMethod::Deflate.as_u16())?;
    out.write_u16::<LittleEndian>(entry.modified.time)?;
    out.write_u16::<LittleEndian>(entry.modified.date)?;
    out.write_u32::<LittleEndian>(entry.crc32)?;
    out.write_u32::<LittleEndian>(saturate(entry.compressed_size))?;
    out.write_u32::<LittleEndian>(saturate(entry.uncompressed_size))?;
    out.write_u16::<LittleEndian>(entry.name.len() as u16)?;
    let extra_len = if extra.is_empty() { 0 } else { extra.len() + 4 };
    out.write_u16::<LittleEndian>(extra_len as u16)?;
    out.write_u16::<LittleEndian>(0)?; // comment length
    out.write_u16::<LittleEndian>(0)?; // disk number start
    out.write_u16::<LittleEndian>(0)?; // internal attributes
    out.write_u32::<LittleEndian>(EXTERNAL_ATTRS_FILE)?;
    out.write_u32::<LittleEndian>(saturate(entry.lfh_offset))?;
    out.write_all(entry.name.as_bytes())?;
    if !extra.is_empty() {
        out.write_u16::<LittleEndian>(ZIP64_EXTRA_ID)?;
        out.write_u16::<LittleEndian>(extra.len() as u16)?;
        out.write_all(&extra)?;
    }
    Ok(())
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value)
        .ok()
        .filter(|v| *v != ZIP64_U32_SENTINEL)
        .unwrap_or(ZIP64_U32_SENTINEL)
}
