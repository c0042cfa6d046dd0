use flate2::Crc;
use flate2::read::DeflateDecoder;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, Write};
use std::path::Path;

use super::ZipError;
use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

type Result<T> = std::result::Result<T, ZipError>;

/// ZIP entry extractor with CRC-32 verification.
pub struct ZipExtractor<R> {
    parser: ZipParser<R>,
}

impl ZipExtractor<BufReader<File>> {
    /// Open an archive on disk.
    pub fn open(path: &Path) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> ZipExtractor<R> {
    pub fn new(reader: R) -> Result<Self> {
        Ok(Self {
            parser: ZipParser::new(reader)?,
        })
    }

    /// List all entries in the archive
    pub fn list_files(&mut self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files()
    }

    /// Stream an entry's decompressed bytes into `out`, returning the count.
    pub fn extract_to_writer<W: Write>(&mut self, entry: &ZipFileEntry, out: &mut W) -> Result<u64> {
        let data_offset = self.parser.data_offset(entry)?;
        let mut raw = self
            .parser
            .reader_at(data_offset)?
            .take(entry.compressed_size);

        let mut sink = CrcWriter {
            inner: out,
            crc: Crc::new(),
        };
        let written = match entry.compression_method {
            CompressionMethod::Stored => io::copy(&mut raw, &mut sink)?,
            CompressionMethod::Deflate => io::copy(&mut DeflateDecoder::new(raw), &mut sink)?,
            CompressionMethod::Unknown(method) => return Err(ZipError::UnsupportedMethod(method)),
        };

        let actual = sink.crc.sum();
        if actual != entry.crc32 {
            return Err(ZipError::CrcMismatch {
                name: entry.file_name.clone(),
                expected: entry.crc32,
                actual,
            });
        }
        Ok(written)
    }

    /// Extract an entry into memory
    pub fn extract_to_memory(&mut self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(entry.uncompressed_size.min(1 << 20) as usize);
        self.extract_to_writer(entry, &mut buf)?;
        Ok(buf)
    }
}

struct CrcWriter<'a, W> {
    inner: &'a mut W,
    crc: Crc,
}

impl<W: Write> Write for CrcWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.crc.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::{DosDateTime, ZipWriter};
    use std::io::Cursor;

    fn single_entry(data: &[u8]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Vec::new());
        writer
            .start_file("part.pdf", DosDateTime::EPOCH, data.len() as u64)
            .unwrap();
        writer.write_all(data).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_detects_corrupted_data() {
        let mut bytes = single_entry(&[42u8; 64]);
        let mut extractor = ZipExtractor::new(Cursor::new(bytes.clone())).unwrap();
        let entry = extractor.list_files().unwrap().remove(0);
        let data_offset = extractor.parser.data_offset(&entry).unwrap() as usize;

        // Flip the stored CRC in the central directory copy we hold.
        let mut tampered = entry.clone();
        tampered.crc32 ^= 0xFFFF_FFFF;
        assert!(matches!(
            extractor.extract_to_memory(&tampered),
            Err(ZipError::CrcMismatch { .. })
        ));

        // Corrupting the compressed stream is caught too.
        bytes[data_offset] ^= 0xFF;
        let mut extractor = ZipExtractor::new(Cursor::new(bytes)).unwrap();
        assert!(extractor.extract_to_memory(&entry).is_err());
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let bytes = single_entry(b"data");
        let mut extractor = ZipExtractor::new(Cursor::new(bytes)).unwrap();
        let mut entry = extractor.list_files().unwrap().remove(0);
        entry.compression_method = CompressionMethod::Unknown(12);
        assert!(matches!(
            extractor.extract_to_memory(&entry),
            Err(ZipError::UnsupportedMethod(12))
        ));
    }
}
