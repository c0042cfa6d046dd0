//! Archive jobs.
//!
//! Each request gets its own [`ArchiveJob`]: a temporary file in the shared
//! temp directory plus a single [`ZipWriter`] over it. Source files are read
//! and written one at a time on a blocking thread, so the zip stream never
//! sees concurrent writers. Until the job is handed off, dropping it (error,
//! cancellation, panic) deletes the file. After handoff the file belongs to
//! the caller.

use std::collections::HashSet;
use std::fs::{File, Metadata};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::selection::SelectionKey;
use crate::catalog::enumerate::walk_error;
use crate::error::{CatalogError, Result};
use crate::sandbox::{Sandbox, slash_path};
use crate::zip::{DosDateTime, ZipWriter};

const COPY_CHUNK: usize = 64 * 1024;

/// A finished archive, now owned by the caller.
///
/// The caller must delete [`path`](Self::path) once the archive has been
/// sent, whether or not sending succeeded; [`discard`](Self::discard) does
/// exactly that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHandoff {
    pub path: PathBuf,
    /// Name to offer the client, e.g. `2020-Ford_F150_all.zip`
    pub download_name: String,
    pub entries: usize,
    /// Uncompressed source bytes written into the archive
    pub bytes: u64,
}

impl ArchiveHandoff {
    /// Delete the archive file.
    pub async fn discard(self) -> Result<()> {
        tokio::fs::remove_file(&self.path)
            .await
            .map_err(|e| CatalogError::io(&self.path, e))
    }
}

/// One in-progress archive and the temporary file it owns.
struct ArchiveJob {
    file: NamedTempFile,
    download_name: String,
    entries: usize,
    bytes: u64,
}

impl ArchiveJob {
    fn create(temp_dir: &Path, download_name: &str) -> Result<Self> {
        // The prefix must stay a plain file name inside `temp_dir`.
        let stem = download_name
            .strip_suffix(".zip")
            .unwrap_or(download_name)
            .replace(['/', '\\'], "_");
        let file = tempfile::Builder::new()
            .prefix(&format!("{stem}-"))
            .suffix(".zip")
            .tempfile_in(temp_dir)
            .map_err(|e| CatalogError::io(temp_dir, e))?;

        debug!(path = %file.path().display(), "archive job started");
        Ok(Self {
            file,
            download_name: download_name.to_string(),
            entries: 0,
            bytes: 0,
        })
    }

    fn path(&self) -> &Path {
        self.file.path()
    }

    /// Give up ownership of the file: it is no longer deleted on drop.
    fn hand_off(self) -> Result<ArchiveHandoff> {
        let path = self
            .file
            .into_temp_path()
            .keep()
            .map_err(|e| {
                let path = e.path.to_path_buf();
                CatalogError::io(path, e.error)
            })?;

        Ok(ArchiveHandoff {
            path,
            download_name: self.download_name,
            entries: self.entries,
            bytes: self.bytes,
        })
    }
}

/// Builds zip archives from catalog directories and selections.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    temp_dir: PathBuf,
}

impl ArchiveBuilder {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }

    /// Archive every regular file under `dir`, named by its path relative
    /// to `dir`. `dir` must already be validated.
    pub async fn build_from_directory(
        &self,
        dir: PathBuf,
        download_name: String,
        cancel: &CancellationToken,
    ) -> Result<ArchiveHandoff> {
        let temp_dir = self.temp_dir.clone();
        let cancel = cancel.clone();

        let handoff = tokio::task::spawn_blocking(move || {
            let metadata = std::fs::metadata(&dir).map_err(|e| CatalogError::io(&dir, e))?;
            if !metadata.is_dir() {
                return Err(CatalogError::NotADirectory { path: dir });
            }
            let job = ArchiveJob::create(&temp_dir, &download_name)?;
            write_directory(&dir, job, &cancel)
        })
        .await??;

        info!(
            archive = %handoff.path.display(),
            entries = handoff.entries,
            bytes = handoff.bytes,
            "directory archive ready"
        );
        Ok(handoff)
    }

    /// Archive the files named by `keys` under `model_dir`, each stored
    /// under its literal key.
    ///
    /// Keys that are malformed, missing or unreadable are skipped and
    /// logged. A key that escapes `model_dir` fails the whole archive.
    pub async fn build_from_selection(
        &self,
        model_dir: PathBuf,
        keys: Vec<String>,
        download_name: String,
        cancel: &CancellationToken,
    ) -> Result<ArchiveHandoff> {
        let temp_dir = self.temp_dir.clone();
        let cancel = cancel.clone();

        let handoff = tokio::task::spawn_blocking(move || {
            let scope = Sandbox::new(&model_dir)?;
            let job = ArchiveJob::create(&temp_dir, &download_name)?;
            write_selection(&scope, &keys, job, &cancel)
        })
        .await??;

        info!(
            archive = %handoff.path.display(),
            entries = handoff.entries,
            bytes = handoff.bytes,
            "selection archive ready"
        );
        Ok(handoff)
    }
}

fn write_directory(dir: &Path, mut job: ArchiveJob, cancel: &CancellationToken) -> Result<ArchiveHandoff> {
    let zip_path = job.path().to_path_buf();
    let mut zip = ZipWriter::new(BufWriter::new(job.file.as_file()));

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        if cancel.is_cancelled() {
            return Err(CatalogError::Cancelled);
        }
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if !entry.file_type().is_file() {
            if entry.file_type().is_symlink() {
                debug!(path = %entry.path().display(), "not archiving symlink");
            }
            continue;
        }

        let name = entry
            .path()
            .strip_prefix(dir)
            .map(slash_path)
            .map_err(|_| CatalogError::Traversal {
                path: entry.path().to_path_buf(),
            })?;
        let mut source = File::open(entry.path()).map_err(|e| CatalogError::io(entry.path(), e))?;
        let metadata = source
            .metadata()
            .map_err(|e| CatalogError::io(entry.path(), e))?;

        job.bytes += append_file(
            &mut zip,
            &name,
            &metadata,
            &mut source,
            entry.path(),
            &zip_path,
            cancel,
        )?;
        job.entries += 1;
    }

    debug!(entries = zip.entry_count(), written = zip.bytes_written(), "finishing archive");
    finish(zip, &zip_path)?;
    job.hand_off()
}

fn write_selection(
    scope: &Sandbox,
    keys: &[String],
    mut job: ArchiveJob,
    cancel: &CancellationToken,
) -> Result<ArchiveHandoff> {
    let zip_path = job.path().to_path_buf();
    let mut zip = ZipWriter::new(BufWriter::new(job.file.as_file()));
    let mut seen = HashSet::new();

    for key in keys {
        if cancel.is_cancelled() {
            return Err(CatalogError::Cancelled);
        }
        if !seen.insert(key.as_str()) {
            debug!(key = %key, "duplicate selection key");
            continue;
        }

        let Some(selection) = SelectionKey::parse(key) else {
            warn!(key = %key, "skipping malformed selection key");
            continue;
        };

        let path = match scope.validate(&[selection.subdirectory(), selection.file_name()]) {
            Ok(path) => path,
            Err(err) if err.is_traversal() => return Err(err),
            Err(err) => {
                warn!(key = %key, error = %err, "skipping selected file");
                continue;
            }
        };

        let (mut source, metadata) = match open_regular(&path) {
            Ok(opened) => opened,
            Err(err) => {
                warn!(key = %key, error = %err, "skipping selected file");
                continue;
            }
        };

        job.bytes += append_file(&mut zip, key, &metadata, &mut source, &path, &zip_path, cancel)?;
        job.entries += 1;
    }

    debug!(entries = zip.entry_count(), written = zip.bytes_written(), "finishing archive");
    finish(zip, &zip_path)?;
    job.hand_off()
}

fn open_regular(path: &Path) -> Result<(File, Metadata)> {
    let file = File::open(path).map_err(|e| CatalogError::io(path, e))?;
    let metadata = file.metadata().map_err(|e| CatalogError::io(path, e))?;
    if !metadata.is_file() {
        return Err(CatalogError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    Ok((file, metadata))
}

/// Stream `source` into a new entry, checking `cancel` between chunks.
fn append_file<W: Write>(
    zip: &mut ZipWriter<W>,
    name: &str,
    metadata: &Metadata,
    source: &mut File,
    source_path: &Path,
    zip_path: &Path,
    cancel: &CancellationToken,
) -> Result<u64> {
    let modified = metadata
        .modified()
        .map(DosDateTime::from_system_time)
        .unwrap_or(DosDateTime::EPOCH);
    zip.start_file(name, modified, metadata.len())?;

    let mut buf = vec![0u8; COPY_CHUNK];
    let mut copied = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(CatalogError::Cancelled);
        }
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CatalogError::io(source_path, e)),
        };
        zip.write_all(&buf[..n])
            .map_err(|e| CatalogError::io(zip_path, e))?;
        copied += n as u64;
    }
    Ok(copied)
}

fn finish<W: Write>(zip: ZipWriter<BufWriter<W>>, zip_path: &Path) -> Result<()> {
    zip.finish()?
        .into_inner()
        .map_err(|e| CatalogError::io(zip_path, e.into_error()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::ZipExtractor;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        model: PathBuf,
        staging: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let model = temp.path().join("catalog/2020-Ford/F150");
        let staging = temp.path().join("staging");
        fs::create_dir_all(model.join("wiring/engine")).unwrap();
        fs::create_dir_all(model.join("empty")).unwrap();
        fs::create_dir_all(&staging).unwrap();
        fs::write(model.join("manual.pdf"), b"0123456789").unwrap();
        fs::write(model.join("wiring/diagram.pdf"), vec![7u8; 20]).unwrap();
        fs::write(model.join("wiring/engine/harness.pdf"), b"harness").unwrap();
        let model = model.canonicalize().unwrap();
        Fixture {
            _temp: temp,
            model,
            staging,
        }
    }

    fn read_archive(path: &Path) -> Vec<(String, Vec<u8>)> {
        let mut extractor = ZipExtractor::open(path).unwrap();
        let entries = extractor.list_files().unwrap();
        entries
            .iter()
            .map(|e| (e.file_name.clone(), extractor.extract_to_memory(e).unwrap()))
            .collect()
    }

    fn staged_files(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_directory_archive_round_trips() {
        let fx = fixture();
        let builder = ArchiveBuilder::new(&fx.staging);

        let handoff = builder
            .build_from_directory(
                fx.model.clone(),
                "F150.zip".to_string(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(handoff.download_name, "F150.zip");
        assert_eq!(handoff.entries, 3);
        assert_eq!(handoff.bytes, 37);
        assert!(handoff.path.starts_with(&fx.staging));
        assert!(
            handoff
                .path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("F150-")
        );

        let entries = read_archive(&handoff.path);
        assert_eq!(
            entries,
            vec![
                ("manual.pdf".to_string(), b"0123456789".to_vec()),
                ("wiring/diagram.pdf".to_string(), vec![7u8; 20]),
                ("wiring/engine/harness.pdf".to_string(), b"harness".to_vec()),
            ]
        );

        handoff.clone().discard().await.unwrap();
        assert!(!handoff.path.exists());
    }

    #[tokio::test]
    async fn test_directory_archive_of_file_is_rejected() {
        let fx = fixture();
        let builder = ArchiveBuilder::new(&fx.staging);
        let err = builder
            .build_from_directory(
                fx.model.join("manual.pdf"),
                "manual.zip".to_string(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotADirectory { .. }));
        assert_eq!(staged_files(&fx.staging), 0);
    }

    #[tokio::test]
    async fn test_selection_skips_missing_files() {
        let fx = fixture();
        let builder = ArchiveBuilder::new(&fx.staging);
        let keys = vec![
            "__manual.pdf".to_string(),
            "wiring__missing.pdf".to_string(),
            "no-delimiter".to_string(),
            "wiring__engine".to_string(),
            "__manual.pdf".to_string(),
        ];

        let handoff = builder
            .build_from_selection(
                fx.model.clone(),
                keys,
                "2020-Ford_F150_selected.zip".to_string(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(handoff.entries, 1);
        let entries = read_archive(&handoff.path);
        assert_eq!(
            entries,
            vec![("__manual.pdf".to_string(), b"0123456789".to_vec())]
        );
        handoff.discard().await.unwrap();
    }

    #[tokio::test]
    async fn test_selection_keeps_literal_key_names() {
        let fx = fixture();
        let builder = ArchiveBuilder::new(&fx.staging);
        let keys = vec![
            "wiring__diagram.pdf".to_string(),
            "wiring/engine__harness.pdf".to_string(),
        ];

        let handoff = builder
            .build_from_selection(
                fx.model.clone(),
                keys,
                "sel.zip".to_string(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let names: Vec<_> = read_archive(&handoff.path)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["wiring__diagram.pdf", "wiring/engine__harness.pdf"]);
        handoff.discard().await.unwrap();
    }

    #[tokio::test]
    async fn test_selection_traversal_fails_and_cleans_up() {
        let fx = fixture();
        let builder = ArchiveBuilder::new(&fx.staging);
        let keys = vec!["__manual.pdf".to_string(), "..__Mustang".to_string()];

        let err = builder
            .build_from_selection(
                fx.model.clone(),
                keys,
                "sel.zip".to_string(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(err.is_traversal());
        assert_eq!(staged_files(&fx.staging), 0);
    }

    #[tokio::test]
    async fn test_cancelled_job_removes_its_file() {
        let fx = fixture();
        let builder = ArchiveBuilder::new(&fx.staging);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = builder
            .build_from_directory(fx.model.clone(), "F150.zip".to_string(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Cancelled));
        assert_eq!(staged_files(&fx.staging), 0);
    }

    #[tokio::test]
    async fn test_download_name_with_separators_stays_in_staging() {
        let fx = fixture();
        let builder = ArchiveBuilder::new(&fx.staging);
        let handoff = builder
            .build_from_directory(
                fx.model.clone(),
                "2020-Ford/F150_all.zip".to_string(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(handoff.path.parent(), Some(fx.staging.as_path()));
        assert!(
            handoff
                .path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("2020-Ford_F150_all-")
        );
        handoff.discard().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_directory_gives_empty_archive() {
        let fx = fixture();
        let builder = ArchiveBuilder::new(&fx.staging);
        let handoff = builder
            .build_from_directory(
                fx.model.join("empty"),
                "empty.zip".to_string(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(handoff.entries, 0);
        assert!(read_archive(&handoff.path).is_empty());
        handoff.discard().await.unwrap();
    }
}
