//! Library scanning
//!
//! Walks a directory under the media root and indexes every regular file
//! that has no record yet. Files already indexed (by root-relative path)
//! are skipped but still count towards progress, so a rescan of an
//! unchanged tree is a no-op that runs to 100%.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::error::{WorkerError, WorkerResult};
use crate::fs::MediaFs;
use crate::media_type::detect_mime_type;
use crate::metadata::MetadataExtractor;
use crate::models::{MediaRecord, MediaStatus, ProgressUpdate};
use crate::store::MediaStore;

/// Outcome counters for one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub total: u64,
    pub indexed: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Indexes files into the media store
#[derive(Clone)]
pub struct Scanner {
    store: Arc<dyn MediaStore>,
    fs: MediaFs,
    extractor: Arc<dyn MetadataExtractor>,
}

impl Scanner {
    pub fn new(
        store: Arc<dyn MediaStore>,
        fs: MediaFs,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Self {
        Self {
            store,
            fs,
            extractor,
        }
    }

    /// Scan `dir` (an absolute path already confined to the media root).
    ///
    /// The whole work list is collected before any file is processed.
    /// Per-file failures are logged and counted; only cancellation and a
    /// failure to enumerate the tree end the scan early.
    pub async fn scan<F>(
        &self,
        dir: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> WorkerResult<ScanSummary>
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        tracing::info!("Starting library scan: {:?}", dir);

        let files = collect_files(dir.to_path_buf()).await?;
        let total = files.len() as u64;
        let mut summary = ScanSummary {
            total,
            ..ScanSummary::default()
        };

        if files.is_empty() {
            on_progress(ProgressUpdate::empty());
            tracing::info!("Library scan found no files under {:?}", dir);
            return Ok(summary);
        }
        on_progress(ProgressUpdate::new(total, 0, ""));

        let mut processed = 0u64;
        for path in &files {
            if cancel.is_cancelled() {
                return Err(WorkerError::Cancelled(format!(
                    "scan stopped after {} of {} files",
                    processed, total
                )));
            }

            let label = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            match self.index_file(path, cancel).await {
                Ok(true) => summary.indexed += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    tracing::warn!("Failed to process {:?}: {}", path, e);
                    summary.failed += 1;
                }
            }

            processed += 1;
            on_progress(ProgressUpdate::new(total, processed, label));
        }

        tracing::info!(
            "Library scan completed: {} new, {} skipped, {} errors",
            summary.indexed,
            summary.skipped,
            summary.failed
        );

        Ok(summary)
    }

    /// Index one file unless its path is already known. Returns whether a
    /// record was inserted.
    async fn index_file(&self, path: &Path, cancel: &CancellationToken) -> WorkerResult<bool> {
        let relative = self.fs.relative_path(path)?;
        if self.store.find_media_by_path(&relative).await?.is_some() {
            return Ok(false);
        }

        let record = self.process_single_file(path, cancel).await?;
        self.store.insert_media(&record).await?;
        tracing::debug!(path = %relative, id = %record.id, "Indexed media file");
        Ok(true)
    }

    /// Build a fresh record for one file without persisting it.
    ///
    /// Hashing and metadata extraction failures leave those fields empty.
    pub async fn process_single_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> WorkerResult<MediaRecord> {
        let relative = self.fs.relative_path(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| WorkerError::InvalidPath(format!("{:?} has no file name", path)))?;

        let owned = path.to_path_buf();
        let (size, mime_type, content_hash) = tokio::task::spawn_blocking(move || {
            let size = fs::metadata(&owned)?.len();
            let mime = detect_mime_type(&owned);
            let hash = match compute_file_hash(&owned) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    tracing::warn!("Failed to hash {:?}: {}", owned, e);
                    None
                }
            };
            Ok::<_, WorkerError>((size, mime, hash))
        })
        .await??;

        let mut record = MediaRecord::new(name, relative);
        record.size_bytes = i64::try_from(size).unwrap_or(i64::MAX);
        record.mime_type = mime_type;
        record.content_hash = content_hash;
        record.status = MediaStatus::PendingClassification;
        record.updated_at = Utc::now();

        match self.extractor.extract(path, &record.mime_type, cancel).await {
            Ok(meta) => {
                record.width = meta.width;
                record.height = meta.height;
                record.duration_ms = meta.duration_ms;
                record.metadata = meta.raw;
            }
            Err(e) if e.is_cancellation() => return Err(e),
            Err(e) => {
                tracing::warn!("Metadata extraction failed for {:?}: {}", path, e);
            }
        }

        Ok(record)
    }
}

/// Regular files under `dir`, in a stable order
pub(crate) async fn collect_files(dir: PathBuf) -> WorkerResult<Vec<PathBuf>> {
    tokio::task::spawn_blocking(move || {
        if !dir.is_dir() {
            return Err(WorkerError::NotADirectory(dir.display().to_string()));
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| match e.into_io_error() {
                Some(io) => WorkerError::Io(io),
                None => WorkerError::Internal("filesystem loop detected while scanning".to_string()),
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    })
    .await?
}

/// Compute SHA-256 hash of a file
fn compute_file_hash(path: &Path) -> WorkerResult<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    let hash = hasher.finalize();
    Ok(format!("{:x}", hash))
}
