//! Video container normalization
//!
//! Videos in the inbox that are not already MP4 (or that are MPEG-TS
//! streams with an MP4-looking name) are rewritten as fast-start MP4. A
//! stream copy is tried first; if the streams cannot be copied into MP4
//! the file is re-encoded to H.264/AAC.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use mediashelf_shared_config::LayoutConfig;

use super::library_scan::collect_files;
use super::BatchSummary;
use crate::error::{WorkerError, WorkerResult};
use crate::fs::MediaFs;
use crate::media_type::{detect_mime_type, MediaKind};
use crate::models::ProgressUpdate;
use crate::process::ProcessRunner;
use crate::store::MediaStore;

const NORMALIZED_MIME: &str = "video/mp4";

/// Rewrites inbox videos as MP4
pub struct NormalizeBatch {
    store: Arc<dyn MediaStore>,
    fs: MediaFs,
    runner: ProcessRunner,
    layout: LayoutConfig,
}

impl NormalizeBatch {
    pub fn new(
        store: Arc<dyn MediaStore>,
        fs: MediaFs,
        runner: ProcessRunner,
        layout: LayoutConfig,
    ) -> Self {
        Self {
            store,
            fs,
            runner,
            layout,
        }
    }

    /// Normalize every candidate video under the inbox.
    ///
    /// Individual failures are logged and counted; the batch carries on.
    pub async fn execute<F>(
        &self,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> WorkerResult<BatchSummary>
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        let inbox = self.fs.create_directory(&self.layout.inbox_dir)?;
        let candidates = self.find_candidates(&inbox, cancel).await?;
        let total = candidates.len() as u64;
        let mut summary = BatchSummary {
            total,
            ..BatchSummary::default()
        };
        tracing::info!(total, inbox = %inbox.display(), "Starting video normalization");
        on_progress(ProgressUpdate::new(total, 0, ""));

        for (index, source) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(WorkerError::Cancelled(format!(
                    "normalization stopped after {} of {} videos",
                    index, total
                )));
            }
            let label = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            on_progress(ProgressUpdate::new(
                total,
                index as u64,
                format!("Processing: {}", label),
            ));

            match self.normalize(source, cancel).await {
                Ok(()) => summary.succeeded += 1,
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    tracing::warn!(path = %source.display(), error = %e, "Video normalization failed");
                    summary.failed += 1;
                }
            }
        }

        on_progress(ProgressUpdate::new(total, total, ""));
        tracing::info!(
            "Video normalization completed: {} converted, {} errors",
            summary.succeeded,
            summary.failed
        );
        Ok(summary)
    }

    async fn find_candidates(
        &self,
        inbox: &Path,
        cancel: &CancellationToken,
    ) -> WorkerResult<Vec<PathBuf>> {
        let files = collect_files(inbox.to_path_buf()).await?;
        let videos = tokio::task::spawn_blocking(move || {
            files
                .into_iter()
                .filter(|f| MediaKind::from_mime(&detect_mime_type(f)) == MediaKind::Video)
                .collect::<Vec<_>>()
        })
        .await?;

        let mut candidates = Vec::new();
        for video in videos {
            match self.runner.probe(&video, cancel).await {
                Ok(probe) => {
                    if needs_normalization(probe.format_name()) {
                        candidates.push(video);
                    }
                }
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    tracing::warn!(path = %video.display(), error = %e, "Probe failed, leaving file as is");
                }
            }
        }
        Ok(candidates)
    }

    async fn normalize(&self, source: &Path, cancel: &CancellationToken) -> WorkerResult<()> {
        let parent = source
            .parent()
            .ok_or_else(|| WorkerError::InvalidPath(source.display().to_string()))?;
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| WorkerError::InvalidPath(source.display().to_string()))?;
        let scratch = parent.join(format!("{}.mp4", Uuid::new_v4()));
        let target = parent.join(format!("{}.mp4", stem));

        let source_rel = self.fs.relative_path(source)?;
        let scratch_rel = self.fs.relative_path(&scratch)?;
        let target_rel = self.fs.relative_path(&target)?;
        if source != target && target.exists() {
            return Err(WorkerError::AlreadyExists(target_rel));
        }

        if let Err(e) = self.runner.run(&remux_args(source, &scratch), cancel).await {
            self.discard(&scratch_rel);
            if e.is_cancellation() {
                return Err(e);
            }
            tracing::info!(path = %source.display(), error = %e, "Stream copy failed, re-encoding");
            if let Err(e) = self.runner.run(&reencode_args(source, &scratch), cancel).await {
                self.discard(&scratch_rel);
                return Err(e);
            }
        }

        if source == target {
            if let Err(e) = self.replace_in_place(&scratch_rel, &source_rel) {
                self.discard(&scratch_rel);
                return Err(e);
            }
        } else {
            if let Err(e) = self.fs.move_file(&scratch_rel, &target_rel) {
                self.discard(&scratch_rel);
                return Err(e);
            }
            if let Err(e) = self.fs.delete_file(&source_rel) {
                self.discard(&target_rel);
                return Err(e);
            }
        }

        self.update_record(source, &target).await
    }

    /// Swap `scratch` in for `original`, keeping the original aside until
    /// the swap has succeeded.
    fn replace_in_place(&self, scratch: &str, original: &str) -> WorkerResult<()> {
        let backup = format!("{}.{}.orig", original, Uuid::new_v4());
        self.fs.move_file(original, &backup)?;
        if let Err(e) = self.fs.move_file(scratch, original) {
            if let Err(restore) = self.fs.move_file(&backup, original) {
                tracing::error!(path = %original, error = %restore, "Failed to restore original video");
            }
            return Err(e);
        }
        if let Err(e) = self.fs.delete_file(&backup) {
            tracing::warn!(path = %backup, error = %e, "Failed to remove replaced original");
        }
        Ok(())
    }

    fn discard(&self, relative: &str) {
        match self.fs.delete_file(relative) {
            Ok(()) | Err(WorkerError::NotFound(_)) => {}
            Err(e) => {
                tracing::warn!(path = %relative, error = %e, "Failed to remove partial output");
            }
        }
    }

    async fn update_record(&self, source: &Path, target: &Path) -> WorkerResult<()> {
        let old_path = self.fs.relative_path(source)?;
        let Some(mut media) = self.store.find_media_by_path(&old_path).await? else {
            tracing::debug!(path = %old_path, "Normalized file has no record yet");
            return Ok(());
        };

        media.path = self.fs.relative_path(target)?;
        media.name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| media.name.clone());
        media.mime_type = NORMALIZED_MIME.to_string();
        media.size_bytes = std::fs::metadata(target)
            .map(|m| i64::try_from(m.len()).unwrap_or(i64::MAX))
            .unwrap_or(media.size_bytes);
        media.updated_at = chrono::Utc::now();
        self.store.update_media(&media).await
    }
}

/// MPEG-TS always needs rewriting; anything else unless it is already MP4
pub fn needs_normalization(format_name: Option<&str>) -> bool {
    match format_name {
        Some(name) => name.contains("mpegts") || !name.contains("mp4"),
        None => false,
    }
}

/// Stream-copy into a fast-start MP4
pub fn remux_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-c".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        output.display().to_string(),
    ]
}

/// Re-encode to H.264/AAC in a fast-start MP4
pub fn reencode_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-crf".to_string(),
        "23".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        output.display().to_string(),
    ]
}
