//! Thumbnail generation for images and videos
//!
//! Large images are downscaled and re-encoded as JPEG; videos get a single
//! frame captured by the transcoder. Thumbnails are named after the media
//! id so files with the same name in different categories never collide.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use tokio_util::sync::CancellationToken;

use mediashelf_shared_config::LayoutConfig;

use super::BatchSummary;
use crate::config::ThumbnailSettings;
use crate::error::{WorkerError, WorkerResult};
use crate::fs::MediaFs;
use crate::media_type::MediaKind;
use crate::models::{MediaRecord, ProgressUpdate};
use crate::process::ProcessRunner;
use crate::store::MediaStore;

/// What happened to one media item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Generated,
    Skipped,
}

/// Generates missing thumbnails
pub struct ThumbnailBatch {
    store: Arc<dyn MediaStore>,
    fs: MediaFs,
    runner: ProcessRunner,
    settings: ThumbnailSettings,
    layout: LayoutConfig,
}

impl ThumbnailBatch {
    pub fn new(
        store: Arc<dyn MediaStore>,
        fs: MediaFs,
        runner: ProcessRunner,
        settings: ThumbnailSettings,
        layout: LayoutConfig,
    ) -> Self {
        Self {
            store,
            fs,
            runner,
            settings,
            layout,
        }
    }

    /// Generate thumbnails for every image and video record lacking one.
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
        self.settings.validate()?;

        let pending = self.store.find_media_without_thumbnail().await?;
        let total = pending.len() as u64;
        let mut summary = BatchSummary {
            total,
            ..BatchSummary::default()
        };
        tracing::info!(total, "Starting thumbnail generation");
        on_progress(ProgressUpdate::new(total, 0, ""));

        for (index, media) in pending.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(WorkerError::Cancelled(format!(
                    "thumbnails stopped after {} of {} items",
                    index, total
                )));
            }
            on_progress(ProgressUpdate::new(
                total,
                index as u64,
                format!("Processing: {}", media.name),
            ));

            match self.generate(media.clone(), cancel).await {
                Ok(Outcome::Generated) => summary.succeeded += 1,
                Ok(Outcome::Skipped) => summary.skipped += 1,
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    tracing::warn!(media_id = %media.id, path = %media.path, error = %e, "Thumbnail generation failed");
                    summary.failed += 1;
                }
            }
        }

        on_progress(ProgressUpdate::new(total, total, ""));
        tracing::info!(
            "Thumbnail generation completed: {} generated, {} skipped, {} errors",
            summary.succeeded,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    async fn generate(
        &self,
        mut media: MediaRecord,
        cancel: &CancellationToken,
    ) -> WorkerResult<Outcome> {
        let source = self.fs.resolve_safely(&media.path)?;
        let file_name = format!("{}.jpg", media.id);

        let relative = match MediaKind::from_mime(&media.mime_type) {
            MediaKind::Image => {
                let size = u64::try_from(media.size_bytes).unwrap_or(0);
                if size <= self.settings.size_threshold_bytes {
                    return Ok(Outcome::Skipped);
                }
                let dir = self.layout.image_thumbnail_dir();
                let target = self.fs.create_directory(&dir)?.join(&file_name);
                let max = self.settings.max_dimension;
                let quality = self.settings.quality_percent;
                tokio::task::spawn_blocking(move || {
                    render_image_thumbnail(&source, &target, max, quality)
                })
                .await??;
                format!("{}/{}", dir, file_name)
            }
            MediaKind::Video => {
                let dir = self.layout.video_thumbnail_dir();
                let target = self.fs.create_directory(&dir)?.join(&file_name);
                let args =
                    frame_capture_args(&source, &target, &self.settings.frame_timestamp());
                self.runner.run(&args, cancel).await?;
                format!("{}/{}", dir, file_name)
            }
            MediaKind::Audio | MediaKind::Other => return Ok(Outcome::Skipped),
        };

        media.thumbnail = Some(relative);
        media.updated_at = chrono::Utc::now();
        self.store.update_media(&media).await?;
        tracing::debug!(media_id = %media.id, thumbnail = ?media.thumbnail, "Thumbnail stored");
        Ok(Outcome::Generated)
    }
}

/// Downscale to fit `max_dimension` (keeping aspect ratio) and write a JPEG
pub fn render_image_thumbnail(
    source: &Path,
    target: &Path,
    max_dimension: u32,
    quality: u8,
) -> WorkerResult<PathBuf> {
    let img = image::open(source)?;
    let img = if img.width() > max_dimension || img.height() > max_dimension {
        img.thumbnail(max_dimension, max_dimension)
    } else {
        img
    };

    let mut writer = BufWriter::new(File::create(target)?);
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality);
        encoder.encode_image(&img.to_rgb8())?;
    }
    writer.flush()?;
    Ok(target.to_path_buf())
}

/// Arguments capturing one frame at `timestamp` as a high-quality JPEG
pub fn frame_capture_args(input: &Path, output: &Path, timestamp: &str) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-ss".to_string(),
        timestamp.to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-vframes".to_string(),
        "1".to_string(),
        "-q:v".to_string(),
        "2".to_string(),
        output.display().to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_capture_args() {
        let args = frame_capture_args(Path::new("/m/a.mp4"), Path::new("/m/t.jpg"), "00:00:01");
        assert_eq!(
            args,
            vec!["-y", "-ss", "00:00:01", "-i", "/m/a.mp4", "-vframes", "1", "-q:v", "2", "/m/t.jpg"]
        );
    }

    #[test]
    fn test_render_keeps_aspect_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("wide.png");
        let target = dir.path().join("wide.jpg");
        image::RgbImage::from_pixel(1600, 400, image::Rgb([200, 10, 10]))
            .save(&source)
            .unwrap();

        render_image_thumbnail(&source, &target, 800, 75).unwrap();

        let (w, h) = image::image_dimensions(&target).unwrap();
        assert_eq!(w, 800);
        assert_eq!(h, 200);
    }

    #[test]
    fn test_render_does_not_upscale() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("small.png");
        let target = dir.path().join("small.jpg");
        image::RgbImage::new(40, 30).save(&source).unwrap();

        render_image_thumbnail(&source, &target, 800, 75).unwrap();

        assert_eq!(image::image_dimensions(&target).unwrap(), (40, 30));
    }
}
