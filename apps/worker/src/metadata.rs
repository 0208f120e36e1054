//! Technical metadata extraction
//!
//! Images are measured by decoding their header; audio and video go
//! through the prober.

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerResult;
use crate::media_type::MediaKind;
use crate::process::ProcessRunner;

/// Technical facts about one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedMetadata {
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_ms: Option<i64>,
    /// Raw probe document, kept verbatim
    pub raw: Option<String>,
}

/// Source of technical metadata for scanned files
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Extract what is known for a file of the given MIME type.
    ///
    /// Unsupported kinds yield an empty result, not an error.
    async fn extract(
        &self,
        path: &Path,
        mime_type: &str,
        cancel: &CancellationToken,
    ) -> WorkerResult<ExtractedMetadata>;
}

/// Extractor backed by image header decoding and the external prober
#[derive(Debug, Clone)]
pub struct ProbeMetadataExtractor {
    runner: ProcessRunner,
}

impl ProbeMetadataExtractor {
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl MetadataExtractor for ProbeMetadataExtractor {
    async fn extract(
        &self,
        path: &Path,
        mime_type: &str,
        cancel: &CancellationToken,
    ) -> WorkerResult<ExtractedMetadata> {
        match MediaKind::from_mime(mime_type) {
            MediaKind::Image => {
                let owned = path.to_path_buf();
                let (width, height) =
                    tokio::task::spawn_blocking(move || image::image_dimensions(&owned)).await??;
                Ok(ExtractedMetadata {
                    width: i32::try_from(width).ok(),
                    height: i32::try_from(height).ok(),
                    ..ExtractedMetadata::default()
                })
            }
            MediaKind::Video | MediaKind::Audio => {
                let probe = self.runner.probe(path, cancel).await?;
                let dimensions = probe.first_video_stream_dimensions();
                Ok(ExtractedMetadata {
                    width: dimensions.map(|(w, _)| w),
                    height: dimensions.map(|(_, h)| h),
                    duration_ms: probe.duration_ms(),
                    raw: Some(probe.as_value().to_string()),
                })
            }
            MediaKind::Other => Ok(ExtractedMetadata::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_image_dimensions_from_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        image::RgbImage::new(3, 2).save(&path).unwrap();

        let extractor = ProbeMetadataExtractor::new(ProcessRunner::new("ffmpeg", "ffprobe"));
        let meta = extractor
            .extract(&path, "image/png", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(meta.width, Some(3));
        assert_eq!(meta.height, Some(2));
        assert_eq!(meta.duration_ms, None);
    }

    #[tokio::test]
    async fn test_other_kinds_are_empty() {
        let extractor = ProbeMetadataExtractor::new(ProcessRunner::new("ffmpeg", "ffprobe"));
        let meta = extractor
            .extract(Path::new("/nowhere/doc.pdf"), "application/pdf", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(meta, ExtractedMetadata::default());
    }
}
