//! Worker configuration loaded from environment variables
//!
//! This module provides configuration management for the mediashelf worker.
//! Configuration is loaded from environment variables with sensible defaults for
//! development environments.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mediashelf_shared_config::{CommonConfig, DatabaseConfig, Environment, LayoutConfig};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Transcoder executable
    pub ffmpeg_path: PathBuf,

    /// Prober executable
    pub ffprobe_path: PathBuf,

    /// Thumbnail generation settings
    pub thumbnails: ThumbnailSettings,
}

/// Thumbnail generation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSettings {
    /// JPEG quality, 1-100
    pub quality_percent: u8,

    /// Images at or below this size are left alone
    pub size_threshold_bytes: u64,

    /// Longest edge of a generated image thumbnail
    pub max_dimension: u32,

    /// Offset into a video at which the frame is captured
    pub frame_second: u32,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            quality_percent: 75,
            size_threshold_bytes: 500 * 1024,
            max_dimension: 800,
            frame_second: 1,
        }
    }
}

impl ThumbnailSettings {
    /// Load thumbnail settings from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            quality_percent: env::var("THUMBNAIL_QUALITY")
                .unwrap_or_else(|_| defaults.quality_percent.to_string())
                .parse()
                .context("Invalid THUMBNAIL_QUALITY value")?,

            size_threshold_bytes: env::var("THUMBNAIL_SIZE_THRESHOLD")
                .unwrap_or_else(|_| defaults.size_threshold_bytes.to_string())
                .parse()
                .context("Invalid THUMBNAIL_SIZE_THRESHOLD value")?,

            max_dimension: env::var("THUMBNAIL_MAX_DIMENSION")
                .unwrap_or_else(|_| defaults.max_dimension.to_string())
                .parse()
                .context("Invalid THUMBNAIL_MAX_DIMENSION value")?,

            frame_second: env::var("THUMBNAIL_FRAME_SECOND")
                .unwrap_or_else(|_| defaults.frame_second.to_string())
                .parse()
                .context("Invalid THUMBNAIL_FRAME_SECOND value")?,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check ranges that parsing alone cannot enforce
    pub fn validate(&self) -> WorkerResult<()> {
        if !(1..=100).contains(&self.quality_percent) {
            return Err(WorkerError::Configuration(format!(
                "thumbnail quality must be between 1 and 100, got {}",
                self.quality_percent
            )));
        }
        if self.max_dimension == 0 {
            return Err(WorkerError::Configuration(
                "thumbnail max dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Capture offset formatted as `HH:MM:SS`
    pub fn frame_timestamp(&self) -> String {
        let secs = self.frame_second;
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        Ok(Self {
            common,
            ffmpeg_path: PathBuf::from(
                env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ),
            ffprobe_path: PathBuf::from(
                env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            ),
            thumbnails: ThumbnailSettings::from_env()?,
        })
    }

    /// Defaults rooted at `media_root` (useful for testing)
    pub fn with_media_root(media_root: impl Into<PathBuf>) -> Self {
        Self {
            common: CommonConfig::with_media_root(media_root),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            thumbnails: ThumbnailSettings::default(),
        }
    }

    // Convenience accessors for common config fields

    /// Get media root
    pub fn media_root(&self) -> &Path {
        &self.common.media_root
    }

    /// Get directory layout under the media root
    pub fn layout(&self) -> &LayoutConfig {
        &self.common.layout
    }

    /// Get database configuration
    pub fn database(&self) -> &DatabaseConfig {
        &self.common.database
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }
}
