//! Media library directory layout
//!
//! Every directory here is relative to the media root and is resolved
//! through the safe path resolver before use.

use serde::{Deserialize, Serialize};

use crate::{get_env_or_default, ConfigError, ConfigResult};

/// Fixed working directories under the media root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Landing directory for newly imported files, the default scan target
    pub inbox_dir: String,

    /// Scratch directory for in-flight transcodes
    pub temp_dir: String,

    /// Thumbnail output directory (with `image/` and `video/` children)
    pub thumbnail_dir: String,
}

impl LayoutConfig {
    /// Load the layout from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let layout = Self {
            inbox_dir: get_env_or_default("MEDIA_INBOX_DIR", "TemporaryMedia"),
            temp_dir: get_env_or_default("MEDIA_TEMP_DIR", "VideoTranscodingTemp"),
            thumbnail_dir: get_env_or_default("MEDIA_THUMBNAIL_DIR", "Thumbnail"),
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Reject blank or absolute entries
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, value) in [
            ("MEDIA_INBOX_DIR", &self.inbox_dir),
            ("MEDIA_TEMP_DIR", &self.temp_dir),
            ("MEDIA_THUMBNAIL_DIR", &self.thumbnail_dir),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{name} must not be blank")));
            }
            if value.starts_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be relative to the media root, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Thumbnail subdirectory for image sources
    pub fn image_thumbnail_dir(&self) -> String {
        format!("{}/image", self.thumbnail_dir)
    }

    /// Thumbnail subdirectory for video sources
    pub fn video_thumbnail_dir(&self) -> String {
        format!("{}/video", self.thumbnail_dir)
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            inbox_dir: "TemporaryMedia".to_string(),
            temp_dir: "VideoTranscodingTemp".to_string(),
            thumbnail_dir: "Thumbnail".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let layout = LayoutConfig::default();
        assert_eq!(layout.inbox_dir, "TemporaryMedia");
        assert_eq!(layout.image_thumbnail_dir(), "Thumbnail/image");
        assert_eq!(layout.video_thumbnail_dir(), "Thumbnail/video");
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn test_layout_from_env_overrides() {
        temp_env::with_vars(
            [
                ("MEDIA_INBOX_DIR", Some("Inbox")),
                ("MEDIA_TEMP_DIR", None),
                ("MEDIA_THUMBNAIL_DIR", Some("thumbs")),
            ],
            || {
                let layout = LayoutConfig::from_env().unwrap();
                assert_eq!(layout.inbox_dir, "Inbox");
                assert_eq!(layout.temp_dir, "VideoTranscodingTemp");
                assert_eq!(layout.video_thumbnail_dir(), "thumbs/video");
            },
        );
    }

    #[test]
    fn test_absolute_layout_entry_rejected() {
        let layout = LayoutConfig {
            temp_dir: "/tmp/transcode".to_string(),
            ..LayoutConfig::default()
        };
        assert!(matches!(
            layout.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("MEDIA_TEMP_DIR")
        ));
    }

    #[test]
    fn test_blank_layout_entry_rejected() {
        let layout = LayoutConfig {
            inbox_dir: "  ".to_string(),
            ..LayoutConfig::default()
        };
        assert!(layout.validate().is_err());
    }
}
