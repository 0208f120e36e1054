//! Transcoder command-line construction
//!
//! Pure functions from encode parameters to an argument vector. The
//! program name is not included; [`crate::process::ProcessRunner`]
//! supplies it.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Slowest speed the audio tempo filter accepts
pub const MIN_AUDIO_TEMPO: f64 = 0.5;

/// Fastest speed the audio tempo filter accepts
pub const MAX_AUDIO_TEMPO: f64 = 100.0;

/// Video stream options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoOptions {
    pub codec: Option<String>,
    /// Target bitrate, e.g. `2M`; ignored when `crf` is set
    pub bitrate: Option<String>,
    /// Scale target as `W:H`, e.g. `1280:720` or `-2:720`
    pub resolution: Option<String>,
    pub framerate: Option<u32>,
    pub crf: Option<u32>,
    /// Playback speed multiplier; absent or non-positive means 1.0
    pub speed: Option<f64>,
}

/// Audio stream options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioOptions {
    pub codec: Option<String>,
    pub bitrate: Option<String>,
}

/// Full set of encode parameters carried in a transcode task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncodeParameters {
    /// Output container; informational, the output file name decides
    pub container: Option<String>,
    pub video: VideoOptions,
    pub audio: AudioOptions,
}

/// Build the transcoder arguments for `input` → `output`.
///
/// Order: overwrite flag and input; video filters (speed, then scale);
/// audio filter; video codec; quality (CRF preferred over bitrate);
/// framerate; audio codec and bitrate; output path last.
pub fn build_transcode_args(input: &Path, output: &Path, params: &EncodeParameters) -> Vec<String> {
    let video = &params.video;
    let audio = &params.audio;
    let mut args = vec!["-y".to_string(), "-i".to_string(), input.display().to_string()];

    let speed = effective_speed(video.speed);
    let speed_changed = speed != 1.0;

    let mut video_filters = Vec::new();
    if speed_changed {
        video_filters.push(format!("setpts={:?}*PTS", 1.0 / speed));
    }
    if let Some(resolution) = non_blank(&video.resolution) {
        video_filters.push(format!("scale={}", resolution));
    }
    if !video_filters.is_empty() {
        args.push("-vf".to_string());
        args.push(video_filters.join(","));
    }

    if speed_changed {
        if (MIN_AUDIO_TEMPO..=MAX_AUDIO_TEMPO).contains(&speed) {
            args.push("-af".to_string());
            args.push(format!("atempo={:?}", speed));
        } else {
            tracing::warn!(
                speed,
                "Speed outside the audio tempo range, audio left unchanged"
            );
        }
    }

    if let Some(codec) = non_blank(&video.codec) {
        args.push("-c:v".to_string());
        args.push(codec.to_string());
    }

    if let Some(crf) = video.crf {
        args.push("-crf".to_string());
        args.push(crf.to_string());
    } else if let Some(bitrate) = non_blank(&video.bitrate) {
        args.push("-b:v".to_string());
        args.push(bitrate.to_string());
    }

    if let Some(framerate) = video.framerate {
        args.push("-r".to_string());
        args.push(framerate.to_string());
    }

    if let Some(codec) = non_blank(&audio.codec) {
        args.push("-c:a".to_string());
        args.push(codec.to_string());
    }
    if let Some(bitrate) = non_blank(&audio.bitrate) {
        args.push("-b:a".to_string());
        args.push(bitrate.to_string());
    }

    args.push(output.display().to_string());
    args
}

/// Speed used for filters; anything absent, non-positive or non-finite is 1.0
pub fn effective_speed(speed: Option<f64>) -> f64 {
    match speed {
        Some(s) if s.is_finite() && s > 0.0 => s,
        _ => 1.0,
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
