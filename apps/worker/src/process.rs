//! External transcoder and prober invocation
//!
//! Output from both stdout and stderr is drained concurrently while the
//! child runs, so a chatty process can never block on a full pipe. The
//! merged text is logged line by line under the `ffmpeg` target and kept
//! for error reporting.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{WorkerError, WorkerResult};

/// Runs the configured transcoder and prober binaries
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl ProcessRunner {
    /// Runner for the given transcoder and prober executables
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Check that both binaries can be started
    pub async fn check_available(&self) -> bool {
        let mut available = true;
        for program in [&self.ffmpeg, &self.ffprobe] {
            let ok = Command::new(program)
                .arg("-version")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|s| s.success())
                .unwrap_or(false);
            if !ok {
                tracing::warn!(program = %program.display(), "External tool unavailable");
                available = false;
            }
        }
        available
    }

    /// Run the transcoder with `args`, returning its merged output
    pub async fn run(&self, args: &[String], cancel: &CancellationToken) -> WorkerResult<String> {
        run_program(&self.ffmpeg, args, cancel).await
    }

    /// Probe a media file and parse the JSON description
    pub async fn probe(&self, file: &Path, cancel: &CancellationToken) -> WorkerResult<ProbeOutput> {
        let args = probe_args(file);
        let output = run_program(&self.ffprobe, &args, cancel).await?;
        ProbeOutput::parse(&output)
    }
}

/// Arguments for a quiet JSON probe of format and streams
pub fn probe_args(file: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "quiet".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        file.display().to_string(),
    ]
}

/// Spawn `program`, drain its output and wait for it to exit.
///
/// A non-zero exit becomes `ExternalToolFailed` carrying the full output.
/// Cancellation kills the child and returns `Cancelled`.
pub async fn run_program(
    program: &Path,
    args: &[String],
    cancel: &CancellationToken,
) -> WorkerResult<String> {
    let tool = program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string());

    if cancel.is_cancelled() {
        return Err(WorkerError::Cancelled(format!("{} not started", tool)));
    }

    tracing::debug!(program = %program.display(), ?args, "Starting external tool");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WorkerError::NotFound(format!("external tool {}", program.display()))
            } else {
                WorkerError::Io(e)
            }
        })?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, tx));
    }

    let mut output = String::new();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                terminate(&mut child, &tool).await;
                return Err(WorkerError::Cancelled(format!("{} interrupted", tool)));
            }
            line = rx.recv() => match line {
                Some(line) => {
                    tracing::debug!(target: "ffmpeg", tool = %tool, "{}", line);
                    output.push_str(&line);
                    output.push('\n');
                }
                None => break,
            },
        }
    }

    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            terminate(&mut child, &tool).await;
            return Err(WorkerError::Cancelled(format!("{} interrupted", tool)));
        }
        status = child.wait() => status?,
    };

    if status.success() {
        Ok(output)
    } else {
        let exit_code = status.code().unwrap_or(-1);
        tracing::warn!(tool = %tool, exit_code, "External tool failed");
        Err(WorkerError::external_tool_failed(tool, exit_code, output))
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Stopped reading tool output");
                break;
            }
        }
    }
}

async fn terminate(child: &mut Child, tool: &str) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(error = %e, tool = tool, "Failed to kill external tool");
        return;
    }
    if let Err(e) = child.wait().await {
        tracing::warn!(error = %e, tool = tool, "Failed to reap external tool");
    }
    tracing::info!(tool = tool, "External tool killed after cancellation");
}

/// Parsed prober output
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutput {
    root: Value,
}

impl ProbeOutput {
    /// Parse the prober's JSON document
    pub fn parse(text: &str) -> WorkerResult<Self> {
        Ok(Self {
            root: serde_json::from_str(text)?,
        })
    }

    /// Container format name, e.g. `mov,mp4,m4a,3gp,3g2,mj2` or `mpegts`
    pub fn format_name(&self) -> Option<&str> {
        self.root
            .pointer("/format/format_name")
            .and_then(Value::as_str)
    }

    /// Container duration in milliseconds
    pub fn duration_ms(&self) -> Option<i64> {
        let duration = self.root.pointer("/format/duration")?;
        let seconds = match duration {
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            other => other.as_f64()?,
        };
        Some((seconds * 1000.0) as i64)
    }

    /// Width and height of the first video stream
    pub fn first_video_stream_dimensions(&self) -> Option<(i32, i32)> {
        let stream = self
            .root
            .get("streams")?
            .as_array()?
            .iter()
            .find(|s| s.get("codec_type").and_then(Value::as_str) == Some("video"))?;
        let width = stream.get("width")?.as_i64()?;
        let height = stream.get("height")?.as_i64()?;
        Some((i32::try_from(width).ok()?, i32::try_from(height).ok()?))
    }

    /// Arbitrary JSON pointer lookup
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.root.pointer(pointer)
    }

    /// The whole document
    pub fn as_value(&self) -> &Value {
        &self.root
    }
}
