//! Scan job manager

use tokio::sync::watch;

use mediashelf_shared_config::LayoutConfig;

use super::JobSlot;
use crate::error::WorkerResult;
use crate::fs::MediaFs;
use crate::jobs::library_scan::Scanner;
use crate::models::{JobKind, ProgressState};

/// Runs at most one library scan at a time
pub struct ScanJobManager {
    scanner: Scanner,
    fs: MediaFs,
    default_dir: String,
    slot: JobSlot,
}

impl ScanJobManager {
    /// Must be called inside a Tokio runtime
    pub fn new(scanner: Scanner, fs: MediaFs, layout: &LayoutConfig) -> Self {
        Self {
            scanner,
            fs,
            default_dir: layout.inbox_dir.clone(),
            slot: JobSlot::new("scan"),
        }
    }

    /// Start scanning `dir` (relative to the media root), or the inbox.
    ///
    /// Path problems are reported here, before any state changes. Fails
    /// with `AlreadyRunning` while a scan is in progress.
    pub fn start(&self, dir: Option<&str>) -> WorkerResult<()> {
        let relative = dir.unwrap_or(&self.default_dir).to_string();
        let target = self.fs.resolve_safely(&relative)?;

        let token = self
            .slot
            .begin(JobKind::Scan, format!("Scanning {}", relative))?;
        tracing::info!(dir = %relative, "Scan started");

        let scanner = self.scanner.clone();
        let slot = self.slot.clone();
        self.slot.submit(
            JobKind::Scan,
            Box::pin(async move {
                let cell = slot.progress.clone();
                let outcome = scanner
                    .scan(&target, &token, move |update| cell.update(|state| state.apply(update)))
                    .await
                    .map(|summary| {
                        format!(
                            "Scan completed: {} files, {} new, {} already indexed, {} failed",
                            summary.total, summary.indexed, summary.skipped, summary.failed
                        )
                    });
                slot.finish(JobKind::Scan, &token, outcome);
            }),
        )
    }

    /// Current progress snapshot
    pub fn progress(&self) -> ProgressState {
        self.slot.progress.snapshot()
    }

    /// Receiver for progress changes
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.slot.progress.subscribe()
    }

    /// Request cancellation of the running scan; a no-op otherwise
    pub fn cancel(&self) {
        self.slot.cancel();
    }

    /// Wait for the current scan (if any) to reach a terminal state
    pub async fn wait(&self) -> ProgressState {
        self.slot.settled().await
    }
}
