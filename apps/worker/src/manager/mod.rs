//! Job managers
//!
//! Each manager owns one progress cell, one cancellation handle and one
//! background executor that runs submitted jobs strictly one after
//! another. `start` returns as soon as the run is accepted; callers poll
//! or subscribe to progress.

mod progress;
pub mod scan;
pub mod task_queue;

pub use progress::ProgressCell;
pub use scan::ScanJobManager;
pub use task_queue::TaskJobManager;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{WorkerError, WorkerResult};
use crate::models::{JobKind, JobStatus, ProgressState};

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs submitted jobs one at a time on a dedicated task
#[derive(Clone)]
struct SerialExecutor {
    tx: mpsc::UnboundedSender<JobFuture>,
}

impl SerialExecutor {
    /// Start the executor loop. Must be called inside a Tokio runtime.
    fn spawn(name: &'static str, progress: ProgressCell) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<JobFuture>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // A panicking job must not take the executor down with it.
                if let Err(e) = tokio::spawn(job).await {
                    tracing::error!(executor = name, error = %e, "Job aborted");
                    progress.update(|state| {
                        if state.status == JobStatus::Running {
                            state.fail(format!("Job aborted: {}", e));
                        }
                    });
                }
            }
            tracing::debug!(executor = name, "Job executor stopped");
        });
        Self { tx }
    }

    fn submit(&self, job: JobFuture) -> WorkerResult<()> {
        self.tx
            .send(job)
            .map_err(|_| WorkerError::Internal("job executor has stopped".to_string()))
    }
}

/// Progress, cancellation handle and executor for one manager
#[derive(Clone)]
struct JobSlot {
    progress: ProgressCell,
    current: Arc<Mutex<Option<CancellationToken>>>,
    executor: SerialExecutor,
}

impl JobSlot {
    fn new(name: &'static str) -> Self {
        let progress = ProgressCell::new(ProgressState::idle("No job has run yet"));
        Self {
            executor: SerialExecutor::spawn(name, progress.clone()),
            progress,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Claim the slot for a new run and hand out its cancellation token
    fn begin(&self, kind: JobKind, message: String) -> WorkerResult<CancellationToken> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        self.progress.try_begin(kind, message)?;
        let token = CancellationToken::new();
        *current = Some(token.clone());
        Ok(token)
    }

    fn submit(&self, kind: JobKind, job: JobFuture) -> WorkerResult<()> {
        if let Err(e) = self.executor.submit(job) {
            self.progress
                .update(|state| state.fail(format!("{} could not be started: {}", kind, e)));
            return Err(e);
        }
        Ok(())
    }

    /// Signal the active run, if any
    fn cancel(&self) {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if self.progress.snapshot().status != JobStatus::Running {
            tracing::debug!("Cancel requested with no running job");
            return;
        }
        if let Some(token) = current.as_ref() {
            tracing::info!("Cancellation requested");
            token.cancel();
        }
    }

    /// Record the terminal state of a run
    fn finish(&self, kind: JobKind, token: &CancellationToken, outcome: WorkerResult<String>) {
        match outcome {
            Ok(message) if !token.is_cancelled() => {
                tracing::info!(kind = %kind, "{}", message);
                self.progress.update(|state| state.complete(message));
            }
            Ok(_) => {
                tracing::info!(kind = %kind, "Job canceled after its last item");
                self.progress
                    .update(|state| state.cancel(format!("{} canceled", kind)));
            }
            Err(e) if e.is_cancellation() => {
                tracing::info!(kind = %kind, reason = %e, "Job canceled");
                self.progress
                    .update(|state| state.cancel(format!("{} canceled: {}", kind, e)));
            }
            Err(e) => {
                e.log();
                self.progress
                    .update(|state| state.fail(format!("{} failed: {}", kind, e)));
            }
        }
    }

    /// Wait until no run is in progress and return the settled state
    async fn settled(&self) -> ProgressState {
        let mut rx: watch::Receiver<ProgressState> = self.progress.subscribe();
        let settled = match rx.wait_for(|state| state.status != JobStatus::Running).await {
            Ok(state) => state.clone(),
            Err(_) => self.progress.snapshot(),
        };
        settled
    }
}
