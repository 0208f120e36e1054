//! Task job manager
//!
//! Drains pending MOVE/DELETE/TRANSCODE tasks through their registered
//! processors, or runs one of the maintenance batches. Tasks run strictly
//! in retrieval order; a failing task is recorded and the run moves on.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{JobSlot, ProgressCell};
use crate::error::{WorkerError, WorkerResult};
use crate::jobs::normalize::NormalizeBatch;
use crate::jobs::thumbnail::ThumbnailBatch;
use crate::jobs::ProcessorRegistry;
use crate::models::{
    JobKind, MediaStatus, OperationType, ProgressState, ProgressUpdate, TaskKind, TaskStatus,
};
use crate::store::MediaStore;

/// Runs at most one task batch at a time
pub struct TaskJobManager {
    store: Arc<dyn MediaStore>,
    registry: Arc<ProcessorRegistry>,
    thumbnails: Arc<ThumbnailBatch>,
    normalizer: Arc<NormalizeBatch>,
    slot: JobSlot,
}

impl TaskJobManager {
    /// Must be called inside a Tokio runtime
    pub fn new(
        store: Arc<dyn MediaStore>,
        registry: ProcessorRegistry,
        thumbnails: ThumbnailBatch,
        normalizer: NormalizeBatch,
    ) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
            thumbnails: Arc::new(thumbnails),
            normalizer: Arc::new(normalizer),
            slot: JobSlot::new("tasks"),
        }
    }

    /// Start a run of `kind`. Fails with `AlreadyRunning` while one is active.
    pub fn start(&self, kind: TaskKind) -> WorkerResult<()> {
        let job_kind = JobKind::from(kind);
        let token = self
            .slot
            .begin(job_kind, format!("Starting {} run", kind))?;
        tracing::info!(kind = %kind, "Task run started");

        let store = self.store.clone();
        let registry = self.registry.clone();
        let thumbnails = self.thumbnails.clone();
        let normalizer = self.normalizer.clone();
        let slot = self.slot.clone();

        self.slot.submit(
            job_kind,
            Box::pin(async move {
                let cell = slot.progress.clone();
                let report = move |update: ProgressUpdate| cell.update(|state| state.apply(update));

                let outcome = match (kind, kind.operation()) {
                    (_, Some(operation)) => {
                        run_queue(operation, store.as_ref(), &registry, &slot.progress, &token)
                            .await
                    }
                    (TaskKind::Thumbnail, None) => {
                        thumbnails.execute(&token, report).await.map(|s| {
                            format!(
                                "Thumbnails finished: {} generated, {} skipped, {} failed",
                                s.succeeded, s.skipped, s.failed
                            )
                        })
                    }
                    (_, None) => normalizer.execute(&token, report).await.map(|s| {
                        format!(
                            "Video normalization finished: {} converted, {} failed",
                            s.succeeded, s.failed
                        )
                    }),
                };
                slot.finish(job_kind, &token, outcome);
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

    /// Request cancellation of the running batch; a no-op otherwise.
    ///
    /// Tasks that have not started stay PENDING.
    pub fn cancel(&self) {
        self.slot.cancel();
    }

    /// Wait for the current run (if any) to reach a terminal state
    pub async fn wait(&self) -> ProgressState {
        self.slot.settled().await
    }
}

async fn run_queue(
    operation: OperationType,
    store: &dyn MediaStore,
    registry: &ProcessorRegistry,
    progress: &ProgressCell,
    cancel: &CancellationToken,
) -> WorkerResult<String> {
    let tasks = store.get_pending_tasks(operation).await?;
    let total = tasks.len() as u64;
    progress.update(|state| state.apply(ProgressUpdate::new(total, 0, "")));

    if tasks.is_empty() {
        return Ok(format!("No pending {} tasks", operation));
    }

    let processor = registry.get(operation)?;
    let (mut completed, mut failed) = (0u64, 0u64);

    for (index, mut task) in tasks.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(WorkerError::Cancelled(format!(
                "{} of {} {} tasks left pending",
                total - index as u64,
                total,
                operation
            )));
        }

        let label = format!("Processing task {}", task.id);
        progress.update(|state| state.apply(ProgressUpdate::new(total, index as u64, label)));

        task.status = TaskStatus::Processing;
        store.update_task(&task).await?;

        match processor.process(&task, cancel).await {
            Ok(()) => {
                task.status = TaskStatus::Completed;
                task.error_message = None;
                completed += 1;
            }
            Err(e) if e.is_cancellation() => {
                task.status = TaskStatus::Cancelled;
                task.error_message = Some(e.to_string());
                store.update_task(&task).await?;
                restore_source(store, operation, task.media_id).await;
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(task_id = %task.id, operation = %operation, error = %e, "Task failed");
                task.status = TaskStatus::Failed;
                task.error_message = Some(e.to_string());
                failed += 1;
                restore_source(store, operation, task.media_id).await;
            }
        }
        store.update_task(&task).await?;

        let done = index as u64 + 1;
        progress.update(|state| state.apply(ProgressUpdate::new(total, done, "")));
    }

    Ok(format!(
        "All {} tasks processed: {} completed, {} failed",
        operation, completed, failed
    ))
}

/// Move and transcode mark their source PROCESSING when enqueued; put it
/// back to AVAILABLE when the task does not succeed.
async fn restore_source(store: &dyn MediaStore, operation: OperationType, media_id: Uuid) {
    if operation == OperationType::Delete {
        return;
    }
    let result = async {
        if let Some(mut media) = store.get_media(media_id).await? {
            if media.status == MediaStatus::Processing {
                media.set_status(MediaStatus::Available);
                store.update_media(&media).await?;
                tracing::info!(media_id = %media_id, "Source media restored to AVAILABLE");
            }
        }
        Ok::<_, WorkerError>(())
    }
    .await;

    if let Err(e) = result {
        tracing::warn!(media_id = %media_id, error = %e, "Failed to restore source media status");
    }
}
