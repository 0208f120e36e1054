//! Shared progress cell
//!
//! A `watch` channel holds the one authoritative [`ProgressState`] per
//! manager. Writers replace or mutate it atomically; readers always see a
//! whole snapshot.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{WorkerError, WorkerResult};
use crate::models::{JobKind, JobStatus, ProgressState};

/// Atomically updated progress state, cheap to clone
#[derive(Clone)]
pub struct ProgressCell {
    tx: Arc<watch::Sender<ProgressState>>,
}

impl ProgressCell {
    pub fn new(initial: ProgressState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ProgressState {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every change
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.tx.subscribe()
    }

    /// Mutate the state in place and notify subscribers
    pub fn update(&self, f: impl FnOnce(&mut ProgressState)) {
        self.tx.send_modify(f);
    }

    /// Move to RUNNING unless a run is already in progress.
    ///
    /// The check and the transition happen under the channel's write lock,
    /// so two concurrent callers can never both succeed.
    pub fn try_begin(&self, kind: JobKind, message: impl Into<String>) -> WorkerResult<()> {
        let mut rejected = None;
        let message = message.into();
        self.tx.send_if_modified(|state| {
            if state.status == JobStatus::Running {
                rejected = Some(state.kind.map(|k| k.to_string()).unwrap_or_default());
                false
            } else {
                *state = ProgressState::running(kind, message);
                true
            }
        });

        match rejected {
            None => Ok(()),
            Some(active) => Err(WorkerError::AlreadyRunning(active)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_begin_rejects_second_run() {
        let cell = ProgressCell::new(ProgressState::idle("ready"));
        cell.try_begin(JobKind::Scan, "first").unwrap();

        let err = cell.try_begin(JobKind::Scan, "second").unwrap_err();
        assert!(matches!(err, WorkerError::AlreadyRunning(kind) if kind == "SCAN"));
        assert_eq!(cell.snapshot().message, "first");
    }

    #[test]
    fn test_try_begin_after_terminal_resets_counters() {
        let cell = ProgressCell::new(ProgressState::idle("ready"));
        cell.try_begin(JobKind::Move, "go").unwrap();
        cell.update(|s| {
            s.total = 5;
            s.complete("done");
        });

        cell.try_begin(JobKind::Delete, "again").unwrap();
        let state = cell.snapshot();
        assert_eq!(state.kind, Some(JobKind::Delete));
        assert_eq!(state.status, JobStatus::Running);
        assert_eq!(state.total, 0);
        assert_eq!(state.percentage, 0);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let cell = ProgressCell::new(ProgressState::idle("ready"));
        let mut rx = cell.subscribe();
        cell.try_begin(JobKind::Thumbnail, "go").unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().status, JobStatus::Running);
    }
}
