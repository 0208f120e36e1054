//! Common test utilities for worker integration tests
//!
//! Builds an `AppState` over a temporary media root with the in-memory
//! store, plus a scripted processor for driving the task manager.

#![allow(unused_imports)]
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use mediashelf_test_utils::{MediaLibrary, MockMediaStore, StaticMetadataExtractor};
use mediashelf_worker::jobs::TaskProcessor;
use mediashelf_worker::models::{OperationType, ProgressState, TaskRecord};
use mediashelf_worker::{AppState, WorkerError, WorkerResult};

pub use mediashelf_test_utils::media_record;

/// Upper bound for any background run in these tests
pub const JOB_TIMEOUT: Duration = Duration::from_secs(10);

/// Media root, store and state wired together
pub struct TestEnv {
    pub library: MediaLibrary,
    pub store: MockMediaStore,
    pub extractor: StaticMetadataExtractor,
    pub state: AppState,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_extractor(StaticMetadataExtractor::new())
    }

    pub fn with_extractor(extractor: StaticMetadataExtractor) -> Self {
        let library = MediaLibrary::new();
        let store = MockMediaStore::new();
        let state = AppState::new(
            library.config(),
            Arc::new(store.clone()),
            Arc::new(extractor.clone()),
        )
        .expect("build app state");
        Self {
            library,
            store,
            extractor,
            state,
        }
    }
}

/// Await a manager's settled state, failing the test on timeout
pub async fn settle<F>(wait: F) -> ProgressState
where
    F: std::future::Future<Output = ProgressState>,
{
    tokio::time::timeout(JOB_TIMEOUT, wait)
        .await
        .expect("job did not settle in time")
}

/// Poll `condition` until it holds, failing the test on timeout
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(JOB_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}

/// Processor whose outcome per task is decided up front
#[derive(Clone)]
pub struct ScriptedProcessor {
    operation: OperationType,
    fail: Arc<Mutex<HashSet<Uuid>>>,
    block: Arc<Mutex<HashSet<Uuid>>>,
    seen: Arc<Mutex<Vec<Uuid>>>,
}

impl ScriptedProcessor {
    pub fn new(operation: OperationType) -> Self {
        Self {
            operation,
            fail: Arc::default(),
            block: Arc::default(),
            seen: Arc::default(),
        }
    }

    /// Fail the task with this id
    pub fn fail_on(self, task_id: Uuid) -> Self {
        self.fail.lock().unwrap().insert(task_id);
        self
    }

    /// Park on the task with this id until the run is cancelled
    pub fn block_on(self, task_id: Uuid) -> Self {
        self.block.lock().unwrap().insert(task_id);
        self
    }

    /// Task ids in the order they were processed
    pub fn seen(&self) -> Vec<Uuid> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskProcessor for ScriptedProcessor {
    fn operation(&self) -> OperationType {
        self.operation
    }

    async fn process(&self, task: &TaskRecord, cancel: &CancellationToken) -> WorkerResult<()> {
        self.seen.lock().unwrap().push(task.id);

        let blocks = self.block.lock().unwrap().contains(&task.id);
        if blocks {
            cancel.cancelled().await;
            return Err(WorkerError::Cancelled(format!("task {} interrupted", task.id)));
        }

        let fails = self.fail.lock().unwrap().contains(&task.id);
        if fails {
            return Err(WorkerError::Internal(format!("scripted failure for {}", task.id)));
        }
        Ok(())
    }
}
