//! In-memory media store for testing job logic
//!
//! # Lock Poisoning Recovery
//!
//! This implementation uses `unwrap_or_else(|e| e.into_inner())` when acquiring
//! locks to recover from poisoned locks. If a test panics while holding a lock,
//! subsequent tests can still access the store rather than failing with a
//! `PoisonError`.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use mediashelf_worker::models::{MediaRecord, OperationType, TaskRecord, TaskStatus};
use mediashelf_worker::store::MediaStore;
use mediashelf_worker::{WorkerError, WorkerResult};

#[derive(Default)]
struct State {
    media: Vec<MediaRecord>,
    tasks: Vec<TaskRecord>,
    failing_media_updates: HashSet<Uuid>,
    failing_task_inserts: bool,
}

/// Mock media store backed by vectors
///
/// Records keep insertion order, so pending tasks come back in the order
/// they were inserted. All clones share the same underlying state.
///
/// # Example
///
/// ```rust
/// use mediashelf_test_utils::{media_record, MockMediaStore};
///
/// let store = MockMediaStore::new();
/// let record = media_record("TemporaryMedia/a.jpg", "image/jpeg");
/// store.seed_media(record.clone());
///
/// assert_eq!(store.media_by_path("TemporaryMedia/a.jpg"), Some(record));
/// ```
#[derive(Clone, Default)]
pub struct MockMediaStore {
    state: Arc<RwLock<State>>,
}

impl MockMediaStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a media record directly
    pub fn seed_media(&self, record: MediaRecord) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.media.push(record);
    }

    /// Insert a task directly
    pub fn seed_task(&self, task: TaskRecord) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.tasks.push(task);
    }

    /// Make every `update_media` for `id` fail
    pub fn fail_media_updates(&self, id: Uuid) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.failing_media_updates.insert(id);
    }

    /// Make every `insert_task` fail
    pub fn fail_task_inserts(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.failing_task_inserts = true;
    }

    /// Snapshot of all media records
    pub fn media(&self) -> Vec<MediaRecord> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.media.clone()
    }

    /// Media record by id
    pub fn media_by_id(&self, id: Uuid) -> Option<MediaRecord> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.media.iter().find(|m| m.id == id).cloned()
    }

    /// Media record by root-relative path
    pub fn media_by_path(&self, path: &str) -> Option<MediaRecord> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.media.iter().find(|m| m.path == path).cloned()
    }

    /// Snapshot of all tasks
    pub fn tasks(&self) -> Vec<TaskRecord> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.tasks.clone()
    }

    /// Task by id
    pub fn task(&self, id: Uuid) -> Option<TaskRecord> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.tasks.iter().find(|t| t.id == id).cloned()
    }

    /// Current status of a task
    pub fn task_status(&self, id: Uuid) -> Option<TaskStatus> {
        self.task(id).map(|t| t.status)
    }
}

#[async_trait]
impl MediaStore for MockMediaStore {
    async fn get_media(&self, id: Uuid) -> WorkerResult<Option<MediaRecord>> {
        Ok(self.media_by_id(id))
    }

    async fn get_media_batch(&self, ids: &[Uuid]) -> WorkerResult<Vec<MediaRecord>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .media
            .iter()
            .filter(|m| ids.contains(&m.id))
            .cloned()
            .collect())
    }

    async fn insert_media(&self, record: &MediaRecord) -> WorkerResult<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.media.iter().any(|m| m.id == record.id || m.path == record.path) {
            return Err(WorkerError::AlreadyExists(record.path.clone()));
        }
        state.media.push(record.clone());
        Ok(())
    }

    async fn update_media(&self, record: &MediaRecord) -> WorkerResult<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.failing_media_updates.contains(&record.id) {
            return Err(WorkerError::Internal(format!(
                "injected update failure for media {}",
                record.id
            )));
        }
        match state.media.iter_mut().find(|m| m.id == record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(WorkerError::NotFound(format!("media {}", record.id))),
        }
    }

    async fn delete_media(&self, id: Uuid) -> WorkerResult<bool> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let before = state.media.len();
        state.media.retain(|m| m.id != id);
        Ok(state.media.len() < before)
    }

    async fn find_media_by_path(&self, path: &str) -> WorkerResult<Option<MediaRecord>> {
        Ok(self.media_by_path(path))
    }

    async fn find_media_without_thumbnail(&self) -> WorkerResult<Vec<MediaRecord>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .media
            .iter()
            .filter(|m| m.thumbnail.as_deref().map_or(true, |t| t.is_empty()))
            .filter(|m| m.mime_type.starts_with("image/") || m.mime_type.starts_with("video/"))
            .cloned()
            .collect())
    }

    async fn get_pending_tasks(&self, operation: OperationType) -> WorkerResult<Vec<TaskRecord>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.operation == operation && t.status == TaskStatus::Pending)
            .cloned()
            .collect())
    }

    async fn get_task(&self, id: Uuid) -> WorkerResult<Option<TaskRecord>> {
        Ok(self.task(id))
    }

    async fn insert_task(&self, task: &TaskRecord) -> WorkerResult<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.failing_task_inserts {
            return Err(WorkerError::Internal(format!(
                "injected insert failure for task {}",
                task.id
            )));
        }
        state.tasks.push(task.clone());
        Ok(())
    }

    async fn update_task(&self, task: &TaskRecord) -> WorkerResult<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        match state.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(WorkerError::NotFound(format!("task {}", task.id))),
        }
    }
}
