//! Persistence seam for media and task records
//!
//! The worker only talks to storage through [`MediaStore`]; the Postgres
//! implementation lives in [`postgres`], and tests use an in-memory one.

pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::WorkerResult;
use crate::models::{MediaRecord, OperationType, TaskRecord};

pub use postgres::PgMediaStore;

/// Media and task record storage
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Look up one media record
    async fn get_media(&self, id: Uuid) -> WorkerResult<Option<MediaRecord>>;

    /// Look up several media records; unknown ids are skipped
    async fn get_media_batch(&self, ids: &[Uuid]) -> WorkerResult<Vec<MediaRecord>>;

    async fn insert_media(&self, record: &MediaRecord) -> WorkerResult<()>;

    async fn update_media(&self, record: &MediaRecord) -> WorkerResult<()>;

    /// Remove a media record, returning whether it existed
    async fn delete_media(&self, id: Uuid) -> WorkerResult<bool>;

    /// Find the record for a root-relative path
    async fn find_media_by_path(&self, path: &str) -> WorkerResult<Option<MediaRecord>>;

    /// Image and video records that have no thumbnail yet
    async fn find_media_without_thumbnail(&self) -> WorkerResult<Vec<MediaRecord>>;

    /// Pending tasks of one operation, oldest first
    async fn get_pending_tasks(&self, operation: OperationType) -> WorkerResult<Vec<TaskRecord>>;

    async fn get_task(&self, id: Uuid) -> WorkerResult<Option<TaskRecord>>;

    async fn insert_task(&self, task: &TaskRecord) -> WorkerResult<()>;

    async fn update_task(&self, task: &TaskRecord) -> WorkerResult<()>;
}
