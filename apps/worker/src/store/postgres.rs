//! PostgreSQL-backed [`MediaStore`]

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use mediashelf_shared_config::DatabaseConfig;

use super::MediaStore;
use crate::error::{WorkerError, WorkerResult};
use crate::models::{MediaRecord, OperationType, TaskRecord};

const MEDIA_COLUMNS: &str = "id, name, mime_type, size_bytes, status, category_id, file_path, \
     width, height, duration_ms, thumbnail, content_hash, metadata, updated_at";

const TASK_COLUMNS: &str = "id, media_id, operation, status, payload, error_message, created_at";

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS media_files (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        mime_type TEXT NOT NULL,
        size_bytes BIGINT NOT NULL,
        status TEXT NOT NULL,
        category_id INTEGER,
        file_path TEXT NOT NULL UNIQUE,
        width INTEGER,
        height INTEGER,
        duration_ms BIGINT,
        thumbnail TEXT,
        content_hash TEXT,
        metadata TEXT,
        updated_at TIMESTAMPTZ NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS media_tasks (
        id UUID PRIMARY KEY,
        media_id UUID NOT NULL,
        operation TEXT NOT NULL,
        status TEXT NOT NULL,
        payload JSONB NOT NULL,
        error_message TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS media_tasks_pending_idx ON media_tasks (operation, status, created_at)",
];

/// Media row as stored
#[derive(Debug, sqlx::FromRow)]
struct MediaRow {
    id: Uuid,
    name: String,
    mime_type: String,
    size_bytes: i64,
    status: String,
    category_id: Option<i32>,
    file_path: String,
    width: Option<i32>,
    height: Option<i32>,
    duration_ms: Option<i64>,
    thumbnail: Option<String>,
    content_hash: Option<String>,
    metadata: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MediaRow> for MediaRecord {
    type Error = WorkerError;

    fn try_from(row: MediaRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            mime_type: row.mime_type,
            size_bytes: row.size_bytes,
            status: row.status.parse()?,
            category_id: row.category_id,
            path: row.file_path,
            width: row.width,
            height: row.height,
            duration_ms: row.duration_ms,
            thumbnail: row.thumbnail,
            content_hash: row.content_hash,
            metadata: row.metadata,
            updated_at: row.updated_at,
        })
    }
}

/// Task row as stored
#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    media_id: Uuid,
    operation: String,
    status: String,
    payload: Json<serde_json::Value>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for TaskRecord {
    type Error = WorkerError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            media_id: row.media_id,
            operation: row.operation.parse()?,
            status: row.status.parse()?,
            payload: row.payload.0,
            error_message: row.error_message,
            created_at: row.created_at,
        })
    }
}

/// Store backed by a Postgres connection pool
#[derive(Clone)]
pub struct PgMediaStore {
    pool: PgPool,
}

impl PgMediaStore {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool with the configured limits
    pub async fn connect(config: &DatabaseConfig) -> WorkerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await?;
        tracing::info!("Database connection established");
        Ok(Self::new(pool))
    }

    /// Create the media and task tables if they are missing
    pub async fn ensure_schema(&self) -> WorkerResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn fetch_media(&self, sql: &str, bind: Option<&str>) -> WorkerResult<Vec<MediaRecord>> {
        let mut query = sqlx::query_as::<_, MediaRow>(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(MediaRecord::try_from)
            .collect()
    }
}

#[async_trait]
impl MediaStore for PgMediaStore {
    async fn get_media(&self, id: Uuid) -> WorkerResult<Option<MediaRecord>> {
        let sql = format!("SELECT {} FROM media_files WHERE id = $1", MEDIA_COLUMNS);
        sqlx::query_as::<_, MediaRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(MediaRecord::try_from)
            .transpose()
    }

    async fn get_media_batch(&self, ids: &[Uuid]) -> WorkerResult<Vec<MediaRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {} FROM media_files WHERE id = ANY($1)", MEDIA_COLUMNS);
        sqlx::query_as::<_, MediaRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(MediaRecord::try_from)
            .collect()
    }

    async fn insert_media(&self, record: &MediaRecord) -> WorkerResult<()> {
        sqlx::query(
            r#"INSERT INTO media_files
                (id, name, mime_type, size_bytes, status, category_id, file_path,
                 width, height, duration_ms, thumbnail, content_hash, metadata, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.mime_type)
        .bind(record.size_bytes)
        .bind(record.status.as_str())
        .bind(record.category_id)
        .bind(&record.path)
        .bind(record.width)
        .bind(record.height)
        .bind(record.duration_ms)
        .bind(&record.thumbnail)
        .bind(&record.content_hash)
        .bind(&record.metadata)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_media(&self, record: &MediaRecord) -> WorkerResult<()> {
        let result = sqlx::query(
            r#"UPDATE media_files SET
                name = $2, mime_type = $3, size_bytes = $4, status = $5, category_id = $6,
                file_path = $7, width = $8, height = $9, duration_ms = $10, thumbnail = $11,
                content_hash = $12, metadata = $13, updated_at = $14
            WHERE id = $1"#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.mime_type)
        .bind(record.size_bytes)
        .bind(record.status.as_str())
        .bind(record.category_id)
        .bind(&record.path)
        .bind(record.width)
        .bind(record.height)
        .bind(record.duration_ms)
        .bind(&record.thumbnail)
        .bind(&record.content_hash)
        .bind(&record.metadata)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WorkerError::NotFound(format!("media {}", record.id)));
        }
        Ok(())
    }

    async fn delete_media(&self, id: Uuid) -> WorkerResult<bool> {
        let result = sqlx::query("DELETE FROM media_files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_media_by_path(&self, path: &str) -> WorkerResult<Option<MediaRecord>> {
        let sql = format!("SELECT {} FROM media_files WHERE file_path = $1", MEDIA_COLUMNS);
        Ok(self.fetch_media(&sql, Some(path)).await?.into_iter().next())
    }

    async fn find_media_without_thumbnail(&self) -> WorkerResult<Vec<MediaRecord>> {
        let sql = format!(
            r#"SELECT {} FROM media_files
            WHERE (thumbnail IS NULL OR thumbnail = '')
              AND (mime_type LIKE 'image/%' OR mime_type LIKE 'video/%')
            ORDER BY updated_at ASC"#,
            MEDIA_COLUMNS
        );
        self.fetch_media(&sql, None).await
    }

    async fn get_pending_tasks(&self, operation: OperationType) -> WorkerResult<Vec<TaskRecord>> {
        let sql = format!(
            "SELECT {} FROM media_tasks WHERE operation = $1 AND status = 'PENDING' ORDER BY created_at ASC, id ASC",
            TASK_COLUMNS
        );
        sqlx::query_as::<_, TaskRow>(&sql)
            .bind(operation.as_str())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(TaskRecord::try_from)
            .collect()
    }

    async fn get_task(&self, id: Uuid) -> WorkerResult<Option<TaskRecord>> {
        let sql = format!("SELECT {} FROM media_tasks WHERE id = $1", TASK_COLUMNS);
        sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(TaskRecord::try_from)
            .transpose()
    }

    async fn insert_task(&self, task: &TaskRecord) -> WorkerResult<()> {
        sqlx::query(
            r#"INSERT INTO media_tasks (id, media_id, operation, status, payload, error_message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(task.id)
        .bind(task.media_id)
        .bind(task.operation.as_str())
        .bind(task.status.as_str())
        .bind(Json(&task.payload))
        .bind(&task.error_message)
        .bind(task.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_task(&self, task: &TaskRecord) -> WorkerResult<()> {
        let result = sqlx::query(
            "UPDATE media_tasks SET status = $2, payload = $3, error_message = $4 WHERE id = $1",
        )
        .bind(task.id)
        .bind(task.status.as_str())
        .bind(Json(&task.payload))
        .bind(&task.error_message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WorkerError::NotFound(format!("task {}", task.id)));
        }
        Ok(())
    }
}
