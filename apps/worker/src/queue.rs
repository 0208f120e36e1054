//! Task enqueueing
//!
//! The producer side of the task queue: validates a request against the
//! media record, marks the record, and inserts a PENDING task whose
//! payload the matching processor understands.

use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{WorkerError, WorkerResult};
use crate::fs::{category_relative_path, is_plain_file_name};
use crate::jobs::delete_media::DeletePayload;
use crate::jobs::move_media::MovePayload;
use crate::jobs::transcode::TranscodePayload;
use crate::media_type::MediaKind;
use crate::models::{MediaRecord, MediaStatus, OperationType, TaskRecord};
use crate::store::MediaStore;
use crate::transcode_args::EncodeParameters;

/// Request to move a media file into a category
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveRequest {
    pub category_id: Option<i32>,
    /// Category path as stored, e.g. `/Movies/2024`
    pub category_path: String,
    /// New file name; the current name when absent
    pub rename: Option<String>,
}

/// Request to transcode a video into a new file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscodeRequest {
    pub media_id: Uuid,
    /// Output file name; `<stem>.<container>` when absent
    pub output_file_name: Option<String>,
    pub category_id: Option<i32>,
    /// Destination category path; the media root when absent
    pub category_path: Option<String>,
    pub parameters: EncodeParameters,
}

/// Creates queued tasks
#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<dyn MediaStore>,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn MediaStore>) -> Self {
        Self { store }
    }

    /// Queue a move; the media is marked PROCESSING until the task settles
    pub async fn enqueue_move(&self, media_id: Uuid, request: MoveRequest) -> WorkerResult<TaskRecord> {
        let mut media = self.load_movable(media_id).await?;

        let new_file_name = request
            .rename
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| media.name.clone());
        if !is_plain_file_name(&new_file_name) {
            return Err(WorkerError::InvalidPath(format!(
                "{:?} is not a plain file name",
                new_file_name
            )));
        }

        let payload = MovePayload {
            target_category_id: request.category_id,
            target_category_path: request.category_path,
            new_file_name,
        };
        let task = TaskRecord::pending(media.id, OperationType::Move, serde_json::to_value(&payload)?);

        self.claim(&mut media, MediaStatus::Processing, &task).await?;
        tracing::info!(task_id = %task.id, media_id = %media.id, "Move task queued");
        Ok(task)
    }

    /// Queue a delete. Media already marked for deletion is skipped.
    pub async fn enqueue_delete(&self, media_id: Uuid) -> WorkerResult<Option<TaskRecord>> {
        let mut media = self.load_movable(media_id).await?;
        if media.status == MediaStatus::MarkedForDeletion {
            tracing::debug!(media_id = %media.id, "Delete already queued");
            return Ok(None);
        }

        let payload = DeletePayload {
            original_file_path: Some(media.path.clone()),
        };
        let task = TaskRecord::pending(media.id, OperationType::Delete, serde_json::to_value(&payload)?);

        self.claim(&mut media, MediaStatus::MarkedForDeletion, &task).await?;
        tracing::info!(task_id = %task.id, media_id = %media.id, "Delete task queued");
        Ok(Some(task))
    }

    /// Queue a transcode of a video into a new file
    pub async fn enqueue_transcode(&self, request: TranscodeRequest) -> WorkerResult<TaskRecord> {
        let mut media = self.load_movable(request.media_id).await?;
        if MediaKind::from_mime(&media.mime_type) != MediaKind::Video {
            return Err(WorkerError::InvalidState(format!(
                "media {} is {}, only videos can be transcoded",
                media.id, media.mime_type
            )));
        }

        let output_file_name = match request.output_file_name.filter(|n| !n.trim().is_empty()) {
            Some(name) => name,
            None => default_output_name(&media.name, request.parameters.container.as_deref()),
        };
        if !is_plain_file_name(&output_file_name) {
            return Err(WorkerError::InvalidPath(format!(
                "{:?} is not a plain file name",
                output_file_name
            )));
        }

        let category_path = request.category_path.unwrap_or_else(|| "/".to_string());
        let destination = category_relative_path(&category_path, &output_file_name);
        if self.store.find_media_by_path(&destination).await?.is_some() {
            return Err(WorkerError::AlreadyExists(destination));
        }

        let payload = TranscodePayload {
            source_file_path: media.path.clone(),
            output_file_name,
            output_category_id: request.category_id,
            output_category_path: Some(category_path),
            parameters: request.parameters,
        };
        let task = TaskRecord::pending(
            media.id,
            OperationType::Transcode,
            serde_json::to_value(&payload)?,
        );

        self.claim(&mut media, MediaStatus::Processing, &task).await?;
        tracing::info!(task_id = %task.id, media_id = %media.id, "Transcode task queued");
        Ok(task)
    }

    /// Mark `media` with `status` and store its task. The previous status
    /// is put back when the task cannot be stored.
    async fn claim(
        &self,
        media: &mut MediaRecord,
        status: MediaStatus,
        task: &TaskRecord,
    ) -> WorkerResult<()> {
        let previous = media.status;
        media.set_status(status);
        self.store.update_media(media).await?;

        if let Err(e) = self.store.insert_task(task).await {
            media.set_status(previous);
            if let Err(revert) = self.store.update_media(media).await {
                tracing::error!(
                    media_id = %media.id,
                    error = %revert,
                    "Failed to restore media status after task insert failed"
                );
            }
            return Err(e);
        }
        Ok(())
    }

    /// Existing media that no other operation currently holds
    async fn load_movable(&self, media_id: Uuid) -> WorkerResult<MediaRecord> {
        let media = self
            .store
            .get_media(media_id)
            .await?
            .ok_or_else(|| WorkerError::NotFound(format!("media {}", media_id)))?;

        match media.status {
            MediaStatus::Processing | MediaStatus::Locked => Err(WorkerError::InvalidState(format!(
                "media {} is {}",
                media.id, media.status
            ))),
            _ => Ok(media),
        }
    }
}

/// `<stem>.<container>`, or the source name when no container is given
fn default_output_name(source_name: &str, container: Option<&str>) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_name.to_string());
    match container.map(str::trim).filter(|c| !c.is_empty()) {
        Some(container) => format!("{}.{}", stem, container.trim_start_matches('.')),
        None => source_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("clip.mkv", Some("mp4"), "clip.mp4")]
    #[case("clip.mkv", Some(".webm"), "clip.webm")]
    #[case("clip.final.avi", Some("mp4"), "clip.final.mp4")]
    #[case("clip.mkv", None, "clip.mkv")]
    #[case("clip.mkv", Some(" "), "clip.mkv")]
    fn test_default_output_name(
        #[case] source: &str,
        #[case] container: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(default_output_name(source, container), expected);
    }
}
