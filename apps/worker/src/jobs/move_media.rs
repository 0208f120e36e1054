//! Move a media file into a category
//!
//! The file is renamed on disk first; the record is only updated once the
//! rename has succeeded. If the record update fails the file is moved back,
//! so the record keeps pointing at the file's real location.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{decode_payload, TaskProcessor};
use crate::error::{WorkerError, WorkerResult};
use crate::fs::{category_relative_path, is_plain_file_name, MediaFs};
use crate::models::{MediaStatus, OperationType, TaskRecord};
use crate::store::MediaStore;

/// Move task payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePayload {
    pub target_category_id: Option<i32>,
    /// Category path, stored with a leading `/`
    pub target_category_path: String,
    /// File name at the destination
    pub new_file_name: String,
}

/// Processor for MOVE tasks
pub struct MoveProcessor {
    store: Arc<dyn MediaStore>,
    fs: MediaFs,
}

impl MoveProcessor {
    pub fn new(store: Arc<dyn MediaStore>, fs: MediaFs) -> Self {
        Self { store, fs }
    }

    fn move_back(&self, destination: &str, original_path: &str) {
        if let Err(e) = self.fs.move_file(destination, original_path) {
            tracing::error!(
                from = %destination,
                to = %original_path,
                error = %e,
                "Failed to move file back after record update failed"
            );
        }
    }
}

#[async_trait]
impl TaskProcessor for MoveProcessor {
    fn operation(&self) -> OperationType {
        OperationType::Move
    }

    async fn process(&self, task: &TaskRecord, _cancel: &CancellationToken) -> WorkerResult<()> {
        let payload: MovePayload = decode_payload(task)?;
        if !is_plain_file_name(&payload.new_file_name) {
            return Err(WorkerError::InvalidPayload(format!(
                "newFileName must be a plain file name, got {:?}",
                payload.new_file_name
            )));
        }

        let mut media = self
            .store
            .get_media(task.media_id)
            .await?
            .ok_or_else(|| WorkerError::NotFound(format!("media {}", task.media_id)))?;

        let destination =
            category_relative_path(&payload.target_category_path, &payload.new_file_name);

        tracing::info!(
            media_id = %media.id,
            from = %media.path,
            to = %destination,
            "Moving media file"
        );

        self.fs.move_file(&media.path, &destination)?;

        let original_path = media.path.clone();
        media.name = payload.new_file_name;
        media.path = destination.clone();
        media.category_id = payload.target_category_id;
        media.set_status(MediaStatus::Available);
        if let Err(e) = self.store.update_media(&media).await {
            self.move_back(&destination, &original_path);
            return Err(e);
        }

        Ok(())
    }
}
