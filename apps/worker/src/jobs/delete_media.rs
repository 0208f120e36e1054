//! Delete a media file, its thumbnail and its record
//!
//! Deleting something that is already gone counts as success, so a retried
//! delete converges instead of failing.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::TaskProcessor;
use crate::error::{WorkerError, WorkerResult};
use crate::fs::MediaFs;
use crate::models::{OperationType, TaskRecord};
use crate::store::MediaStore;

/// Delete task payload; informational only, the record is authoritative
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePayload {
    pub original_file_path: Option<String>,
}

/// Processor for DELETE tasks
pub struct DeleteProcessor {
    store: Arc<dyn MediaStore>,
    fs: MediaFs,
}

impl DeleteProcessor {
    pub fn new(store: Arc<dyn MediaStore>, fs: MediaFs) -> Self {
        Self { store, fs }
    }

    fn remove_if_present(&self, relative: &str) -> WorkerResult<()> {
        match self.fs.delete_file(relative) {
            Ok(()) => Ok(()),
            Err(WorkerError::NotFound(_)) => {
                tracing::warn!(path = relative, "File already gone, continuing delete");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TaskProcessor for DeleteProcessor {
    fn operation(&self) -> OperationType {
        OperationType::Delete
    }

    async fn process(&self, task: &TaskRecord, _cancel: &CancellationToken) -> WorkerResult<()> {
        let Some(media) = self.store.get_media(task.media_id).await? else {
            tracing::info!(media_id = %task.media_id, "Media already deleted");
            return Ok(());
        };

        self.remove_if_present(&media.path)?;

        if let Some(thumbnail) = media.thumbnail.as_deref().filter(|t| !t.trim().is_empty()) {
            self.remove_if_present(thumbnail)?;
        }

        self.store.delete_media(media.id).await?;
        tracing::info!(media_id = %media.id, path = %media.path, "Deleted media file");
        Ok(())
    }
}
