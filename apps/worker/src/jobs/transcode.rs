//! Transcode a media file into a new one
//!
//! Output is written to a scratch file under the temp directory and only
//! moved into its category once the transcoder has exited cleanly. The
//! result is indexed as a new, available record; the source record is
//! returned to AVAILABLE. An output that cannot be indexed is deleted again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use mediashelf_shared_config::LayoutConfig;

use super::library_scan::Scanner;
use super::{decode_payload, TaskProcessor};
use crate::error::{WorkerError, WorkerResult};
use crate::fs::{category_relative_path, is_plain_file_name, MediaFs};
use crate::models::{MediaStatus, OperationType, TaskRecord};
use crate::process::ProcessRunner;
use crate::store::MediaStore;
use crate::transcode_args::{build_transcode_args, EncodeParameters};

/// Transcode task payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodePayload {
    /// Source path relative to the media root
    pub source_file_path: String,
    pub output_file_name: String,
    pub output_category_id: Option<i32>,
    /// Destination category path; the root when absent
    pub output_category_path: Option<String>,
    #[serde(default)]
    pub parameters: EncodeParameters,
}

/// Processor for TRANSCODE tasks
pub struct TranscodeProcessor {
    store: Arc<dyn MediaStore>,
    fs: MediaFs,
    runner: ProcessRunner,
    scanner: Scanner,
    layout: LayoutConfig,
}

impl TranscodeProcessor {
    pub fn new(
        store: Arc<dyn MediaStore>,
        fs: MediaFs,
        runner: ProcessRunner,
        scanner: Scanner,
        layout: LayoutConfig,
    ) -> Self {
        Self {
            store,
            fs,
            runner,
            scanner,
            layout,
        }
    }

    async fn encode(
        &self,
        source: &Path,
        scratch: &Path,
        payload: &TranscodePayload,
        cancel: &CancellationToken,
    ) -> WorkerResult<()> {
        let args = build_transcode_args(source, scratch, &payload.parameters);
        self.runner.run(&args, cancel).await.map(|_| ())
    }

    async fn index_output(
        &self,
        final_path: &Path,
        payload: &TranscodePayload,
        cancel: &CancellationToken,
    ) -> WorkerResult<Uuid> {
        let mut output = self.scanner.process_single_file(final_path, cancel).await?;
        output.category_id = payload.output_category_id;
        output.set_status(MediaStatus::Available);
        self.store.insert_media(&output).await?;
        Ok(output.id)
    }

    /// Remove a file written by this task, ignoring one that is already gone
    fn discard(&self, relative: &str) {
        match self.fs.delete_file(relative) {
            Ok(()) => tracing::debug!(path = %relative, "Removed transcode output"),
            Err(WorkerError::NotFound(_)) => {}
            Err(e) => tracing::warn!(path = %relative, error = %e, "Failed to remove transcode output"),
        }
    }
}

#[async_trait]
impl TaskProcessor for TranscodeProcessor {
    fn operation(&self) -> OperationType {
        OperationType::Transcode
    }

    async fn process(&self, task: &TaskRecord, cancel: &CancellationToken) -> WorkerResult<()> {
        let payload: TranscodePayload = decode_payload(task)?;
        if !is_plain_file_name(&payload.output_file_name) {
            return Err(WorkerError::InvalidPayload(format!(
                "outputFileName must be a plain file name, got {:?}",
                payload.output_file_name
            )));
        }

        let source = self.fs.resolve_safely(&payload.source_file_path)?;
        if !source.is_file() {
            return Err(WorkerError::NotFound(payload.source_file_path.clone()));
        }

        let category_path = payload.output_category_path.as_deref().unwrap_or("/");
        let destination = category_relative_path(category_path, &payload.output_file_name);
        if self.fs.resolve_safely(&destination)?.exists() {
            return Err(WorkerError::AlreadyExists(destination));
        }

        let temp_dir = self.fs.create_directory(&self.layout.temp_dir)?;
        let scratch: PathBuf =
            temp_dir.join(format!("{}_{}", Uuid::new_v4(), payload.output_file_name));

        tracing::info!(
            task_id = %task.id,
            source = %payload.source_file_path,
            destination = %destination,
            "Starting transcode"
        );

        let scratch_relative = self.fs.relative_path(&scratch)?;
        if let Err(e) = self.encode(&source, &scratch, &payload, cancel).await {
            self.discard(&scratch_relative);
            return Err(e);
        }

        let final_path = match self.fs.move_file(&scratch_relative, &destination) {
            Ok(path) => path,
            Err(e) => {
                self.discard(&scratch_relative);
                return Err(e);
            }
        };

        let output_id = match self.index_output(&final_path, &payload, cancel).await {
            Ok(id) => id,
            Err(e) => {
                self.discard(&destination);
                return Err(e);
            }
        };

        if let Some(mut original) = self.store.get_media(task.media_id).await? {
            original.set_status(MediaStatus::Available);
            self.store.update_media(&original).await?;
        }

        tracing::info!(task_id = %task.id, output_id = %output_id, "Transcode finished");
        Ok(())
    }
}
