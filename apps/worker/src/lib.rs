//! mediashelf worker
//!
//! Background job execution for a personal media library: indexing files
//! under a confined media root, draining queued file operations, and batch
//! maintenance of thumbnails and video containers.

pub mod config;
pub mod error;
pub mod fs;
pub mod jobs;
pub mod manager;
pub mod media_type;
pub mod metadata;
pub mod models;
pub mod process;
pub mod queue;
pub mod store;
pub mod transcode_args;

use std::sync::Arc;

pub use config::{Config, ThumbnailSettings};
pub use error::{ErrorSeverity, WorkerError, WorkerResult};
pub use manager::{ScanJobManager, TaskJobManager};

use crate::fs::MediaFs;
use crate::jobs::delete_media::DeleteProcessor;
use crate::jobs::library_scan::Scanner;
use crate::jobs::move_media::MoveProcessor;
use crate::jobs::normalize::NormalizeBatch;
use crate::jobs::thumbnail::ThumbnailBatch;
use crate::jobs::transcode::TranscodeProcessor;
use crate::jobs::ProcessorRegistry;
use crate::metadata::{MetadataExtractor, ProbeMetadataExtractor};
use crate::process::ProcessRunner;
use crate::queue::TaskQueue;
use crate::store::MediaStore;

/// Shared collaborators every job is built from
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn MediaStore>,
    pub fs: MediaFs,
    pub runner: ProcessRunner,
    pub scanner: Scanner,
}

impl AppState {
    /// Build the state around a store and metadata extractor.
    ///
    /// Fails if the media root does not exist or the layout is invalid.
    pub fn new(
        config: Config,
        store: Arc<dyn MediaStore>,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> WorkerResult<Self> {
        config.layout().validate()?;
        let fs = MediaFs::new(config.media_root())?;
        let runner = ProcessRunner::new(&config.ffmpeg_path, &config.ffprobe_path);
        let scanner = Scanner::new(store.clone(), fs.clone(), extractor);
        Ok(Self {
            config,
            store,
            fs,
            runner,
            scanner,
        })
    }

    /// Build the state with the prober-backed metadata extractor
    pub fn with_probe_extractor(config: Config, store: Arc<dyn MediaStore>) -> WorkerResult<Self> {
        let runner = ProcessRunner::new(&config.ffmpeg_path, &config.ffprobe_path);
        let extractor = Arc::new(ProbeMetadataExtractor::new(runner));
        Self::new(config, store, extractor)
    }

    /// Registry holding the move, delete and transcode processors
    pub fn processor_registry(&self) -> ProcessorRegistry {
        ProcessorRegistry::new()
            .with(Arc::new(MoveProcessor::new(self.store.clone(), self.fs.clone())))
            .with(Arc::new(DeleteProcessor::new(self.store.clone(), self.fs.clone())))
            .with(Arc::new(TranscodeProcessor::new(
                self.store.clone(),
                self.fs.clone(),
                self.runner.clone(),
                self.scanner.clone(),
                self.config.layout().clone(),
            )))
    }

    pub fn thumbnail_batch(&self) -> ThumbnailBatch {
        ThumbnailBatch::new(
            self.store.clone(),
            self.fs.clone(),
            self.runner.clone(),
            self.config.thumbnails,
            self.config.layout().clone(),
        )
    }

    pub fn normalize_batch(&self) -> NormalizeBatch {
        NormalizeBatch::new(
            self.store.clone(),
            self.fs.clone(),
            self.runner.clone(),
            self.config.layout().clone(),
        )
    }

    /// Scan manager over this state's scanner. Needs a Tokio runtime.
    pub fn scan_manager(&self) -> ScanJobManager {
        ScanJobManager::new(self.scanner.clone(), self.fs.clone(), self.config.layout())
    }

    /// Task manager with every processor registered. Needs a Tokio runtime.
    pub fn task_manager(&self) -> TaskJobManager {
        self.task_manager_with(self.processor_registry())
    }

    /// Task manager with a custom processor registry. Needs a Tokio runtime.
    pub fn task_manager_with(&self, registry: ProcessorRegistry) -> TaskJobManager {
        TaskJobManager::new(
            self.store.clone(),
            registry,
            self.thumbnail_batch(),
            self.normalize_batch(),
        )
    }

    pub fn task_queue(&self) -> TaskQueue {
        TaskQueue::new(self.store.clone())
    }
}
