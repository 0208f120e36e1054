//! Metadata extractor stand-in

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mediashelf_worker::metadata::{ExtractedMetadata, MetadataExtractor};
use mediashelf_worker::{WorkerError, WorkerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Behavior {
    #[default]
    Return,
    Fail,
    /// Park until the token fires, then report cancellation
    BlockUntilCancelled,
}

/// Extractor returning the same metadata for every file
///
/// Records every path it was asked about, so tests can assert which files
/// reached extraction.
#[derive(Clone, Default)]
pub struct StaticMetadataExtractor {
    metadata: ExtractedMetadata,
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
    seen: Arc<RwLock<Vec<PathBuf>>>,
}

impl StaticMetadataExtractor {
    /// Extractor returning empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor returning the given metadata
    pub fn returning(metadata: ExtractedMetadata) -> Self {
        Self {
            metadata,
            ..Self::default()
        }
    }

    /// Extractor failing every call with an internal error
    pub fn failing() -> Self {
        Self {
            behavior: Behavior::Fail,
            ..Self::default()
        }
    }

    /// Extractor that waits for cancellation on every call
    pub fn blocking() -> Self {
        Self {
            behavior: Behavior::BlockUntilCancelled,
            ..Self::default()
        }
    }

    /// Number of extraction calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Paths passed to `extract`, in call order
    pub fn seen_paths(&self) -> Vec<PathBuf> {
        self.seen.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl MetadataExtractor for StaticMetadataExtractor {
    async fn extract(
        &self,
        path: &Path,
        _mime_type: &str,
        cancel: &CancellationToken,
    ) -> WorkerResult<ExtractedMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.to_path_buf());

        match self.behavior {
            Behavior::Return => Ok(self.metadata.clone()),
            Behavior::Fail => Err(WorkerError::Internal(format!(
                "extraction failed for {}",
                path.display()
            ))),
            Behavior::BlockUntilCancelled => {
                cancel.cancelled().await;
                Err(WorkerError::Cancelled(format!(
                    "extraction of {} cancelled",
                    path.display()
                )))
            }
        }
    }
}
