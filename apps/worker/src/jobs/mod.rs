//! Job handlers
//!
//! This module contains the work the managers drive:
//! - Library scanning and indexing
//! - Queued per-file operations (move, delete, transcode)
//! - Batch maintenance (thumbnails, video container normalization)

pub mod delete_media;
pub mod library_scan;
pub mod move_media;
pub mod normalize;
pub mod thumbnail;
pub mod transcode;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{WorkerError, WorkerResult};
use crate::models::{OperationType, TaskRecord};

/// Executes queued tasks of one operation type
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    /// The operation this processor handles
    fn operation(&self) -> OperationType;

    /// Carry out one task. The caller owns the task's status transitions.
    async fn process(&self, task: &TaskRecord, cancel: &CancellationToken) -> WorkerResult<()>;
}

/// Processors keyed by the operation they handle
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<OperationType, Arc<dyn TaskProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor, replacing any previous one for its operation
    pub fn register(&mut self, processor: Arc<dyn TaskProcessor>) -> &mut Self {
        self.processors.insert(processor.operation(), processor);
        self
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, processor: Arc<dyn TaskProcessor>) -> Self {
        self.register(processor);
        self
    }

    /// Processor for `operation`, or `ProcessorNotRegistered`
    pub fn get(&self, operation: OperationType) -> WorkerResult<Arc<dyn TaskProcessor>> {
        self.processors
            .get(&operation)
            .cloned()
            .ok_or(WorkerError::ProcessorNotRegistered(operation))
    }

    pub fn contains(&self, operation: OperationType) -> bool {
        self.processors.contains_key(&operation)
    }
}

/// Outcome counters for a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: u64,
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Decode a task payload into the processor's parameter type
pub(crate) fn decode_payload<T>(task: &TaskRecord) -> WorkerResult<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(task.payload.clone())
        .map_err(|e| WorkerError::invalid_payload(task.operation, e))
}
