//! Domain records shared by the scanner, processors and job managers
//!
//! Status enums are stored as their SCREAMING_SNAKE_CASE names, both in
//! the database and in serialized progress snapshots.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkerError;

/// Declares a string-backed status enum with `as_str`, `Display` and `FromStr`.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Stored name of this value
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = WorkerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(WorkerError::InvalidState(format!(
                        "unknown {} value: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

string_enum! {
    /// Lifecycle status of a media file
    MediaStatus {
        PendingClassification => "PENDING_CLASSIFICATION",
        Available => "AVAILABLE",
        Processing => "PROCESSING",
        Locked => "LOCKED",
        MarkedForDeletion => "MARKED_FOR_DELETION",
        Archived => "ARCHIVED",
        Error => "ERROR",
    }
}

string_enum! {
    /// Kind of a queued file operation
    OperationType {
        Move => "MOVE",
        Delete => "DELETE",
        Transcode => "TRANSCODE",
    }
}

string_enum! {
    /// Status of a queued operation
    TaskStatus {
        Pending => "PENDING",
        Processing => "PROCESSING",
        Completed => "COMPLETED",
        Failed => "FAILED",
        Cancelled => "CANCELLED",
    }
}

string_enum! {
    /// Runs the task manager can start
    TaskKind {
        Move => "MOVE",
        Delete => "DELETE",
        Transcode => "TRANSCODE",
        Thumbnail => "THUMBNAIL",
        NormalizeVideo => "NORMALIZE_VIDEO",
    }
}

string_enum! {
    /// Tag recorded on a progress snapshot
    JobKind {
        Scan => "SCAN",
        Move => "MOVE",
        Delete => "DELETE",
        Transcode => "TRANSCODE",
        Thumbnail => "THUMBNAIL",
        NormalizeVideo => "NORMALIZE_VIDEO",
    }
}

string_enum! {
    /// Status of a job manager's current (or last) run
    JobStatus {
        Idle => "IDLE",
        Running => "RUNNING",
        Completed => "COMPLETED",
        Canceled => "CANCELED",
        Failed => "FAILED",
    }
}

impl TaskKind {
    /// Queue-driven kinds map to the operation whose pending tasks they drain
    pub fn operation(self) -> Option<OperationType> {
        match self {
            Self::Move => Some(OperationType::Move),
            Self::Delete => Some(OperationType::Delete),
            Self::Transcode => Some(OperationType::Transcode),
            Self::Thumbnail | Self::NormalizeVideo => None,
        }
    }
}

impl From<TaskKind> for JobKind {
    fn from(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Move => Self::Move,
            TaskKind::Delete => Self::Delete,
            TaskKind::Transcode => Self::Transcode,
            TaskKind::Thumbnail => Self::Thumbnail,
            TaskKind::NormalizeVideo => Self::NormalizeVideo,
        }
    }
}

impl JobStatus {
    /// Completed, canceled and failed runs are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Failed)
    }
}

/// One indexed media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: Uuid,
    /// File name including extension
    pub name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub status: MediaStatus,
    /// Owning category, if the file has been classified
    pub category_id: Option<i32>,
    /// Path relative to the media root, `/`-separated
    pub path: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_ms: Option<i64>,
    /// Thumbnail path relative to the media root
    pub thumbnail: Option<String>,
    /// Lowercase hex SHA-256 of the file contents
    pub content_hash: Option<String>,
    /// Raw probe output for audio/video files
    pub metadata: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRecord {
    /// New unclassified record for a file at `path`
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            mime_type: crate::media_type::OCTET_STREAM.to_string(),
            size_bytes: 0,
            status: MediaStatus::PendingClassification,
            category_id: None,
            path: path.into(),
            width: None,
            height: None,
            duration_ms: None,
            thumbnail: None,
            content_hash: None,
            metadata: None,
            updated_at: Utc::now(),
        }
    }

    /// Set the status and bump the update timestamp
    pub fn set_status(&mut self, status: MediaStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// A queued file operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub media_id: Uuid,
    pub operation: OperationType,
    pub status: TaskStatus,
    /// Operation-specific parameters
    pub payload: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    /// New pending task
    pub fn pending(media_id: Uuid, operation: OperationType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            media_id,
            operation,
            status: TaskStatus::Pending,
            payload,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}

/// Incremental progress reported by a running job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub total: u64,
    pub processed: u64,
    pub percentage: u8,
    /// Label of the item being worked on
    pub current: String,
}

impl ProgressUpdate {
    /// Update with the percentage derived from the counters
    pub fn new(total: u64, processed: u64, current: impl Into<String>) -> Self {
        Self {
            total,
            processed,
            percentage: percentage_of(processed, total),
            current: current.into(),
        }
    }

    /// An empty work list is immediately fully done
    pub fn empty() -> Self {
        Self {
            total: 0,
            processed: 0,
            percentage: 100,
            current: String::new(),
        }
    }
}

/// `floor(processed * 100 / total)`, 0 when there is no work, capped at 100
pub fn percentage_of(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = processed.saturating_mul(100) / total;
    pct.min(100) as u8
}

/// Observable state of a job manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub kind: Option<JobKind>,
    pub status: JobStatus,
    pub total: u64,
    pub processed: u64,
    pub percentage: u8,
    pub current: String,
    pub message: String,
}

impl ProgressState {
    /// State before any run
    pub fn idle(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            status: JobStatus::Idle,
            total: 0,
            processed: 0,
            percentage: 0,
            current: String::new(),
            message: message.into(),
        }
    }

    /// Fresh state for a run that was just accepted
    pub fn running(kind: JobKind, message: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            status: JobStatus::Running,
            total: 0,
            processed: 0,
            percentage: 0,
            current: String::new(),
            message: message.into(),
        }
    }

    /// Copy counters from an update
    pub fn apply(&mut self, update: ProgressUpdate) {
        self.total = update.total;
        self.processed = update.processed;
        self.percentage = update.percentage;
        self.current = update.current;
    }

    /// Successful end: the whole work list counts as processed
    pub fn complete(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Completed;
        self.processed = self.total;
        self.percentage = 100;
        self.current.clear();
        self.message = message.into();
    }

    /// Canceled end, counters keep their last values
    pub fn cancel(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Canceled;
        self.current.clear();
        self.message = message.into();
    }

    /// Failed end, counters keep their last values
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.current.clear();
        self.message = message.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, 0)]
    #[case(0, 10, 0)]
    #[case(1, 3, 33)]
    #[case(2, 3, 66)]
    #[case(3, 3, 100)]
    #[case(7, 3, 100)]
    fn test_percentage_of(#[case] processed: u64, #[case] total: u64, #[case] expected: u8) {
        assert_eq!(percentage_of(processed, total), expected);
    }

    #[test]
    fn test_status_names_round_trip_through_str() {
        assert_eq!(MediaStatus::PendingClassification.as_str(), "PENDING_CLASSIFICATION");
        assert_eq!("MARKED_FOR_DELETION".parse::<MediaStatus>().unwrap(), MediaStatus::MarkedForDeletion);
        assert_eq!(TaskKind::NormalizeVideo.to_string(), "NORMALIZE_VIDEO");
        assert!("moved".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_task_kind_operation_mapping() {
        assert_eq!(TaskKind::Delete.operation(), Some(OperationType::Delete));
        assert_eq!(TaskKind::Thumbnail.operation(), None);
        assert_eq!(JobKind::from(TaskKind::NormalizeVideo), JobKind::NormalizeVideo);
    }

    #[test]
    fn test_complete_sets_full_progress() {
        let mut state = ProgressState::running(JobKind::Scan, "Starting");
        state.apply(ProgressUpdate::new(4, 2, "b.jpg"));
        assert_eq!(state.percentage, 50);

        state.complete("Done");
        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.processed, 4);
        assert_eq!(state.percentage, 100);
        assert!(state.current.is_empty());
    }

    #[test]
    fn test_cancel_keeps_counters() {
        let mut state = ProgressState::running(JobKind::Move, "Starting");
        state.apply(ProgressUpdate::new(10, 3, "task"));
        state.cancel("Stopped");
        assert_eq!(state.status, JobStatus::Canceled);
        assert_eq!(state.processed, 3);
        assert_eq!(state.percentage, 30);
    }

    #[test]
    fn test_progress_state_serializes_camel_case() {
        let state = ProgressState::running(JobKind::Thumbnail, "go");
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["kind"], "THUMBNAIL");
        assert_eq!(json["status"], "RUNNING");
        assert_eq!(json["percentage"], 0);
    }
}
