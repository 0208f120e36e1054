//! Error handling for the mediashelf worker
//!
//! This module provides a unified error type hierarchy using thiserror
//! for job execution, with variants grouped by the layer that raises them.

use thiserror::Error;

use crate::models::OperationType;

/// Main worker error type
#[derive(Error, Debug)]
pub enum WorkerError {
    // ========== Path & Filesystem Errors ==========
    /// Empty, blank or otherwise unusable path input
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Path resolves outside the media root
    #[error("path escapes media root: {0}")]
    PathTraversal(String),

    /// Resource not found (file, directory, record or tool binary)
    #[error("not found: {0}")]
    NotFound(String),

    /// Move destination or created file already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Directory operation pointed at something else
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Underlying I/O failure
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    // ========== External Tool Errors ==========
    /// External program exited unsuccessfully
    #[error("{tool} exited with code {exit_code}: {output}")]
    ExternalToolFailed {
        tool: String,
        exit_code: i32,
        output: String,
    },

    // ========== Job Lifecycle Errors ==========
    /// Execution stopped by a cancellation request
    #[error("job cancelled: {0}")]
    Cancelled(String),

    /// A job is already running on this manager
    #[error("a {0} job is already running")]
    AlreadyRunning(String),

    /// Queue run needs a processor that was never registered
    #[error("no processor registered for {0} tasks")]
    ProcessorNotRegistered(OperationType),

    /// Task payload is missing fields or malformed
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Record is in a state that does not allow the requested change
    #[error("invalid state: {0}")]
    InvalidState(String),

    // ========== Storage & Encoding Errors ==========
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Image decoding or encoding failed
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    // ========== Configuration Errors ==========
    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    // ========== Internal Errors ==========
    /// Internal worker error (catch-all for unexpected errors)
    #[error("internal worker error: {0}")]
    Internal(String),
}

impl WorkerError {
    /// Whether this error came from a cancellation request
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Get a severity level for logging
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // Critical errors that should alert operators
            Self::Configuration(_) | Self::ProcessorNotRegistered(_) => ErrorSeverity::Critical,

            // Errors that indicate service issues
            Self::Database(_) | Self::Io(_) | Self::Internal(_) => ErrorSeverity::Error,

            // Rejected or failed work that the caller can act on
            Self::PathTraversal(_)
            | Self::ExternalToolFailed { .. }
            | Self::Image(_)
            | Self::Cancelled(_) => ErrorSeverity::Warning,

            // Info level for normal processing issues
            _ => ErrorSeverity::Info,
        }
    }

    /// Log the error with appropriate severity
    pub fn log(&self) {
        match self.severity() {
            ErrorSeverity::Critical => {
                tracing::error!(error = %self, "Critical worker error");
            }
            ErrorSeverity::Error => {
                tracing::error!(error = %self, "Worker error");
            }
            ErrorSeverity::Warning => {
                tracing::warn!(error = %self, "Worker warning");
            }
            ErrorSeverity::Info => {
                tracing::info!(error = %self, "Worker info");
            }
        }
    }

    /// Create an external tool failure
    pub fn external_tool_failed(
        tool: impl Into<String>,
        exit_code: i32,
        output: impl Into<String>,
    ) -> Self {
        Self::ExternalToolFailed {
            tool: tool.into(),
            exit_code,
            output: output.into(),
        }
    }

    /// Create an invalid payload error from a decode failure
    pub fn invalid_payload(operation: OperationType, reason: impl std::fmt::Display) -> Self {
        Self::InvalidPayload(format!("{} payload: {}", operation, reason))
    }
}

/// Error severity levels for logging and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that should trigger alerts
    Critical,
    /// Standard errors
    Error,
    /// Warnings for expected failures
    Warning,
    /// Informational messages
    Info,
}

/// Result type alias for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

// ========== Conversion Implementations ==========

impl From<mediashelf_shared_config::ConfigError> for WorkerError {
    fn from(err: mediashelf_shared_config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<tokio::task::JoinError> for WorkerError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_detection() {
        assert!(WorkerError::Cancelled("scan".to_string()).is_cancellation());
        assert!(!WorkerError::NotFound("x".to_string()).is_cancellation());
        assert!(!WorkerError::external_tool_failed("ffmpeg", 1, "").is_cancellation());
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(
            WorkerError::Configuration("test".to_string()).severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            WorkerError::ProcessorNotRegistered(OperationType::Move).severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            WorkerError::Database(sqlx::Error::PoolClosed).severity(),
            ErrorSeverity::Error
        );
        assert_eq!(
            WorkerError::PathTraversal("../etc".to_string()).severity(),
            ErrorSeverity::Warning
        );
        assert_eq!(
            WorkerError::InvalidPath(String::new()).severity(),
            ErrorSeverity::Info
        );
    }

    #[test]
    fn test_error_display() {
        let err = WorkerError::external_tool_failed("ffmpeg", 1, "Invalid data found");
        assert_eq!(err.to_string(), "ffmpeg exited with code 1: Invalid data found");

        let err = WorkerError::ProcessorNotRegistered(OperationType::Transcode);
        assert_eq!(err.to_string(), "no processor registered for TRANSCODE tasks");

        let err = WorkerError::AlreadyRunning("SCAN".to_string());
        assert_eq!(err.to_string(), "a SCAN job is already running");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: WorkerError =
            mediashelf_shared_config::ConfigError::MissingEnvVar("DATABASE_URL".to_string())
                .into();
        assert!(matches!(err, WorkerError::Configuration(msg) if msg.contains("DATABASE_URL")));
    }
}
