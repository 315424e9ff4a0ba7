//! Error types for datacat.

use thiserror::Error;
use uuid::Uuid;

use crate::models::JobType;

/// Result type alias using datacat's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for datacat operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Relational store operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Key-value job store operation failed
    #[error("Job store error: {0}")]
    Store(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// No handler registered for a job type
    #[error("No handler registered for job type: {0}")]
    HandlerNotFound(JobType),

    /// Job could not be submitted (store unavailable)
    #[error("Submission failed: {0}")]
    Submission(String),

    /// Dataset profiling failed
    #[error("Profiling error: {0}")]
    Profiling(String),

    /// Dataset file format is not supported
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Store(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_job_not_found() {
        let id = Uuid::nil();
        let err = Error::JobNotFound(id);
        assert_eq!(err.to_string(), format!("Job not found: {}", id));
    }

    #[test]
    fn test_error_display_handler_not_found() {
        let err = Error::HandlerNotFound(JobType::ProcessDataset);
        assert_eq!(
            err.to_string(),
            "No handler registered for job type: process_dataset"
        );
    }

    #[test]
    fn test_error_display_submission() {
        let err = Error::Submission("connection refused".to_string());
        assert_eq!(err.to_string(), "Submission failed: connection refused");
    }

    #[test]
    fn test_error_display_unsupported_format() {
        let err = Error::UnsupportedFormat(".xlsx".to_string());
        assert_eq!(err.to_string(), "Unsupported file format: .xlsx");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(msg) if !msg.is_empty()));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
