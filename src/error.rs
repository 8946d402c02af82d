use std::time::Duration;

use thiserror::Error;

/// Reasons a transcode request is refused before or while waiting for a worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// Upload exceeds the configured maximum (should map to HTTP 413)
    #[error("Upload too large: {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: u64, max: u64 },

    /// Declared content type is not in the allow-list (should map to HTTP 415)
    #[error("Unsupported content type: {content_type}")]
    UnsupportedType { content_type: String },

    /// In-flight plus queued requests reached the bound (should map to HTTP 503)
    #[error("Transcode queue is full ({bound} requests in flight)")]
    QueueFull { bound: usize },

    /// No result arrived within the per-request timeout (should map to HTTP 504)
    #[error("Transcode timed out after {}ms", after.as_millis())]
    Timeout { after: Duration },

    /// The worker pool has been shut down
    #[error("Transcode pool is shut down")]
    Closed,
}

/// Errors raised by an image codec while decoding or re-encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input is not an image format the decoder understands
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Input claims a known format but cannot be decoded
    #[error("Corrupt image data: {0}")]
    CorruptInput(String),

    /// Encoder rejected the decoded image or failed internally
    #[error("Encoder failure: {0}")]
    EncoderFailure(String),
}

/// Errors from the accounting persistence sink.
///
/// These never leave the outcome logger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// Sink cannot be reached (connection refused, pool timed out, ...)
    #[error("Accounting store unavailable: {0}")]
    Unavailable(String),

    /// Sink was reached but rejected the write
    #[error("Accounting write failed: {0}")]
    WriteFailed(String),
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => PersistenceError::Unavailable(err.to_string()),
            other => PersistenceError::WriteFailed(other.to_string()),
        }
    }
}
