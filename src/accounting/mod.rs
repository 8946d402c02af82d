//! Compression accounting.
//!
//! Every admitted transcode produces one [`AccountingRecord`] describing how
//! many bytes were saved. Records flow through the [`OutcomeLogger`], which
//! decouples persistence from the request path: a slow or unavailable store
//! degrades accounting, never responses.
//!
//! # Components
//!
//! - [`AccountingRecord`]: One row of size-savings data
//! - [`OutcomeLogger`]: Fire-and-forget handle with a bounded buffer
//! - [`RecordSink`]: Append-only persistence capability
//! - [`PgRecordSink`]: PostgreSQL implementation
//! - [`TracingSink`]: Log-only implementation for deployments without a database

mod logger;
mod record;
mod sink;

pub use logger::{
    LoggerConfig, LoggerStats, LoggerTask, OutcomeLogger, RetryPolicy, DEFAULT_LOG_BUFFER,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BASE, MAX_RETRY_DELAY,
};
pub use record::{AccountingRecord, RecordOutcome};
pub use sink::{PgRecordSink, RecordSink, TracingSink};
