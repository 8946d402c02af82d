//! Transcode pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │ admit()
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          AdmissionController            │
//! │  size / type checks, permits, timeout   │
//! └────────────────────┬────────────────────┘
//!                      │ submit()
//!                      ▼
//! ┌─────────────────────────────────────────┐      ┌──────────────────┐
//! │              WorkerPool                 │─────▶│  OutcomeLogger   │
//! │  bounded queue → N workers → codec      │      │  (accounting)    │
//! └─────────────────────────────────────────┘      └──────────────────┘
//! ```
//!
//! # Components
//!
//! - [`AdmissionController`]: Entry point; rejects, throttles and waits
//! - [`WorkerPool`]: Fixed set of workers running the codec off the runtime
//! - [`TranscodeRequest`] / [`TranscodeResult`]: What flows in and out

mod admission;
mod pool;
mod request;

pub use admission::{
    AdmissionController, AdmissionLimits, PipelineStats, DEFAULT_ALLOWED_TYPES,
    DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_QUEUE_BOUND, DEFAULT_REQUEST_TIMEOUT,
};
pub use pool::{default_workers, PoolConfig, PoolStats, Submission, Ticket, WorkerPool};
pub use request::{normalize_content_type, Outcome, TranscodeRequest, TranscodeResult};
