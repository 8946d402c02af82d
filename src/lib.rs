//! # imgpress
//!
//! An image compression service: clients upload an image over HTTP and get
//! back a smaller, lossy re-encoding of it, while the size savings of every
//! request are recorded for later analysis.
//!
//! ## Features
//!
//! - **Bounded transcoding**: A fixed worker pool behind a bounded queue, so
//!   overload turns into fast `503` responses instead of unbounded memory
//! - **Per-request deadlines**: Callers never wait longer than the configured
//!   timeout, and a late worker result is discarded
//! - **Decoupled accounting**: Records are buffered and persisted in the
//!   background with retries; a slow or unavailable database never delays a
//!   response
//! - **Pluggable output**: WebP by default, JPEG as an alternative
//!
//! ## Architecture
//!
//! - [`codec`] - Decode arbitrary input and re-encode at a given quality
//! - [`pipeline`] - Admission control and the transcode worker pool
//! - [`accounting`] - Accounting records, the outcome logger, and sinks
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use imgpress::{
//!     AdmissionController, AdmissionLimits, AppState, LoggerConfig, OutcomeLogger, OutputFormat,
//!     PoolConfig, RouterConfig, TracingSink, WorkerPool, create_router,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let (logger, _task) = OutcomeLogger::spawn(TracingSink, LoggerConfig::default());
//!     let pool = WorkerPool::spawn(OutputFormat::Webp.codec(), logger.clone(), PoolConfig::default());
//!     let limits = AdmissionLimits::default();
//!     let router_config = RouterConfig::new(limits.max_upload_bytes);
//!     let controller = Arc::new(AdmissionController::new(pool, logger, limits));
//!
//!     let router = create_router(AppState::new(controller, 50), router_config);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:5000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod accounting;
pub mod codec;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod server;

// Re-export commonly used types
pub use accounting::{
    AccountingRecord, LoggerConfig, LoggerStats, LoggerTask, OutcomeLogger, PgRecordSink,
    RecordOutcome, RecordSink, RetryPolicy, TracingSink,
};
pub use codec::{clamp_quality, ImageCodec, JpegCodec, OutputFormat, WebpCodec};
pub use config::Config;
pub use error::{AdmissionError, CodecError, PersistenceError};
pub use pipeline::{
    AdmissionController, AdmissionLimits, Outcome, PipelineStats, PoolConfig, PoolStats,
    TranscodeRequest, TranscodeResult, WorkerPool,
};
pub use server::{create_router, AppState, ErrorResponse, HealthResponse, RouterConfig};
