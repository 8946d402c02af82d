//! Request admission.
//!
//! The controller is the only entry point into the pipeline. It rejects
//! oversized uploads and unknown content types before touching the pool,
//! applies backpressure through a fixed number of admission permits, and
//! waits for the worker's result up to a deadline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::pool::{PoolStats, WorkerPool};
use super::request::{TranscodeRequest, TranscodeResult};
use crate::accounting::{AccountingRecord, OutcomeLogger, RecordOutcome};
use crate::error::AdmissionError;

/// Default upload limit: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Default bound on in-flight plus queued requests.
pub const DEFAULT_QUEUE_BOUND: usize = 64;

/// Default time a caller waits for a result.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Content types accepted by default.
pub const DEFAULT_ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/bmp",
    "image/tiff",
];

// =============================================================================
// Limits
// =============================================================================

/// Admission policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionLimits {
    /// Largest accepted upload in bytes
    pub max_upload_bytes: u64,

    /// Accepted content types (lowercase, no parameters)
    pub allowed_types: Vec<String>,

    /// Maximum requests in flight or queued at once
    pub queue_bound: usize,

    /// How long `admit` waits for a worker result
    pub request_timeout: Duration,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect(),
            queue_bound: DEFAULT_QUEUE_BOUND,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl AdmissionLimits {
    pub fn allows_type(&self, content_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == content_type)
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct Counters {
    admitted: AtomicU64,
    rejected: AtomicU64,
    timed_out: AtomicU64,
}

/// Snapshot of pipeline counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Admission bound
    pub queue_bound: usize,

    /// Requests currently holding an admission permit
    pub in_flight: usize,

    pub admitted: u64,
    pub rejected: u64,
    pub timed_out: u64,

    pub pool: PoolStats,
}

// =============================================================================
// Admission Controller
// =============================================================================

/// Validates, throttles and dispatches transcode requests.
///
/// # Example
///
/// ```ignore
/// use imgpress::pipeline::{AdmissionController, AdmissionLimits, PoolConfig, WorkerPool};
///
/// let pool = WorkerPool::spawn(codec, logger.clone(), PoolConfig::default());
/// let controller = AdmissionController::new(pool, logger, AdmissionLimits::default());
///
/// let result = controller.admit(request).await?;
/// ```
pub struct AdmissionController {
    pool: WorkerPool,
    logger: OutcomeLogger,
    limits: AdmissionLimits,
    permits: Arc<Semaphore>,
    counters: Counters,
}

impl AdmissionController {
    pub fn new(pool: WorkerPool, logger: OutcomeLogger, limits: AdmissionLimits) -> Self {
        let permits = Arc::new(Semaphore::new(limits.queue_bound.max(1)));
        Self {
            pool,
            logger,
            limits,
            permits,
            counters: Counters::default(),
        }
    }

    /// Run one request through the pipeline.
    ///
    /// Returns the worker's result (which may itself be a codec failure) or
    /// the reason the request was not served. Every request that gets past
    /// validation and backpressure produces exactly one accounting record.
    pub async fn admit(
        &self,
        request: TranscodeRequest,
    ) -> Result<TranscodeResult, AdmissionError> {
        if let Err(e) = self.check(&request) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }

        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    bound = self.limits.queue_bound,
                    source_name = %request.source_name,
                    "Rejecting request, queue full"
                );
                return Err(AdmissionError::QueueFull {
                    bound: self.limits.queue_bound,
                });
            }
        };

        let source_name = request.source_name.clone();
        let source_size = request.source_size;

        let mut submission = match self.pool.submit(request, Some(permit)) {
            Ok(submission) => submission,
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };
        self.counters.admitted.fetch_add(1, Ordering::Relaxed);

        let timeout = self.limits.request_timeout;
        match tokio::time::timeout(timeout, &mut submission.receiver).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => {
                // Job dropped without a result, e.g. pool torn down mid-flight.
                if submission.ticket.claim() {
                    self.logger.record(AccountingRecord::unfinished(
                        &source_name,
                        source_size,
                        RecordOutcome::Abandoned,
                    ));
                }
                Err(AdmissionError::Closed)
            }
            Err(_) => {
                if submission.ticket.claim() {
                    self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        source_name = %source_name,
                        timeout_ms = timeout.as_millis() as u64,
                        "Transcode timed out"
                    );
                    self.logger.record(AccountingRecord::unfinished(
                        &source_name,
                        source_size,
                        RecordOutcome::Timeout,
                    ));
                    return Err(AdmissionError::Timeout { after: timeout });
                }

                // The worker claimed the outcome just before the deadline and
                // is about to send it.
                debug!(source_name = %source_name, "Result raced the deadline");
                submission
                    .receiver
                    .await
                    .map_err(|_| AdmissionError::Timeout { after: timeout })
            }
        }
    }

    /// Size and type validation; never touches the pool.
    fn check(&self, request: &TranscodeRequest) -> Result<(), AdmissionError> {
        if request.source_size > self.limits.max_upload_bytes {
            debug!(
                source_name = %request.source_name,
                size = request.source_size,
                max = self.limits.max_upload_bytes,
                "Rejecting oversized upload"
            );
            return Err(AdmissionError::TooLarge {
                size: request.source_size,
                max: self.limits.max_upload_bytes,
            });
        }

        if !self.limits.allows_type(&request.content_type) {
            debug!(
                source_name = %request.source_name,
                content_type = %request.content_type,
                "Rejecting unsupported content type"
            );
            return Err(AdmissionError::UnsupportedType {
                content_type: request.content_type.clone(),
            });
        }

        Ok(())
    }

    /// Refuse an upload that outgrew the limit while it was still being
    /// received. Counted like any other rejection.
    pub fn reject_too_large(&self, size: u64) -> AdmissionError {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        debug!(
            size = size,
            max = self.limits.max_upload_bytes,
            "Rejecting oversized upload while streaming"
        );
        AdmissionError::TooLarge {
            size,
            max: self.limits.max_upload_bytes,
        }
    }

    /// Count a request refused before it could be measured, e.g. a body
    /// that hit the transport limit.
    pub fn count_rejection(&self) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn limits(&self) -> &AdmissionLimits {
        &self.limits
    }

    pub fn logger(&self) -> &OutcomeLogger {
        &self.logger
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn stats(&self) -> PipelineStats {
        let available = self.permits.available_permits();
        PipelineStats {
            queue_bound: self.limits.queue_bound,
            in_flight: self.limits.queue_bound.max(1).saturating_sub(available),
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            pool: self.pool.stats(),
        }
    }

    /// Stop the worker pool after draining queued work.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

// =============================================================================
// Tests
// =============================================================================
