//! Fixed-size transcode worker pool.
//!
//! N worker tasks pull jobs from one bounded multi-consumer queue. The codec
//! runs on tokio's blocking thread pool, so a slow encode never stalls the
//! async runtime and at most N encodes run at once.
//!
//! Each job carries a [`Ticket`]. The first party to claim it (the worker
//! once the encode is done, or the admission controller on timeout) owns the
//! request's accounting record, which keeps the record count at exactly one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{oneshot, OwnedSemaphorePermit};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::request::{TranscodeRequest, TranscodeResult};
use crate::accounting::{AccountingRecord, OutcomeLogger, RecordOutcome};
use crate::codec::ImageCodec;
use crate::error::{AdmissionError, CodecError};

/// Worker count when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Worker pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of concurrent encodes
    pub workers: usize,

    /// Capacity of the job queue
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: 64,
        }
    }
}

// =============================================================================
// Jobs
// =============================================================================

/// Single-use claim over a request's terminal outcome.
#[derive(Debug, Default)]
pub struct Ticket {
    claimed: AtomicBool,
}

impl Ticket {
    /// Returns `true` for exactly one caller.
    pub fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

struct Job {
    request: TranscodeRequest,
    ticket: Arc<Ticket>,
    reply: oneshot::Sender<TranscodeResult>,
    /// Admission slot, released when the job is dropped
    permit: Option<OwnedSemaphorePermit>,
}

/// A queued job as seen by the submitter.
pub struct Submission {
    pub(crate) receiver: oneshot::Receiver<TranscodeResult>,
    pub(crate) ticket: Arc<Ticket>,
}

impl Submission {
    /// Wait for the worker's result without a deadline.
    ///
    /// Returns `None` if the job was dropped without a result.
    pub async fn result(self) -> Option<TranscodeResult> {
        self.receiver.await.ok()
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct Counters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
    discarded: AtomicU64,
}

/// Snapshot of worker pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub queue_capacity: usize,

    /// Jobs waiting for a worker
    pub queued: usize,

    /// Encodes that produced output
    pub succeeded: u64,

    /// Encodes that ended in a codec error or panic
    pub failed: u64,

    /// Jobs skipped because the caller was gone
    pub abandoned: u64,

    /// Jobs skipped or results thrown away after a timeout
    pub discarded: u64,
}

// =============================================================================
// Worker Pool
// =============================================================================

/// Bounded pool of transcode workers.
pub struct WorkerPool {
    sender: async_channel::Sender<Job>,
    codec: Arc<dyn ImageCodec>,
    config: PoolConfig,
    counters: Arc<Counters>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start `config.workers` workers sharing `codec`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(codec: Arc<dyn ImageCodec>, logger: OutcomeLogger, config: PoolConfig) -> Self {
        let config = PoolConfig {
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
        };
        let (sender, receiver) = async_channel::bounded(config.queue_capacity);
        let counters = Arc::new(Counters::default());

        let handles = (0..config.workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    receiver.clone(),
                    Arc::clone(&codec),
                    logger.clone(),
                    Arc::clone(&counters),
                ))
            })
            .collect();

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Worker pool started"
        );

        Self {
            sender,
            codec,
            config,
            counters,
            handles: Mutex::new(handles),
        }
    }

    /// Enqueue a request without waiting for queue space.
    pub fn submit(
        &self,
        request: TranscodeRequest,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Result<Submission, AdmissionError> {
        let (reply, receiver) = oneshot::channel();
        let ticket = Arc::new(Ticket::default());

        let job = Job {
            request,
            ticket: Arc::clone(&ticket),
            reply,
            permit,
        };

        self.sender.try_send(job).map_err(|e| match e {
            async_channel::TrySendError::Full(_) => AdmissionError::QueueFull {
                bound: self.config.queue_capacity,
            },
            async_channel::TrySendError::Closed(_) => AdmissionError::Closed,
        })?;

        Ok(Submission { receiver, ticket })
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// The codec every worker runs.
    pub fn codec(&self) -> &Arc<dyn ImageCodec> {
        &self.codec
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.config.workers,
            queue_capacity: self.config.queue_capacity,
            queued: self.sender.len(),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting jobs, let workers drain the queue, and wait for them.
    pub async fn shutdown(&self) {
        self.sender.close();

        let handles = self
            .handles
            .lock()
            .map(|mut handles| std::mem::take(&mut *handles))
            .unwrap_or_default();

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }

        info!("Worker pool stopped");
    }
}

async fn run_worker(
    id: usize,
    receiver: async_channel::Receiver<Job>,
    codec: Arc<dyn ImageCodec>,
    logger: OutcomeLogger,
    counters: Arc<Counters>,
) {
    debug!(worker = id, "Worker started");

    while let Ok(job) = receiver.recv().await {
        process_job(id, job, &codec, &logger, &counters).await;
    }

    debug!(worker = id, "Worker stopped");
}

async fn process_job(
    worker: usize,
    job: Job,
    codec: &Arc<dyn ImageCodec>,
    logger: &OutcomeLogger,
    counters: &Counters,
) {
    let Job {
        request,
        ticket,
        reply,
        permit,
    } = job;

    // Timed out while queued; the controller already recorded it.
    if ticket.is_claimed() {
        counters.discarded.fetch_add(1, Ordering::Relaxed);
        debug!(worker, source_name = %request.source_name, "Skipping timed out job");
        return;
    }

    if reply.is_closed() {
        if ticket.claim() {
            counters.abandoned.fetch_add(1, Ordering::Relaxed);
            logger.record(AccountingRecord::unfinished(
                &request.source_name,
                request.source_size,
                RecordOutcome::Abandoned,
            ));
        }
        debug!(worker, source_name = %request.source_name, "Skipping abandoned job");
        return;
    }

    let TranscodeRequest {
        source_bytes,
        source_name,
        source_size,
        requested_quality,
        ..
    } = request;

    let content_type = codec.content_type();
    let encoder = Arc::clone(codec);
    let started = Instant::now();

    let joined =
        tokio::task::spawn_blocking(move || encoder.encode(&source_bytes, requested_quality))
            .await;

    let result = match joined {
        Ok(Ok(output)) => TranscodeResult::success(output, content_type),
        Ok(Err(e)) => TranscodeResult::failure(e, content_type),
        Err(e) => {
            error!(worker, source_name = %source_name, error = %e, "Codec panicked");
            TranscodeResult::failure(
                CodecError::EncoderFailure("codec panicked".to_string()),
                content_type,
            )
        }
    };

    if result.is_success() {
        counters.succeeded.fetch_add(1, Ordering::Relaxed);
    } else {
        counters.failed.fetch_add(1, Ordering::Relaxed);
    }

    debug!(
        worker,
        source_name = %source_name,
        source_size,
        output_size = result.output_size,
        quality = requested_quality,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Transcode finished"
    );

    if !ticket.claim() {
        counters.discarded.fetch_add(1, Ordering::Relaxed);
        debug!(worker, source_name = %source_name, "Result discarded after timeout");
        return;
    }

    logger.record(AccountingRecord::completed(&source_name, source_size, &result));

    // Free the admission slot before the caller can observe the result.
    drop(permit);

    // The caller may have gone away between the claim and now; nothing to do.
    let _ = reply.send(result);
}

// =============================================================================
// Tests
// =============================================================================
