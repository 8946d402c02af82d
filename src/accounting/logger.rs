//! Asynchronous outcome logger.
//!
//! Request handlers hand records to [`OutcomeLogger::record`], which never
//! waits: the record is pushed into a bounded buffer and a background task
//! writes it to the sink. When the buffer is full the newest record is
//! dropped. When the sink fails, the write is retried with exponential
//! backoff and then dropped.
//!
//! ```text
//!  worker / controller ──record()──▶ [ bounded buffer ] ──▶ logger task ──▶ RecordSink
//!                                        │ full / closed        │ retries exhausted
//!                                        ▼                      ▼
//!                          dropped_overflow / dropped_closed   dropped_failed
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::record::AccountingRecord;
use super::sink::RecordSink;

/// Default number of records buffered ahead of the sink.
pub const DEFAULT_LOG_BUFFER: usize = 1024;

/// Default number of write attempts per record.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first retry.
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(100);

/// Upper bound on any single retry delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

// =============================================================================
// Configuration
// =============================================================================

/// Exponential backoff for sink writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry
    pub base_delay: Duration,

    /// Cap for a single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_RETRY_BASE,
            max_delay: MAX_RETRY_DELAY,
        }
    }
}

/// Outcome logger settings.
#[derive(Debug, Clone, Copy)]
pub struct LoggerConfig {
    /// Capacity of the record buffer
    pub buffer: usize,

    pub retry: RetryPolicy,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_LOG_BUFFER,
            retry: RetryPolicy::default(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    persisted: AtomicU64,
    retried: AtomicU64,
    dropped_overflow: AtomicU64,
    dropped_closed: AtomicU64,
    dropped_failed: AtomicU64,
}

/// Snapshot of outcome logger counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoggerStats {
    /// Records taken into the buffer
    pub accepted: u64,

    /// Records written to the sink
    pub persisted: u64,

    /// Individual retry attempts made
    pub retried: u64,

    /// Records refused because the buffer was full
    pub dropped_overflow: u64,

    /// Records refused because the writer had already stopped
    pub dropped_closed: u64,

    /// Records given up on after exhausting retries
    pub dropped_failed: u64,
}

impl Counters {
    fn snapshot(&self) -> LoggerStats {
        LoggerStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            dropped_closed: self.dropped_closed.load(Ordering::Relaxed),
            dropped_failed: self.dropped_failed.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Outcome Logger
// =============================================================================

/// Clonable, non-blocking handle for submitting accounting records.
#[derive(Clone)]
pub struct OutcomeLogger {
    tx: mpsc::Sender<AccountingRecord>,
    counters: Arc<Counters>,
}

impl OutcomeLogger {
    /// Start the background writer for `sink`.
    ///
    /// Must be called from within a tokio runtime. The writer stops once
    /// every `OutcomeLogger` clone has been dropped and the buffer is empty.
    pub fn spawn<S: RecordSink>(sink: S, config: LoggerConfig) -> (Self, LoggerTask) {
        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let counters = Arc::new(Counters::default());

        let handle = tokio::spawn(run_writer(
            Box::new(sink),
            rx,
            config.retry,
            Arc::clone(&counters),
        ));

        let logger = Self {
            tx,
            counters: Arc::clone(&counters),
        };

        (logger, LoggerTask { handle, counters })
    }

    /// Queue a record for persistence. Never blocks and never fails.
    pub fn record(&self, entry: AccountingRecord) {
        match self.tx.try_send(entry) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(entry)) => {
                self.counters.dropped_overflow.fetch_add(1, Ordering::Relaxed);
                warn!(
                    source_name = %entry.source_name,
                    outcome = entry.outcome.as_str(),
                    "Accounting buffer full, record dropped"
                );
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                self.counters.dropped_closed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    source_name = %entry.source_name,
                    "Accounting writer stopped, record dropped"
                );
            }
        }
    }

    /// Current counters.
    pub fn stats(&self) -> LoggerStats {
        self.counters.snapshot()
    }
}

/// Handle to the background writer task.
pub struct LoggerTask {
    handle: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl LoggerTask {
    /// Wait up to `grace` for buffered records to be written.
    ///
    /// All [`OutcomeLogger`] handles must be dropped first, otherwise the
    /// writer keeps waiting for more records until `grace` elapses.
    pub async fn join(mut self, grace: Duration) -> LoggerStats {
        if tokio::time::timeout(grace, &mut self.handle).await.is_err() {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "Accounting writer did not drain in time, aborting"
            );
            self.handle.abort();
        }
        self.counters.snapshot()
    }
}

async fn run_writer(
    sink: Box<dyn RecordSink>,
    mut rx: mpsc::Receiver<AccountingRecord>,
    retry: RetryPolicy,
    counters: Arc<Counters>,
) {
    debug!(sink = sink.name(), "Accounting writer started");

    while let Some(record) = rx.recv().await {
        if persist_with_retry(sink.as_ref(), &record, &retry, &counters).await {
            counters.persisted.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.dropped_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    debug!(sink = sink.name(), "Accounting writer stopped");
}

async fn persist_with_retry(
    sink: &dyn RecordSink,
    record: &AccountingRecord,
    retry: &RetryPolicy,
    counters: &Counters,
) -> bool {
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match sink.append(record).await {
            Ok(()) => return true,
            Err(e) if attempt >= max_attempts => {
                error!(
                    sink = sink.name(),
                    source_name = %record.source_name,
                    attempts = attempt,
                    error = %e,
                    "Accounting record dropped after exhausting retries"
                );
                return false;
            }
            Err(e) => {
                let delay = retry.delay_for(attempt);
                warn!(
                    sink = sink.name(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Accounting write failed, retrying"
                );
                counters.retried.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
