//! Persistence sinks for accounting records.
//!
//! The outcome logger owns exactly one sink and is the only caller. Sinks
//! report failures as [`PersistenceError`]; retrying is the logger's job.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{debug, info};

use super::record::AccountingRecord;
use crate::error::PersistenceError;

/// Append-only destination for accounting records.
#[async_trait]
pub trait RecordSink: Send + Sync + 'static {
    /// Persist one record.
    async fn append(&self, record: &AccountingRecord) -> Result<(), PersistenceError>;

    /// Short name for log lines.
    fn name(&self) -> &str;
}

// =============================================================================
// PostgreSQL
// =============================================================================

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS compression_log (
    id             BIGSERIAL PRIMARY KEY,
    source_name    TEXT        NOT NULL,
    source_size    BIGINT      NOT NULL,
    output_size    BIGINT      NOT NULL,
    outcome        TEXT        NOT NULL,
    failure_reason TEXT,
    recorded_at    TIMESTAMPTZ NOT NULL
)
"#;

const INSERT_SQL: &str = r#"
INSERT INTO compression_log
    (source_name, source_size, output_size, outcome, failure_reason, recorded_at)
VALUES ($1, $2, $3, $4, $5, $6)
"#;

/// Sink writing to the `compression_log` table.
///
/// The pool connects lazily, so constructing the sink succeeds even while
/// the database is down; writes fail with [`PersistenceError::Unavailable`]
/// until it comes back.
pub struct PgRecordSink {
    pool: PgPool,
    schema_ready: AtomicBool,
}

impl PgRecordSink {
    /// Create a sink for `database_url` without connecting.
    ///
    /// Fails only if the URL cannot be parsed.
    pub fn connect_lazy(database_url: &str) -> Result<Self, PersistenceError> {
        let options = PgConnectOptions::from_str(database_url)?;

        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(3))
            .idle_timeout(Duration::from_secs(600))
            .connect_lazy_with(options);

        Ok(Self {
            pool,
            schema_ready: AtomicBool::new(false),
        })
    }

    /// Check connectivity and create the table if needed.
    pub async fn ping(&self) -> Result<(), PersistenceError> {
        self.ensure_schema().await
    }

    async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
        self.schema_ready.store(true, Ordering::Release);
        info!("Accounting table ready");
        Ok(())
    }
}

#[async_trait]
impl RecordSink for PgRecordSink {
    async fn append(&self, record: &AccountingRecord) -> Result<(), PersistenceError> {
        self.ensure_schema().await?;

        sqlx::query(INSERT_SQL)
            .bind(&record.source_name)
            .bind(to_i64(record.source_size))
            .bind(to_i64(record.output_size))
            .bind(record.outcome.as_str())
            .bind(record.failure_reason.as_deref())
            .bind(record.recorded_at)
            .execute(&self.pool)
            .await?;

        debug!(source_name = %record.source_name, "Accounting row inserted");
        Ok(())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// =============================================================================
// Tracing
// =============================================================================

/// Sink that emits each record as a structured log event.
///
/// Used when no database is configured.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

#[async_trait]
impl RecordSink for TracingSink {
    async fn append(&self, record: &AccountingRecord) -> Result<(), PersistenceError> {
        info!(
            source_name = %record.source_name,
            source_size = record.source_size,
            output_size = record.output_size,
            saved_bytes = record.saved_bytes(),
            outcome = record.outcome.as_str(),
            failure_reason = record.failure_reason.as_deref().unwrap_or(""),
            "compression"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
