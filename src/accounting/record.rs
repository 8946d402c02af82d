use serde::Serialize;
use time::OffsetDateTime;

use crate::pipeline::{Outcome, TranscodeResult};

/// Terminal state of an admitted request, as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Success,
    Failure,
    Timeout,
    /// Caller went away before a worker picked the request up
    Abandoned,
}

impl RecordOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Success => "success",
            RecordOutcome::Failure => "failure",
            RecordOutcome::Timeout => "timeout",
            RecordOutcome::Abandoned => "abandoned",
        }
    }
}

/// One row of compression accounting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountingRecord {
    pub source_name: String,
    pub source_size: u64,
    pub output_size: u64,
    pub outcome: RecordOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

impl AccountingRecord {
    /// Record for a request a worker finished, successfully or not.
    pub fn completed(source_name: &str, source_size: u64, result: &TranscodeResult) -> Self {
        let (outcome, failure_reason) = match &result.outcome {
            Outcome::Success => (RecordOutcome::Success, None),
            Outcome::Failure(err) => (RecordOutcome::Failure, Some(err.to_string())),
        };

        Self {
            source_name: source_name.to_string(),
            source_size,
            output_size: result.output_size,
            outcome,
            failure_reason,
            recorded_at: OffsetDateTime::now_utc(),
        }
    }

    /// Record for a request that produced no output.
    pub fn unfinished(source_name: &str, source_size: u64, outcome: RecordOutcome) -> Self {
        Self {
            source_name: source_name.to_string(),
            source_size,
            output_size: 0,
            outcome,
            failure_reason: None,
            recorded_at: OffsetDateTime::now_utc(),
        }
    }

    /// Bytes saved by compression; negative when the output grew.
    pub fn saved_bytes(&self) -> i64 {
        self.source_size as i64 - self.output_size as i64
    }
}
