//! Request and result types flowing through the transcode pipeline.

use bytes::Bytes;

use crate::codec::clamp_quality;
use crate::error::CodecError;

// =============================================================================
// Transcode Request
// =============================================================================

/// An uploaded image waiting to be transcoded.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    /// Raw upload bytes
    pub source_bytes: Bytes,

    /// Client-supplied file name
    pub source_name: String,

    /// Upload size in bytes
    pub source_size: u64,

    /// Declared MIME type, lowercase, parameters stripped
    pub content_type: String,

    /// Output quality, always within 0-100
    pub requested_quality: u8,
}

impl TranscodeRequest {
    /// Build a request, normalising the content type and clamping quality.
    pub fn new(
        source_name: impl Into<String>,
        content_type: &str,
        source_bytes: Bytes,
        quality: i64,
    ) -> Self {
        Self {
            source_size: source_bytes.len() as u64,
            source_bytes,
            source_name: source_name.into(),
            content_type: normalize_content_type(content_type),
            requested_quality: clamp_quality(quality),
        }
    }
}

/// Lowercase a MIME type and drop any `; param=value` suffix.
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

// =============================================================================
// Transcode Result
// =============================================================================

/// How a transcode attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(CodecError),
}

/// Output of one worker run.
#[derive(Debug, Clone)]
pub struct TranscodeResult {
    /// Encoded image (empty on failure)
    pub output_bytes: Bytes,

    /// Encoded size in bytes
    pub output_size: u64,

    /// MIME type of `output_bytes`
    pub content_type: &'static str,

    pub outcome: Outcome,
}

impl TranscodeResult {
    pub fn success(output_bytes: Bytes, content_type: &'static str) -> Self {
        Self {
            output_size: output_bytes.len() as u64,
            output_bytes,
            content_type,
            outcome: Outcome::Success,
        }
    }

    pub fn failure(error: CodecError, content_type: &'static str) -> Self {
        Self {
            output_bytes: Bytes::new(),
            output_size: 0,
            content_type,
            outcome: Outcome::Failure(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}
