//! HTTP request handlers for the compression API.
//!
//! # Endpoints
//!
//! - `POST /compress` - Compress an uploaded image
//! - `GET /health` - Health check with pipeline and accounting counters

use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
        Multipart, Query, State,
    },
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::accounting::LoggerStats;
use crate::error::{AdmissionError, CodecError};
use crate::pipeline::{AdmissionController, Outcome, PipelineStats, TranscodeRequest};

/// Multipart field carrying the image.
pub const UPLOAD_FIELD: &str = "file";

/// Name used when the upload has no file name.
const DEFAULT_SOURCE_NAME: &str = "upload";

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

static X_ORIGINAL_SIZE: HeaderName = HeaderName::from_static("x-original-size");
static X_COMPRESSED_SIZE: HeaderName = HeaderName::from_static("x-compressed-size");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Entry point into the transcode pipeline
    pub controller: Arc<AdmissionController>,

    /// Quality used when the request does not specify one
    pub default_quality: u8,
}

impl AppState {
    pub fn new(controller: Arc<AdmissionController>, default_quality: u8) -> Self {
        Self {
            controller,
            default_quality,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for compression requests.
#[derive(Debug, Default, Deserialize)]
pub struct CompressQueryParams {
    /// Output quality; any integer, clamped to 0-100
    #[serde(default)]
    pub quality: Option<i64>,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "too_large", "queue_full")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub pipeline: PipelineStats,
    pub accounting: LoggerStats,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Everything that can go wrong serving `POST /compress`.
#[derive(Debug)]
pub enum CompressError {
    /// No `file` field in the form
    MissingFile,

    /// Body is not valid multipart
    InvalidMultipart(String),

    /// Query string could not be parsed
    InvalidQuery(String),

    /// Body exceeded the transport limit before the field could be measured
    PayloadTooLarge(String),

    Admission(AdmissionError),

    Codec(CodecError),
}

impl From<AdmissionError> for CompressError {
    fn from(err: AdmissionError) -> Self {
        CompressError::Admission(err)
    }
}

impl From<MultipartError> for CompressError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            CompressError::PayloadTooLarge(err.body_text())
        } else {
            CompressError::InvalidMultipart(err.body_text())
        }
    }
}

impl CompressError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            CompressError::MissingFile => (
                StatusCode::BAD_REQUEST,
                "missing_file",
                format!("Please upload an image in the '{}' field", UPLOAD_FIELD),
            ),
            CompressError::InvalidMultipart(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_multipart",
                format!("Invalid multipart body: {}", msg),
            ),
            CompressError::InvalidQuery(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_query",
                format!("Invalid query string: {}", msg),
            ),
            CompressError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "too_large", msg.clone())
            }

            CompressError::Admission(err) => {
                let (status, error_type) = match err {
                    AdmissionError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "too_large"),
                    AdmissionError::UnsupportedType { .. } => {
                        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_type")
                    }
                    AdmissionError::QueueFull { .. } => {
                        (StatusCode::SERVICE_UNAVAILABLE, "queue_full")
                    }
                    AdmissionError::Closed => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
                    AdmissionError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                };
                (status, error_type, err.to_string())
            }

            CompressError::Codec(err) => {
                let error_type = match err {
                    CodecError::UnsupportedFormat(_) => "unsupported_format",
                    CodecError::CorruptInput(_) => "corrupt_input",
                    CodecError::EncoderFailure(_) => "encoder_failure",
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_type,
                    format!("Compression failed: {}", err),
                )
            }
        }
    }
}

/// Convert CompressError to HTTP response.
///
/// 5xx errors are logged at ERROR level, 4xx at WARN, except 413 which is
/// routine and logged at DEBUG.
impl IntoResponse for CompressError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = self.parts();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::PAYLOAD_TOO_LARGE {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Upload rejected: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle compression requests.
///
/// # Endpoint
///
/// `POST /compress` with a `multipart/form-data` body
///
/// # Form Fields
///
/// - `file`: The image to compress
///
/// # Query Parameters
///
/// - `quality`: Output quality 0-100 (out-of-range values are clamped)
///
/// # Response
///
/// - `200 OK`: Compressed image bytes with the output `Content-Type`
/// - `400 Bad Request`: Missing `file` field, malformed body or query string
/// - `413 Payload Too Large`: Upload exceeds the size limit
/// - `415 Unsupported Media Type`: Content type not allowed
/// - `500 Internal Server Error`: Image could not be decoded or encoded
/// - `503 Service Unavailable`: Too many requests in flight
/// - `504 Gateway Timeout`: Compression did not finish in time
///
/// # Headers
///
/// - `X-Original-Size`: Upload size in bytes
/// - `X-Compressed-Size`: Output size in bytes
/// - `Content-Disposition`: Upload name with the output extension
pub async fn compress_handler(
    State(state): State<AppState>,
    query: Result<Query<CompressQueryParams>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, CompressError> {
    let Query(query) =
        query.map_err(|rejection| CompressError::InvalidQuery(rejection.body_text()))?;
    let multipart =
        multipart.map_err(|rejection| CompressError::InvalidMultipart(rejection.body_text()))?;

    let quality = query
        .quality
        .unwrap_or_else(|| i64::from(state.default_quality));

    let response = compress_upload(&state, quality, multipart).await;
    if let Err(CompressError::PayloadTooLarge(_)) = &response {
        state.controller.count_rejection();
    }
    response
}

async fn compress_upload(
    state: &AppState,
    quality: i64,
    mut multipart: Multipart,
) -> Result<Response, CompressError> {
    let max = state.controller.limits().max_upload_bytes;

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let source_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_SOURCE_NAME)
            .to_string();
        let content_type = declared_content_type(field.content_type(), &source_name);

        // Read chunk by chunk so an oversized upload is refused without
        // buffering all of it.
        let mut buffer = BytesMut::new();
        while let Some(chunk) = field.chunk().await? {
            let size = (buffer.len() + chunk.len()) as u64;
            if size > max {
                return Err(state.controller.reject_too_large(size).into());
            }
            buffer.extend_from_slice(&chunk);
        }

        let extension = state.controller.pool().codec().extension();
        let disposition = content_disposition(&source_name, extension);
        let request = TranscodeRequest::new(source_name, &content_type, buffer.freeze(), quality);
        let source_size = request.source_size;

        let result = state.controller.admit(request).await?;

        return match result.outcome {
            Outcome::Success => Ok((
                StatusCode::OK,
                [
                    (
                        header::CONTENT_TYPE,
                        HeaderValue::from_static(result.content_type),
                    ),
                    (X_ORIGINAL_SIZE.clone(), HeaderValue::from(source_size)),
                    (
                        X_COMPRESSED_SIZE.clone(),
                        HeaderValue::from(result.output_size),
                    ),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                result.output_bytes,
            )
                .into_response()),
            Outcome::Failure(err) => Err(CompressError::Codec(err)),
        };
    }

    Err(CompressError::MissingFile)
}

/// The part's declared type, else a guess from the file name.
fn declared_content_type(declared: Option<&str>, file_name: &str) -> String {
    declared
        .filter(|ct| !ct.is_empty() && *ct != FALLBACK_CONTENT_TYPE)
        .map(str::to_string)
        .or_else(|| {
            mime_guess::from_path(file_name)
                .first()
                .map(|mime| mime.essence_str().to_string())
        })
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}

/// `inline; filename="<stem>.<ext>"`, dropping characters that cannot
/// appear in a quoted header value.
fn content_disposition(source_name: &str, extension: &str) -> HeaderValue {
    let stem = std::path::Path::new(source_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(DEFAULT_SOURCE_NAME);
    let stem: String = stem
        .chars()
        .filter(|c| c.is_ascii_graphic() && *c != '"' && *c != '\\')
        .collect();
    let stem = if stem.is_empty() {
        DEFAULT_SOURCE_NAME
    } else {
        &stem
    };

    HeaderValue::from_str(&format!("inline; filename=\"{}.{}\"", stem, extension))
        .unwrap_or_else(|_| HeaderValue::from_static("inline"))
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pipeline: state.controller.stats(),
        accounting: state.controller.logger().stats(),
    })
}

// =============================================================================
// Tests
// =============================================================================
