//! Image codecs.
//!
//! A codec turns uploaded image bytes into smaller output bytes at a given
//! quality. The worker pool only sees the [`ImageCodec`] trait, so tests can
//! substitute fakes for the real encoders.
//!
//! # Components
//!
//! - [`ImageCodec`]: The capability the worker pool invokes
//! - [`WebpCodec`]: Decode anything `image` understands, encode lossy WebP
//! - [`JpegCodec`]: Decode anything `image` understands, encode baseline JPEG
//! - [`OutputFormat`]: Server-wide choice between the two
//!
//! # Example
//!
//! ```ignore
//! use imgpress::codec::{ImageCodec, WebpCodec};
//!
//! let codec = WebpCodec::new();
//! let compressed = codec.encode(&png_bytes, 50)?;
//! assert_eq!(codec.content_type(), "image/webp");
//! ```

mod jpeg;
mod webp;

use std::sync::Arc;

use bytes::Bytes;
use clap::ValueEnum;
use image::{DynamicImage, ImageError};

use crate::error::CodecError;

pub use self::jpeg::JpegCodec;
pub use self::webp::WebpCodec;

/// Default output quality (0-100).
pub const DEFAULT_QUALITY: u8 = 50;

/// Minimum accepted quality.
pub const MIN_QUALITY: u8 = 0;

/// Maximum accepted quality.
pub const MAX_QUALITY: u8 = 100;

// =============================================================================
// Codec Capability
// =============================================================================

/// A stateless image transcoder.
///
/// Implementations are called concurrently from several blocking threads and
/// must not hold shared mutable state.
pub trait ImageCodec: Send + Sync + 'static {
    /// Decode `source` and re-encode it at `quality` (already clamped to 0-100).
    fn encode(&self, source: &[u8], quality: u8) -> Result<Bytes, CodecError>;

    /// MIME type of the encoded output.
    fn content_type(&self) -> &'static str;

    /// File extension of the encoded output, without the dot.
    fn extension(&self) -> &'static str;
}

/// Output format for compressed images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Lossy WebP
    #[default]
    Webp,

    /// Baseline JPEG
    Jpeg,
}

impl OutputFormat {
    /// Build the codec for this format.
    pub fn codec(self) -> Arc<dyn ImageCodec> {
        match self {
            OutputFormat::Webp => Arc::new(WebpCodec::new()),
            OutputFormat::Jpeg => Arc::new(JpegCodec::new()),
        }
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Clamp any integer quality into 0-100.
#[inline]
pub fn clamp_quality(quality: i64) -> u8 {
    quality.clamp(MIN_QUALITY as i64, MAX_QUALITY as i64) as u8
}

/// Decode an uploaded image, guessing its format from the content.
pub(crate) fn decode_source(source: &[u8]) -> Result<DynamicImage, CodecError> {
    image::load_from_memory(source).map_err(|e| match e {
        ImageError::Unsupported(_) => CodecError::UnsupportedFormat(e.to_string()),
        ImageError::Encoding(_) => CodecError::EncoderFailure(e.to_string()),
        _ => CodecError::CorruptInput(e.to_string()),
    })
}
