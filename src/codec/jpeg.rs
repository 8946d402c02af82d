//! JPEG codec.
//!
//! Decodes the upload and re-encodes it as baseline JPEG. Alpha is dropped
//! since JPEG has no transparency.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;

use super::{decode_source, ImageCodec};
use crate::error::CodecError;

/// Lowest quality the JPEG encoder accepts.
const MIN_JPEG_QUALITY: u8 = 1;

/// Decode-then-encode codec producing JPEG.
#[derive(Debug, Clone, Default)]
pub struct JpegCodec {}

impl JpegCodec {
    /// Create a new JPEG codec.
    pub fn new() -> Self {
        Self {}
    }
}

impl ImageCodec for JpegCodec {
    fn encode(&self, source: &[u8], quality: u8) -> Result<Bytes, CodecError> {
        let img = decode_source(source)?;
        let rgb = img.to_rgb8();

        let mut output = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut output, quality.max(MIN_JPEG_QUALITY));
        encoder
            .encode_image(&rgb)
            .map_err(|e| CodecError::EncoderFailure(e.to_string()))?;

        Ok(Bytes::from(output))
    }

    fn content_type(&self) -> &'static str {
        "image/jpeg"
    }

    fn extension(&self) -> &'static str {
        "jpg"
    }
}
