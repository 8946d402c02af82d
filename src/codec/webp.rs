//! Lossy WebP codec.
//!
//! The input is decoded with the `image` crate (any enabled format), then
//! handed to libwebp as packed RGB or RGBA depending on whether the source
//! carries an alpha channel.

use bytes::Bytes;
use image::GenericImageView;

use super::{decode_source, ImageCodec};
use crate::error::CodecError;

/// Decode-then-encode codec producing lossy WebP.
#[derive(Debug, Clone, Default)]
pub struct WebpCodec {}

impl WebpCodec {
    /// Create a new WebP codec.
    pub fn new() -> Self {
        Self {}
    }
}

impl ImageCodec for WebpCodec {
    fn encode(&self, source: &[u8], quality: u8) -> Result<Bytes, CodecError> {
        let img = decode_source(source)?;
        let (width, height) = img.dimensions();

        let encoded = if img.color().has_alpha() {
            let rgba = img.to_rgba8();
            ::webp::Encoder::from_rgba(rgba.as_raw(), width, height)
                .encode_simple(false, f32::from(quality))
        } else {
            let rgb = img.to_rgb8();
            ::webp::Encoder::from_rgb(rgb.as_raw(), width, height)
                .encode_simple(false, f32::from(quality))
        };

        let memory = encoded.map_err(|e| CodecError::EncoderFailure(format!("{:?}", e)))?;
        Ok(Bytes::copy_from_slice(&memory))
    }

    fn content_type(&self) -> &'static str {
        "image/webp"
    }

    fn extension(&self) -> &'static str {
        "webp"
    }
}
