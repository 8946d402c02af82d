//! End-to-end tests with the real encoders.
//!
//! Tests verify:
//! - JPEG output when the service is configured for it
//! - Unknown and truncated inputs surface as codec failures (500)
//! - Transparent images survive WebP encoding

use axum::http::StatusCode;
use http_body_util::BodyExt;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use tower::ServiceExt;

use imgpress::accounting::RecordOutcome;
use imgpress::codec::{JpegCodec, OutputFormat, WebpCodec};
use imgpress::pipeline::AdmissionLimits;

use super::test_utils::{build_app, create_test_png, is_webp, upload, wait_until, MemorySink};

fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[0] == 0xFF && data[1] == 0xD8
}

#[tokio::test]
async fn test_jpeg_output_format() {
    let app = build_app(
        JpegCodec::new(),
        MemorySink::default(),
        AdmissionLimits::default(),
        1,
    );

    let png = create_test_png(32, 32);
    let response = app
        .router
        .oneshot(upload("shot.png", "image/png", &png))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/jpeg");
    assert_eq!(
        response.headers().get("content-disposition").unwrap(),
        "inline; filename=\"shot.jpg\""
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(is_jpeg(&body));
}

#[test]
fn test_output_format_selects_codec() {
    assert_eq!(OutputFormat::Jpeg.codec().extension(), "jpg");
    assert_eq!(OutputFormat::Webp.codec().extension(), "webp");
}

#[tokio::test]
async fn test_unrecognised_bytes_fail_with_500() {
    let sink = MemorySink::default();
    let app = build_app(WebpCodec::new(), sink.clone(), AdmissionLimits::default(), 1);

    let response = app
        .router
        .oneshot(upload("fake.png", "image/png", b"definitely not an image"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "unsupported_format");

    assert!(wait_until(|| sink.len() == 1).await);
    let record = &sink.records()[0];
    assert_eq!(record.outcome, RecordOutcome::Failure);
    assert_eq!(record.output_size, 0);
    assert!(record.failure_reason.is_some());
}

#[tokio::test]
async fn test_truncated_png_is_corrupt_input() {
    let app = build_app(
        WebpCodec::new(),
        MemorySink::default(),
        AdmissionLimits::default(),
        1,
    );

    let png = create_test_png(64, 64);
    let truncated = &png[..png.len() / 2];

    let response = app
        .router
        .oneshot(upload("cut.png", "image/png", truncated))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "corrupt_input");
}

#[tokio::test]
async fn test_transparent_png_to_webp() {
    let app = build_app(
        WebpCodec::new(),
        MemorySink::default(),
        AdmissionLimits::default(),
        1,
    );

    let img = RgbaImage::from_fn(24, 24, |x, y| Rgba([x as u8 * 10, y as u8 * 10, 0, (x * 10) as u8]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();

    let response = app
        .router
        .oneshot(upload("alpha.png", "image/png", &buf.into_inner()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(is_webp(&body));
}
