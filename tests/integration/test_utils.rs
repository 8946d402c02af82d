//! Test utilities for integration tests.
//!
//! This module provides fake codecs and sinks, a harness that wires them into
//! a router, and helpers for building multipart uploads and test images.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::Router;
use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use imgpress::accounting::{AccountingRecord, LoggerConfig, OutcomeLogger, RecordSink, RetryPolicy};
use imgpress::codec::ImageCodec;
use imgpress::error::{CodecError, PersistenceError};
use imgpress::pipeline::{AdmissionController, AdmissionLimits, PoolConfig, WorkerPool};
use imgpress::server::{create_router, AppState, RouterConfig};

// =============================================================================
// Fake Codecs
// =============================================================================

/// Codec that returns the first half of its input and counts calls.
#[derive(Clone, Default)]
pub struct CountingCodec {
    calls: Arc<AtomicUsize>,
}

impl CountingCodec {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageCodec for CountingCodec {
    fn encode(&self, source: &[u8], _quality: u8) -> Result<Bytes, CodecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::copy_from_slice(&source[..source.len() / 2]))
    }

    fn content_type(&self) -> &'static str {
        "image/webp"
    }

    fn extension(&self) -> &'static str {
        "webp"
    }
}

/// Codec that fails on inputs starting with `bad` and halves everything else.
#[derive(Clone, Default)]
pub struct SelectiveCodec;

impl ImageCodec for SelectiveCodec {
    fn encode(&self, source: &[u8], _quality: u8) -> Result<Bytes, CodecError> {
        if source.starts_with(b"bad") {
            return Err(CodecError::CorruptInput("not an image".to_string()));
        }
        if source.starts_with(b"panic") {
            panic!("codec blew up");
        }
        Ok(Bytes::copy_from_slice(&source[..source.len() / 2]))
    }

    fn content_type(&self) -> &'static str {
        "image/webp"
    }

    fn extension(&self) -> &'static str {
        "webp"
    }
}

/// Codec whose encodes block until the gate is opened.
///
/// `started()` counts encodes that have entered the codec, which lets a test
/// wait until every worker is busy.
#[derive(Clone, Default)]
pub struct GatedCodec {
    gate: Arc<(Mutex<bool>, Condvar)>,
    started: Arc<AtomicUsize>,
}

impl GatedCodec {
    pub fn open(&self) {
        let (lock, cvar) = &*self.gate;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl ImageCodec for GatedCodec {
    fn encode(&self, source: &[u8], _quality: u8) -> Result<Bytes, CodecError> {
        self.started.fetch_add(1, Ordering::SeqCst);

        let (lock, cvar) = &*self.gate;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }

        Ok(Bytes::copy_from_slice(&source[..source.len() / 2]))
    }

    fn content_type(&self) -> &'static str {
        "image/webp"
    }

    fn extension(&self) -> &'static str {
        "webp"
    }
}

// =============================================================================
// Fake Sinks
// =============================================================================

/// Sink that keeps records in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<AccountingRecord>>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<AccountingRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn append(&self, record: &AccountingRecord) -> Result<(), PersistenceError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Sink standing in for a database that is down.
#[derive(Clone, Default)]
pub struct FailingSink {
    attempts: Arc<AtomicUsize>,
}

impl FailingSink {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSink for FailingSink {
    async fn append(&self, _record: &AccountingRecord) -> Result<(), PersistenceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PersistenceError::Unavailable("connection refused".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A fully wired service with fake edges.
pub struct TestApp {
    pub router: Router,
    pub controller: Arc<AdmissionController>,
}

/// Logger settings that retry quickly so tests stay fast.
pub fn fast_logger_config() -> LoggerConfig {
    LoggerConfig {
        buffer: 64,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
    }
}

/// Wire `codec` and `sink` into a router with `workers` workers.
pub fn build_app<C, S>(codec: C, sink: S, limits: AdmissionLimits, workers: usize) -> TestApp
where
    C: ImageCodec,
    S: RecordSink,
{
    let (logger, _task) = OutcomeLogger::spawn(sink, fast_logger_config());
    let pool = WorkerPool::spawn(
        Arc::new(codec),
        logger.clone(),
        PoolConfig {
            workers,
            queue_capacity: limits.queue_bound,
        },
    );

    let router_config = RouterConfig::new(limits.max_upload_bytes).with_tracing(false);
    let controller = Arc::new(AdmissionController::new(pool, logger, limits));
    let router = create_router(AppState::new(Arc::clone(&controller), 50), router_config);

    TestApp { router, controller }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// =============================================================================
// Multipart Requests
// =============================================================================

const BOUNDARY: &str = "imgpress-test-boundary";

/// Encode a single file part as `multipart/form-data`.
pub fn multipart_body(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Form with a single text field and no file.
pub fn multipart_text_only(field: &str, value: &str) -> Vec<u8> {
    format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"\r\n\r\n{v}\r\n--{b}--\r\n",
        b = BOUNDARY,
        f = field,
        v = value
    )
    .into_bytes()
}

/// `POST` a multipart body to `uri`.
pub fn compress_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Upload `data` as `file` with the given name and type.
pub fn upload(file_name: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    compress_request(
        "/compress",
        multipart_body("file", file_name, content_type, data),
    )
}

// =============================================================================
// Test Images
// =============================================================================

/// Create a PNG with a simple gradient pattern.
pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Create a valid 24-bit BMP of exactly `total` bytes.
///
/// Rows are 1200 bytes (400 pixels, no padding). The pixel data starts after
/// a gap sized so that header, gap and rows add up to `total`.
pub fn create_bmp_of_size(total: usize) -> Vec<u8> {
    const WIDTH: usize = 400;
    const ROW: usize = WIDTH * 3;
    const HEADERS: usize = 14 + 40;

    let height = (total - HEADERS) / ROW;
    let pixels = height * ROW;
    let offset = total - pixels;

    let mut data = Vec::with_capacity(total);

    // BITMAPFILEHEADER
    data.extend_from_slice(b"BM");
    data.extend_from_slice(&(total as u32).to_le_bytes());
    data.extend_from_slice(&[0u8; 4]);
    data.extend_from_slice(&(offset as u32).to_le_bytes());

    // BITMAPINFOHEADER
    data.extend_from_slice(&40u32.to_le_bytes());
    data.extend_from_slice(&(WIDTH as i32).to_le_bytes());
    data.extend_from_slice(&(height as i32).to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&24u16.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&(pixels as u32).to_le_bytes());
    data.extend_from_slice(&2835i32.to_le_bytes());
    data.extend_from_slice(&2835i32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());

    data.resize(offset, 0);

    for y in 0..height {
        for x in 0..WIDTH {
            data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8]);
        }
    }

    data
}

pub fn is_webp(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP"
}
