//! Configuration management for imgpress.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `IMGPRESS_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use imgpress::config::Config;
//!
//! let config = Config::parse();
//! println!("Listening on {}", config.bind_address());
//! ```
//!
//! # Environment Variables
//!
//! - `IMGPRESS_HOST` - Server bind address (default: 0.0.0.0)
//! - `IMGPRESS_PORT` - Server port (default: 5000)
//! - `IMGPRESS_MAX_UPLOAD_BYTES` - Upload size limit (default: 10 MiB)
//! - `IMGPRESS_ALLOWED_TYPES` - Accepted content types (comma-separated)
//! - `IMGPRESS_WORKERS` - Concurrent encodes (default: available parallelism)
//! - `IMGPRESS_QUEUE_BOUND` - Requests in flight or queued (default: 64)
//! - `IMGPRESS_REQUEST_TIMEOUT_SECS` - Per-request deadline (default: 30)
//! - `IMGPRESS_QUALITY` - Default output quality (default: 50)
//! - `IMGPRESS_OUTPUT_FORMAT` - `webp` or `jpeg` (default: webp)
//! - `IMGPRESS_DATABASE_URL` or `DATABASE_URL` - PostgreSQL for accounting
//! - `IMGPRESS_LOG_BUFFER` - Accounting records buffered (default: 1024)
//! - `IMGPRESS_LOG_MAX_ATTEMPTS` - Write attempts per record (default: 5)
//! - `IMGPRESS_LOG_RETRY_BASE_MS` - First retry delay (default: 100)
//! - `IMGPRESS_CORS_ORIGINS` - Allowed CORS origins (comma-separated)

use std::time::Duration;

use clap::Parser;

use crate::accounting::{
    LoggerConfig, RetryPolicy, DEFAULT_LOG_BUFFER, DEFAULT_MAX_ATTEMPTS, MAX_RETRY_DELAY,
};
use crate::codec::{OutputFormat, DEFAULT_QUALITY, MAX_QUALITY};
use crate::pipeline::{
    default_workers, AdmissionLimits, PoolConfig, DEFAULT_ALLOWED_TYPES, DEFAULT_MAX_UPLOAD_BYTES,
    DEFAULT_QUEUE_BOUND,
};
use crate::server::RouterConfig;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default per-request deadline in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default first retry delay for accounting writes, in milliseconds.
pub const DEFAULT_LOG_RETRY_BASE_MS: u64 = 100;

/// Fallback variable for the accounting database.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

// =============================================================================
// CLI Arguments
// =============================================================================

/// imgpress - An image compression service.
///
/// Accepts image uploads over HTTP, re-encodes them at a lower quality on a
/// bounded worker pool, and records the size savings of every request.
#[derive(Parser, Debug, Clone)]
#[command(name = "imgpress")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "IMGPRESS_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "IMGPRESS_PORT")]
    pub port: u16,

    // =========================================================================
    // Admission Configuration
    // =========================================================================
    /// Largest accepted upload in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "IMGPRESS_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: u64,

    /// Accepted upload content types (comma-separated).
    #[arg(
        long,
        env = "IMGPRESS_ALLOWED_TYPES",
        value_delimiter = ',',
        default_values_t = DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect::<Vec<String>>()
    )]
    pub allowed_types: Vec<String>,

    /// Maximum requests in flight or waiting for a worker.
    #[arg(long, default_value_t = DEFAULT_QUEUE_BOUND, env = "IMGPRESS_QUEUE_BOUND")]
    pub queue_bound: usize,

    /// Seconds a request waits for its result before timing out.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS, env = "IMGPRESS_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: u64,

    // =========================================================================
    // Transcode Configuration
    // =========================================================================
    /// Number of concurrent encodes.
    ///
    /// Defaults to the number of available CPUs.
    #[arg(long, env = "IMGPRESS_WORKERS")]
    pub workers: Option<usize>,

    /// Default output quality (0-100) when a request does not set one.
    #[arg(long, default_value_t = DEFAULT_QUALITY, env = "IMGPRESS_QUALITY")]
    pub quality: u8,

    /// Output image format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Webp, env = "IMGPRESS_OUTPUT_FORMAT")]
    pub output_format: OutputFormat,

    // =========================================================================
    // Accounting Configuration
    // =========================================================================
    /// PostgreSQL connection string for accounting records.
    ///
    /// Falls back to `DATABASE_URL`. Without either, records are only logged.
    #[arg(long, env = "IMGPRESS_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Accounting records buffered ahead of the database.
    #[arg(long, default_value_t = DEFAULT_LOG_BUFFER, env = "IMGPRESS_LOG_BUFFER")]
    pub log_buffer: usize,

    /// Write attempts per accounting record before it is dropped.
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS, env = "IMGPRESS_LOG_MAX_ATTEMPTS")]
    pub log_max_attempts: u32,

    /// Delay before the first accounting retry, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_LOG_RETRY_BASE_MS, env = "IMGPRESS_LOG_RETRY_BASE_MS")]
    pub log_retry_base_ms: u64,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "IMGPRESS_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be greater than 0".to_string());
        }

        if self.allowed_types.iter().all(|t| t.trim().is_empty()) {
            return Err(
                "At least one content type must be allowed. Set --allowed-types or IMGPRESS_ALLOWED_TYPES"
                    .to_string(),
            );
        }

        if self.queue_bound == 0 {
            return Err("queue_bound must be greater than 0".to_string());
        }

        if self.workers == Some(0) {
            return Err("workers must be greater than 0".to_string());
        }

        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than 0".to_string());
        }

        if self.quality > MAX_QUALITY {
            return Err(format!("quality must be between 0 and {}", MAX_QUALITY));
        }

        if self.log_buffer == 0 {
            return Err("log_buffer must be greater than 0".to_string());
        }

        if self.log_max_attempts == 0 {
            return Err("log_max_attempts must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Accounting database URL, from the flag or the `DATABASE_URL` fallback.
    pub fn database_url(&self) -> Option<String> {
        self.database_url
            .clone()
            .or_else(|| std::env::var(DATABASE_URL_ENV).ok())
            .filter(|url| !url.is_empty())
    }

    pub fn admission_limits(&self) -> AdmissionLimits {
        AdmissionLimits {
            max_upload_bytes: self.max_upload_bytes,
            allowed_types: self
                .allowed_types
                .iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            queue_bound: self.queue_bound,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Worker pool sized so the queue never refuses work the admission
    /// permits let through.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers.unwrap_or_else(default_workers),
            queue_capacity: self.queue_bound,
        }
    }

    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            buffer: self.log_buffer,
            retry: RetryPolicy {
                max_attempts: self.log_max_attempts,
                base_delay: Duration::from_millis(self.log_retry_base_ms),
                max_delay: MAX_RETRY_DELAY,
            },
        }
    }

    pub fn router_config(&self) -> RouterConfig {
        let config = RouterConfig::new(self.max_upload_bytes).with_tracing(!self.no_tracing);
        match &self.cors_origins {
            Some(origins) => config.with_cors_origins(origins.clone()),
            None => config,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
