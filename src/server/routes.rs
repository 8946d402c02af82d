//! Router configuration for imgpress.
//!
//! # Route Structure
//!
//! ```text
//! /health     - Health check with pipeline counters
//! /compress   - Image compression (POST, multipart)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use imgpress::server::{create_router, AppState, RouterConfig};
//!
//! let state = AppState::new(controller, 50);
//! let router = create_router(state, RouterConfig::new(10 * 1024 * 1024));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:5000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use http::header::{CONTENT_TYPE, HeaderName};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{compress_handler, health_handler, AppState};

/// Allowance on top of the upload limit for multipart framing.
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Largest accepted upload; the request body limit is derived from it
    pub max_upload_bytes: u64,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// By default CORS allows any origin and tracing is enabled.
    pub fn new(max_upload_bytes: u64) -> Self {
        Self {
            max_upload_bytes,
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Transport-level body limit in bytes.
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.max_upload_bytes)
            .unwrap_or(usize::MAX)
            .saturating_add(MULTIPART_OVERHEAD)
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
pub fn create_router(state: AppState, config: RouterConfig) -> Router {
    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/compress", post(compress_handler))
        .layer(DefaultBodyLimit::max(config.body_limit()))
        .with_state(state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([
            HeaderName::from_static("x-original-size"),
            HeaderName::from_static("x-compressed-size"),
        ])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
