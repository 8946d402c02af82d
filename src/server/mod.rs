//! HTTP server layer for imgpress.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │                       POST /compress                            │
//! │                                                                 │
//! │  ┌───────────────────────────┐  ┌────────────────────────────┐  │
//! │  │         handlers          │  │          routes            │  │
//! │  │ (multipart, error codes)  │  │ (body limit, CORS, trace)  │  │
//! │  └───────────────────────────┘  └────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    compress_handler, health_handler, AppState, CompressError, CompressQueryParams, ErrorResponse,
    HealthResponse, UPLOAD_FIELD,
};
pub use routes::{create_router, RouterConfig, MULTIPART_OVERHEAD};
