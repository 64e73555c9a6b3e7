//! shutter API - Image Resize Proxy
//!
//! Serves resized images derived from an origin server. Derived images are
//! produced by an upstream transformer and kept in a tiered cache: an
//! in-process membership index in front of a durable blob store.
//!
//! ```text
//! GET /r/200x200/pic/cover/l/a.jpg
//!   -> TieredCache (index, then durable store)
//!   -> on miss: origin fetch -> transformer -> durable put -> index insert
//! ```

pub mod clients;
pub mod config;
pub mod constants;
pub mod error;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use clients::{build_http_client, HttpOrigin, HttpTransformer};
pub use config::{LogFormat, ProxyConfig, S3Settings, StoreBackend};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use pipeline::{Resolved, TransformPipeline};
pub use routes::create_router;
pub use state::AppState;
pub use telemetry::ProxyMetrics;
