//! shutter Telemetry - Observability Infrastructure
//!
//! Structured logging through `tracing` and Prometheus metrics for the HTTP
//! layer and the tiered cache.

pub mod logging;
pub mod metrics;
pub mod middleware;

pub use logging::init_logging;
pub use metrics::{metrics_handler, ProxyMetrics};
pub use middleware::observability_middleware;
