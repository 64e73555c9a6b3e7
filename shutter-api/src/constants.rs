//! Constants for shutter API
//!
//! This module contains all constant values used throughout the API.
//! Centralizing constants makes them easy to find, modify, and test.

// ============================================================================
// SERVER
// ============================================================================

/// Default listen host
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";

/// Default listen port
pub const DEFAULT_PORT: u16 = 8003;

/// Default per-request deadline in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// UPSTREAMS
// ============================================================================

/// Default origin serving the source images
pub const DEFAULT_ORIGIN_URL: &str = "http://lain.bgm.tv";

/// Default timeout for origin and transformer HTTP calls in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;

/// Multipart field name carrying the source image
pub const TRANSFORM_FIELD: &str = "file";

// ============================================================================
// CACHE
// ============================================================================

/// Default membership index capacity
pub const DEFAULT_CACHE_CAPACITY: u64 = 100_000;

/// Default eviction queue bound
pub const DEFAULT_EVICTION_QUEUE: usize = 1024;

/// Default filesystem store directory
pub const DEFAULT_FS_ROOT: &str = "./data";

/// Default S3 bucket
pub const DEFAULT_S3_BUCKET: &str = "img-resize";

/// Default S3 region
pub const DEFAULT_S3_REGION: &str = "us-east-1";

// ============================================================================
// RESPONSES
// ============================================================================

/// Cache-Control for derived images; a derived image never changes.
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Response header reporting whether the artifact came from the cache.
pub const X_CACHE_HEADER: &str = "x-cache";

/// Plain-text usage note served at `/` and `/r/`.
pub const USAGE: &str = "image resize proxy\n\n\
GET /r/<size>/<path>[?hd=1]\n\n\
size is W or WxH, each dimension one of 100, 200, 400, 600, 800, 1200.\n\
A zero or missing dimension keeps the aspect ratio.\n\
Covers must be requested from pic/cover/l/.\n";

// ============================================================================
// METRICS
// ============================================================================

/// Latency buckets (seconds) for requests answered from the cache
pub const CACHED_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.2, 0.3, 0.4, 0.5, 0.75, 1.0, 2.0,
];

/// Latency buckets (seconds) for requests that ran the transformer
pub const UNCACHED_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.2, 0.3, 0.4, 0.5, 0.75, 1.0, 2.0, 3.0, 4.0, 5.0, 7.5, 10.0,
];

/// HTTP request latency buckets (seconds)
pub const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];
