//! Prometheus Metrics Definitions
//!
//! Request metrics are recorded by the HTTP layer as requests complete. Cache
//! figures (index, tiered cache, eviction worker) are not mirrored into
//! counters; a [`Collector`] samples them from the cache at scrape time.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    Opts, Registry, TextEncoder,
};
use shutter_core::FailureKind;
use shutter_storage::TieredCache;

use crate::constants::{CACHED_LATENCY_BUCKETS, HTTP_LATENCY_BUCKETS, UNCACHED_LATENCY_BUCKETS};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

// ============================================================================
// REQUEST METRICS
// ============================================================================

/// Container for all shutter metrics.
///
/// Each instance owns its own [`Registry`], so several proxies (or tests) can
/// live in one process.
#[derive(Clone)]
pub struct ProxyMetrics {
    registry: Registry,

    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Resize requests that reached the pipeline
    pub requests_total: IntCounter,

    /// Resize requests answered from the cache
    pub cached_requests_total: IntCounter,

    /// Latency of requests answered from the cache
    pub cached_request_duration_seconds: Histogram,

    /// Latency of requests that ran the transformer
    pub uncached_request_duration_seconds: Histogram,

    /// Pipeline failures - labels: kind
    pub pipeline_failures_total: IntCounterVec,
}

impl ProxyMetrics {
    /// Create and register all request metrics in a fresh registry.
    pub fn new() -> ApiResult<Self> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("shutter_http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )
        .map_err(|e| registration_error("http_requests_total", e))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "shutter_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(HTTP_LATENCY_BUCKETS.to_vec()),
            &["method", "path"],
        )
        .map_err(|e| registration_error("http_request_duration_seconds", e))?;

        let requests_total =
            IntCounter::new("shutter_requests_total", "Count of all image requests")
                .map_err(|e| registration_error("requests_total", e))?;

        let cached_requests_total = IntCounter::new(
            "shutter_cached_requests_total",
            "Count of image requests answered from the cache",
        )
        .map_err(|e| registration_error("cached_requests_total", e))?;

        let cached_request_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "shutter_cached_request_duration_seconds",
                "Duration of image requests answered from the cache",
            )
            .buckets(CACHED_LATENCY_BUCKETS.to_vec()),
        )
        .map_err(|e| registration_error("cached_request_duration_seconds", e))?;

        let uncached_request_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "shutter_uncached_request_duration_seconds",
                "Duration of image requests that ran the transformer",
            )
            .buckets(UNCACHED_LATENCY_BUCKETS.to_vec()),
        )
        .map_err(|e| registration_error("uncached_request_duration_seconds", e))?;

        let pipeline_failures_total = IntCounterVec::new(
            Opts::new(
                "shutter_pipeline_failures_total",
                "Image requests that failed, by failure kind",
            ),
            &["kind"],
        )
        .map_err(|e| registration_error("pipeline_failures_total", e))?;

        let metrics = Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            requests_total,
            cached_requests_total,
            cached_request_duration_seconds,
            uncached_request_duration_seconds,
            pipeline_failures_total,
        };
        metrics.register_all()?;
        Ok(metrics)
    }

    fn register_all(&self) -> ApiResult<()> {
        self.register("http_requests_total", &self.http_requests_total)?;
        self.register(
            "http_request_duration_seconds",
            &self.http_request_duration_seconds,
        )?;
        self.register("requests_total", &self.requests_total)?;
        self.register("cached_requests_total", &self.cached_requests_total)?;
        self.register(
            "cached_request_duration_seconds",
            &self.cached_request_duration_seconds,
        )?;
        self.register(
            "uncached_request_duration_seconds",
            &self.uncached_request_duration_seconds,
        )?;
        self.register("pipeline_failures_total", &self.pipeline_failures_total)?;

        #[cfg(target_os = "linux")]
        self.registry
            .register(Box::new(
                prometheus::process_collector::ProcessCollector::for_self(),
            ))
            .map_err(|e| registration_error("process_collector", e))?;

        Ok(())
    }

    fn register<C>(&self, name: &str, collector: &C) -> ApiResult<()>
    where
        C: Collector + Clone + 'static,
    {
        self.registry
            .register(Box::new(collector.clone()))
            .map_err(|e| registration_error(name, e))
    }

    /// Expose the figures of `cache` at scrape time.
    pub fn register_cache(&self, cache: Arc<TieredCache>) -> ApiResult<()> {
        let collector = CacheCollector::new(cache)?;
        self.registry
            .register(Box::new(collector))
            .map_err(|e| registration_error("cache collector", e))
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a resolved image request.
    pub fn record_resolved(&self, was_cached: bool, duration_secs: f64) {
        self.requests_total.inc();
        if was_cached {
            self.cached_requests_total.inc();
            self.cached_request_duration_seconds.observe(duration_secs);
        } else {
            self.uncached_request_duration_seconds.observe(duration_secs);
        }
    }

    /// Record a failed image request.
    pub fn record_failure(&self, kind: FailureKind) {
        self.requests_total.inc();
        self.pipeline_failures_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Render every registered metric in the text exposition format.
    pub fn render(&self) -> ApiResult<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| ApiError::internal_error(format!("Failed to encode metrics: {}", e)))?;
        Ok(buffer)
    }
}

impl std::fmt::Debug for ProxyMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyMetrics").finish_non_exhaustive()
    }
}

// ============================================================================
// CACHE COLLECTOR
// ============================================================================

const CACHE_GAUGES: &[(&str, &str)] = &[
    ("shutter_cache_hits", "Tiered cache reads that returned an artifact"),
    ("shutter_cache_misses", "Tiered cache reads that found nothing"),
    ("shutter_cache_hit_ratio", "Tiered cache hit ratio"),
    ("shutter_cache_healed", "Index entries dropped because the durable object was gone"),
    ("shutter_cache_read_errors", "Durable reads that failed"),
    ("shutter_cache_write_errors", "Durable writes that failed"),
    ("shutter_index_hits", "Index lookups that found the key"),
    ("shutter_index_misses", "Index lookups that did not find the key"),
    ("shutter_index_hit_ratio", "Index hit ratio"),
    ("shutter_index_keys_added", "Keys inserted into the index"),
    ("shutter_index_keys_updated", "Index inserts that replaced an existing key"),
    ("shutter_index_keys_evicted", "Keys evicted from the index for capacity"),
    ("shutter_index_sets_rejected", "Inserts rejected because the entry exceeds capacity"),
    ("shutter_index_evictions_dropped", "Eviction events dropped on a full queue"),
    ("shutter_index_cost_added", "Total cost inserted into the index"),
    ("shutter_index_cost_evicted", "Total cost evicted from the index"),
    ("shutter_index_entries", "Entries currently in the index"),
    ("shutter_index_resident_cost", "Cost currently held by the index"),
    ("shutter_index_capacity", "Configured index capacity"),
    ("shutter_eviction_events_received", "Eviction events taken by the worker"),
    ("shutter_eviction_deletes_ok", "Durable deletes that succeeded"),
    ("shutter_eviction_deletes_failed", "Durable deletes that failed"),
];

/// Samples the tiered cache when Prometheus scrapes.
struct CacheCollector {
    cache: Arc<TieredCache>,
    gauges: BTreeMap<&'static str, Gauge>,
}

impl CacheCollector {
    fn new(cache: Arc<TieredCache>) -> ApiResult<Self> {
        let mut gauges = BTreeMap::new();
        for (name, help) in CACHE_GAUGES {
            let gauge = Gauge::new(*name, *help).map_err(|e| registration_error(name, e))?;
            gauges.insert(*name, gauge);
        }
        Ok(Self { cache, gauges })
    }

    fn sample(&self) -> Vec<(&'static str, f64)> {
        let tiered = self.cache.stats();
        let index = self.cache.index_stats().unwrap_or_default();
        let eviction = self.cache.eviction_stats();

        vec![
            ("shutter_cache_hits", tiered.hits as f64),
            ("shutter_cache_misses", tiered.misses as f64),
            ("shutter_cache_hit_ratio", tiered.hit_ratio()),
            ("shutter_cache_healed", tiered.healed as f64),
            ("shutter_cache_read_errors", tiered.read_errors as f64),
            ("shutter_cache_write_errors", tiered.write_errors as f64),
            ("shutter_index_hits", index.hits as f64),
            ("shutter_index_misses", index.misses as f64),
            ("shutter_index_hit_ratio", index.hit_ratio()),
            ("shutter_index_keys_added", index.keys_added as f64),
            ("shutter_index_keys_updated", index.keys_updated as f64),
            ("shutter_index_keys_evicted", index.keys_evicted as f64),
            ("shutter_index_sets_rejected", index.sets_rejected as f64),
            ("shutter_index_evictions_dropped", index.evictions_dropped as f64),
            ("shutter_index_cost_added", index.cost_added as f64),
            ("shutter_index_cost_evicted", index.cost_evicted as f64),
            ("shutter_index_entries", index.entries as f64),
            ("shutter_index_resident_cost", index.resident_cost as f64),
            ("shutter_index_capacity", index.capacity as f64),
            ("shutter_eviction_events_received", eviction.events_received as f64),
            ("shutter_eviction_deletes_ok", eviction.deletes_ok as f64),
            ("shutter_eviction_deletes_failed", eviction.deletes_failed as f64),
        ]
    }
}

impl Collector for CacheCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.gauges.values().flat_map(|g| g.desc()).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        for (name, value) in self.sample() {
            if let Some(gauge) = self.gauges.get(name) {
                gauge.set(value);
            }
        }
        self.gauges.values().flat_map(|g| g.collect()).collect()
    }
}

// ============================================================================
// HANDLER
// ============================================================================

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render metrics");
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shutter_core::{Artifact, CacheKey};
    use shutter_storage::{IndexConfig, MemoryStore, TieredCacheConfig};

    fn rendered(metrics: &ProxyMetrics) -> String {
        String::from_utf8(metrics.render().unwrap()).unwrap()
    }

    #[test]
    fn test_request_metrics() {
        let metrics = ProxyMetrics::new().unwrap();
        metrics.record_http_request("GET", "/r/:size/*path", 200, 0.02);
        metrics.record_resolved(true, 0.01);
        metrics.record_resolved(false, 0.5);
        metrics.record_failure(FailureKind::NotFound);

        assert_eq!(metrics.requests_total.get(), 3);
        assert_eq!(metrics.cached_requests_total.get(), 1);
        assert_eq!(metrics.cached_request_duration_seconds.get_sample_count(), 1);
        assert_eq!(metrics.uncached_request_duration_seconds.get_sample_count(), 1);

        let text = rendered(&metrics);
        assert!(text.contains("shutter_http_requests_total"));
        assert!(text.contains("shutter_pipeline_failures_total{kind=\"not_found\"} 1"));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = ProxyMetrics::new().unwrap();
        let b = ProxyMetrics::new().unwrap();
        a.record_resolved(true, 0.01);
        assert_eq!(a.requests_total.get(), 1);
        assert_eq!(b.requests_total.get(), 0);
    }

    #[tokio::test]
    async fn test_cache_figures_sampled_at_scrape() {
        let metrics = ProxyMetrics::new().unwrap();
        let cache = Arc::new(TieredCache::new(
            Arc::new(MemoryStore::new()),
            IndexConfig::new(10),
            TieredCacheConfig::new(),
        ));
        metrics.register_cache(Arc::clone(&cache)).unwrap();

        let key = CacheKey::new("/pic/a.jpg@200x0");
        cache
            .put(&key, &Artifact::new(vec![1u8], "image/jpeg"))
            .await
            .unwrap();
        cache.get(&key).await.unwrap();

        let text = rendered(&metrics);
        assert!(text.contains("shutter_cache_hits 1"));
        assert!(text.contains("shutter_index_entries 1"));
        assert!(text.contains("shutter_index_capacity 10"));
    }
}
