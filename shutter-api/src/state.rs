//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use shutter_core::{DurableStore, OriginFetcher, ShutterResult, Transformer};
use shutter_storage::{FsStore, IndexConfig, MemoryStore, TieredCache, TieredCacheConfig};

use crate::clients::{build_http_client, HttpOrigin, HttpTransformer};
use crate::config::{ProxyConfig, StoreBackend};
use crate::error::{ApiError, ApiResult};
use crate::pipeline::TransformPipeline;
use crate::telemetry::ProxyMetrics;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<TransformPipeline>,
    /// Same cache the pipeline uses, for health probes and metrics.
    pub cache: Arc<TieredCache>,
    pub metrics: ProxyMetrics,
    /// Deadline for one resize request.
    pub request_timeout: Duration,
    pub start_time: Instant,
}

impl AppState {
    /// Assemble state from already-built collaborators.
    ///
    /// Registers the cache with a fresh metrics registry.
    pub fn from_parts(
        cache: Arc<TieredCache>,
        origin: Arc<dyn OriginFetcher>,
        transformer: Arc<dyn Transformer>,
        request_timeout: Duration,
    ) -> ApiResult<Self> {
        let metrics = ProxyMetrics::new()?;
        metrics.register_cache(Arc::clone(&cache))?;

        let pipeline = TransformPipeline::new(Arc::clone(&cache), origin, transformer);
        Ok(Self {
            pipeline: Arc::new(pipeline),
            cache,
            metrics,
            request_timeout,
            start_time: Instant::now(),
        })
    }

    /// Build the store, the HTTP clients and the tiered cache from configuration.
    ///
    /// Must be called from within a Tokio runtime; the cache spawns its
    /// eviction worker here.
    pub async fn from_config(config: &ProxyConfig) -> ApiResult<Self> {
        let store = open_store(&config.store).await?;
        tracing::info!(
            backend = store.backend_name(),
            capacity = config.cache_capacity,
            cost_mode = ?config.cost_mode,
            "Durable store ready"
        );

        let index_config =
            IndexConfig::new(config.cache_capacity).with_eviction_queue(config.eviction_queue);
        let cache_config = TieredCacheConfig::new()
            .with_cost_mode(config.cost_mode)
            .with_ttl(config.store_ttl);
        let cache = Arc::new(TieredCache::new(store, index_config, cache_config));

        let client = build_http_client(config.http_timeout).map_err(|e| {
            ApiError::internal_error(format!("Failed to build HTTP client: {}", e))
        })?;
        let origin = HttpOrigin::new(client.clone(), config.origin_url.clone());
        let transformer = HttpTransformer::new(client, config.upstreams.clone());

        Self::from_parts(
            cache,
            Arc::new(origin),
            Arc::new(transformer),
            config.request_timeout,
        )
    }
}

/// Open the configured durable store.
pub async fn open_store(backend: &StoreBackend) -> ShutterResult<Arc<dyn DurableStore>> {
    match backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Fs { root } => Ok(Arc::new(FsStore::open(root.as_str()).await?)),
        #[cfg(feature = "s3")]
        StoreBackend::S3(settings) => {
            let store = shutter_storage::S3Store::new(&shutter_storage::S3Config {
                bucket: settings.bucket.clone(),
                region: settings.region.clone(),
                endpoint: settings.endpoint.clone(),
                access_key: settings.access_key.clone(),
                secret_key: settings.secret_key.clone(),
            })?;
            store.ensure_bucket().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "s3"))]
        StoreBackend::S3(_) => Err(shutter_core::ConfigError::InvalidValue {
            field: "SHUTTER_STORE".to_string(),
            value: "s3".to_string(),
            reason: "requires a build with the `s3` feature".to_string(),
        }
        .into()),
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("cache", &self.cache)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_and_fs() {
        let store = open_store(&StoreBackend::Memory).await.unwrap();
        assert_eq!(store.backend_name(), "memory");

        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&StoreBackend::Fs {
            root: dir.path().to_string_lossy().into_owned(),
        })
        .await
        .unwrap();
        assert_eq!(store.backend_name(), "fs");
    }

    #[cfg(not(feature = "s3"))]
    #[tokio::test]
    async fn test_s3_requires_feature() {
        use crate::config::S3Settings;
        use crate::error::ErrorCode;
        use shutter_core::ShutterError;

        let err = open_store(&StoreBackend::S3(S3Settings {
            endpoint: None,
            bucket: "img-resize".to_string(),
            region: "us-east-1".to_string(),
            access_key: None,
            secret_key: None,
        }))
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ShutterError::Config(_)));
        assert_eq!(ApiError::from(err).code, ErrorCode::ConfigInvalid);
    }

    #[tokio::test]
    async fn test_from_config_builds_state() {
        let config = ProxyConfig {
            upstreams: vec!["http://127.0.0.1:9".to_string()],
            cache_capacity: 16,
            ..ProxyConfig::default()
        };
        let state = AppState::from_config(&config).await.unwrap();
        assert_eq!(state.request_timeout, config.request_timeout);
        assert_eq!(state.cache.index().map(|i| i.capacity()), Some(16));
    }
}
