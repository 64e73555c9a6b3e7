//! Tiered cache: membership index in front of a durable store.
//!
//! The index answers "was this key stored?" without a network call; the
//! durable store holds the bytes and is authoritative. Reads that the index
//! rejects never reach the store. Reads that the store cannot satisfy heal the
//! index. Writes go to the store first and only then into the index.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use shutter_core::{Artifact, CacheError, CacheKey, DurableStore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::eviction::{eviction_task, EvictionMetrics, EvictionSnapshot};
use super::index::{CostMode, IndexConfig, MembershipIndex};
use super::stats::{IndexStats, TieredCounters, TieredStats};

/// Configuration for a [`TieredCache`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TieredCacheConfig {
    pub cost_mode: CostMode,
    /// Expiry passed to the durable store on every write. `None` keeps objects
    /// until they are evicted.
    pub ttl: Option<Duration>,
}

impl TieredCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cost_mode(mut self, cost_mode: CostMode) -> Self {
        self.cost_mode = cost_mode;
        self
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl.filter(|ttl| !ttl.is_zero());
        self
    }
}

struct EvictionWorker {
    metrics: Arc<EvictionMetrics>,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Cache-aside storage combining a [`MembershipIndex`] with a [`DurableStore`].
pub struct TieredCache {
    index: Option<Arc<MembershipIndex>>,
    store: Arc<dyn DurableStore>,
    config: TieredCacheConfig,
    counters: TieredCounters,
    worker: Option<EvictionWorker>,
}

impl TieredCache {
    /// Build a tiered cache and spawn its eviction worker.
    ///
    /// A capacity of zero disables the index; every read then goes straight to
    /// the durable store. Must be called from within a Tokio runtime.
    pub fn new(
        store: Arc<dyn DurableStore>,
        index_config: IndexConfig,
        config: TieredCacheConfig,
    ) -> Self {
        if index_config.capacity == 0 {
            return Self::without_index(store, config);
        }

        let (index, events) = MembershipIndex::new(index_config);
        let metrics = Arc::new(EvictionMetrics::new());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(eviction_task(
            Arc::clone(&store),
            events,
            Arc::clone(&metrics),
            shutdown.clone(),
        ));

        Self {
            index: Some(Arc::new(index)),
            store,
            config,
            counters: TieredCounters::default(),
            worker: Some(EvictionWorker {
                metrics,
                shutdown,
                handle,
            }),
        }
    }

    /// Build a tiered cache with no membership index.
    pub fn without_index(store: Arc<dyn DurableStore>, config: TieredCacheConfig) -> Self {
        Self {
            index: None,
            store,
            config,
            counters: TieredCounters::default(),
            worker: None,
        }
    }

    /// Look up an artifact.
    ///
    /// `Ok(None)` is a miss. A key the index does not know is a miss without a
    /// durable read. A key the index knows but the store has lost is removed
    /// from the index (no eviction event) and reported as a miss.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Artifact>, CacheError> {
        if let Some(index) = &self.index {
            if !index.contains(key) {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        }

        match self.store.get(key).await {
            Ok(artifact) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(artifact))
            }
            Err(e) if e.is_not_found() => {
                if let Some(index) = &self.index {
                    if index.remove(key) {
                        self.counters.healed.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(key = %key, "Durable object missing, dropped index entry");
                    }
                }
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Err(e) => {
                self.counters.read_errors.fetch_add(1, Ordering::Relaxed);
                Err(CacheError::Read(e))
            }
        }
    }

    /// Store an artifact durably, then record it in the index.
    ///
    /// On a durable failure the index is left untouched.
    pub async fn put(&self, key: &CacheKey, artifact: &Artifact) -> Result<(), CacheError> {
        let expires_at = self.expires_at();
        if let Err(e) = self.store.put(key, artifact, expires_at).await {
            self.counters.write_errors.fetch_add(1, Ordering::Relaxed);
            return Err(CacheError::Write(e));
        }

        if let Some(index) = &self.index {
            index.insert(key.clone(), self.config.cost_mode.cost_of(artifact));
        }
        Ok(())
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(self.config.ttl?).ok()?;
        Utc::now().checked_add_signed(ttl)
    }

    pub fn index(&self) -> Option<&Arc<MembershipIndex>> {
        self.index.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    pub fn config(&self) -> &TieredCacheConfig {
        &self.config
    }

    pub fn stats(&self) -> TieredStats {
        self.counters.snapshot()
    }

    pub fn index_stats(&self) -> Option<IndexStats> {
        self.index.as_ref().map(|index| index.stats())
    }

    pub fn eviction_stats(&self) -> EvictionSnapshot {
        self.worker
            .as_ref()
            .map(|worker| worker.metrics.snapshot())
            .unwrap_or_default()
    }

    /// Stop the eviction worker and wait for it to exit.
    pub async fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown.cancel();
            if let Err(e) = worker.handle.await {
                tracing::warn!(error = %e, "Eviction worker ended abnormally");
            }
        }
    }
}

impl Drop for TieredCache {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.shutdown.cancel();
        }
    }
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("backend", &self.store.backend_name())
            .field("index", &self.index_stats())
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
