//! Eviction Worker
//!
//! Consumes [`EvictionEvent`]s produced by the membership index and deletes the
//! matching durable objects, off the request path.
//!
//! Deletes run one at a time in arrival order. A failed delete is logged and
//! counted but never retried; the orphaned object only costs storage and is
//! eventually reclaimed by the store's own expiry, if configured.
//!
//! ```ignore
//! let (index, events) = MembershipIndex::new(IndexConfig::new(10_000));
//! let metrics = Arc::new(EvictionMetrics::new());
//! let shutdown = CancellationToken::new();
//! tokio::spawn(eviction_task(store, events, Arc::clone(&metrics), shutdown.clone()));
//!
//! // On shutdown
//! shutdown.cancel();
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use shutter_core::DurableStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::index::EvictionEvent;

// ============================================================================
// METRICS
// ============================================================================

/// Counters for eviction deletes.
#[derive(Debug, Default)]
pub struct EvictionMetrics {
    /// Events received from the index.
    pub events_received: AtomicU64,

    /// Durable deletes that succeeded.
    pub deletes_ok: AtomicU64,

    /// Durable deletes that failed (not retried).
    pub deletes_failed: AtomicU64,
}

impl EvictionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> EvictionSnapshot {
        EvictionSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            deletes_ok: self.deletes_ok.load(Ordering::Relaxed),
            deletes_failed: self.deletes_failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of eviction metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvictionSnapshot {
    pub events_received: u64,
    pub deletes_ok: u64,
    pub deletes_failed: u64,
}

impl EvictionSnapshot {
    /// Events fully handled, successfully or not.
    pub fn processed(&self) -> u64 {
        self.deletes_ok + self.deletes_failed
    }
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Delete durable objects for evicted keys until shutdown.
///
/// The task exits when `shutdown` is cancelled or when every sender of the
/// queue has been dropped. Events already queued at shutdown are abandoned.
pub async fn eviction_task(
    store: Arc<dyn DurableStore>,
    mut events: mpsc::Receiver<EvictionEvent>,
    metrics: Arc<EvictionMetrics>,
    shutdown: CancellationToken,
) {
    tracing::info!(backend = store.backend_name(), "Eviction worker started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                tracing::info!("Eviction worker shutting down");
                break;
            }

            event = events.recv() => {
                let Some(event) = event else {
                    tracing::debug!("Eviction queue closed");
                    break;
                };
                delete_evicted(store.as_ref(), event, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        events_received = snapshot.events_received,
        deletes_ok = snapshot.deletes_ok,
        deletes_failed = snapshot.deletes_failed,
        "Eviction worker stopped"
    );
}

async fn delete_evicted(store: &dyn DurableStore, event: EvictionEvent, metrics: &EvictionMetrics) {
    metrics.events_received.fetch_add(1, Ordering::Relaxed);

    match store.delete(&event.key).await {
        Ok(()) => {
            metrics.deletes_ok.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %event.key, cost = event.cost, "Deleted evicted object");
        }
        Err(e) => {
            metrics.deletes_failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                key = %event.key,
                error = %e,
                "Failed to delete evicted object"
            );
        }
    }
}
