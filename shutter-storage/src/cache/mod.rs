//! Tiered cache-aside layer.
//!
//! A [`TieredCache`] pairs an in-process [`MembershipIndex`] with a
//! [`DurableStore`](shutter_core::DurableStore):
//!
//! - The index tracks which keys were stored, bounded by a cost budget, and
//!   never holds payload bytes.
//! - The durable store holds the artifacts and is the source of truth.
//! - Capacity evictions in the index are forwarded to an eviction worker that
//!   deletes the matching durable objects in the background.
//!
//! # Example
//!
//! ```ignore
//! let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
//! let cache = TieredCache::new(store, IndexConfig::new(100_000), TieredCacheConfig::new());
//!
//! cache.put(&key, &artifact).await?;
//! assert!(cache.get(&key).await?.is_some());
//! ```

pub mod eviction;
pub mod index;
pub mod sketch;
pub mod stats;
pub mod tiered;

pub use eviction::{eviction_task, EvictionMetrics, EvictionSnapshot};
pub use index::{CostMode, EvictionEvent, IndexConfig, MembershipIndex};
pub use sketch::FrequencySketch;
pub use stats::{IndexStats, TieredStats};
pub use tiered::{TieredCache, TieredCacheConfig};
