//! shutter Storage - Tiered cache and durable store backends
//!
//! Holds the stateful half of the proxy: the bounded membership index, the
//! durable store implementations and the [`TieredCache`] that coordinates them.

pub mod cache;
pub mod store;

pub use cache::{
    eviction_task, CostMode, EvictionEvent, EvictionMetrics, EvictionSnapshot, FrequencySketch,
    IndexConfig, IndexStats, MembershipIndex, TieredCache, TieredCacheConfig, TieredStats,
};
pub use store::{FsStore, MemoryStore, StoreCallCounts};
#[cfg(feature = "s3")]
pub use store::{S3Config, S3Store};
