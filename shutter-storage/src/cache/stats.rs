//! Counters for the membership index and the tiered cache.
//!
//! Counters are plain atomics updated on the hot path; callers read them
//! through point-in-time snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// ============================================================================
// INDEX COUNTERS
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct IndexCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub keys_added: AtomicU64,
    pub keys_updated: AtomicU64,
    pub keys_evicted: AtomicU64,
    pub cost_added: AtomicU64,
    pub cost_evicted: AtomicU64,
    pub sets_rejected: AtomicU64,
    pub evictions_dropped: AtomicU64,
}

/// Snapshot of membership index activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Lookups that found the key.
    pub hits: u64,
    /// Lookups that did not.
    pub misses: u64,
    pub keys_added: u64,
    pub keys_updated: u64,
    /// Keys removed by capacity eviction (explicit removals are not counted).
    pub keys_evicted: u64,
    pub cost_added: u64,
    pub cost_evicted: u64,
    /// Inserts refused because a single entry exceeds the capacity.
    pub sets_rejected: u64,
    /// Eviction events lost because the queue was full or closed.
    pub evictions_dropped: u64,
    pub entries: u64,
    pub resident_cost: u64,
    pub capacity: u64,
}

impl IndexStats {
    /// Fraction of lookups that were hits, 0.0 when nothing was looked up.
    pub fn hit_ratio(&self) -> f64 {
        ratio(self.hits, self.misses)
    }
}

impl IndexCounters {
    pub fn snapshot(&self, entries: u64, resident_cost: u64, capacity: u64) -> IndexStats {
        IndexStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            keys_added: self.keys_added.load(Ordering::Relaxed),
            keys_updated: self.keys_updated.load(Ordering::Relaxed),
            keys_evicted: self.keys_evicted.load(Ordering::Relaxed),
            cost_added: self.cost_added.load(Ordering::Relaxed),
            cost_evicted: self.cost_evicted.load(Ordering::Relaxed),
            sets_rejected: self.sets_rejected.load(Ordering::Relaxed),
            evictions_dropped: self.evictions_dropped.load(Ordering::Relaxed),
            entries,
            resident_cost,
            capacity,
        }
    }
}

// ============================================================================
// TIERED CACHE COUNTERS
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct TieredCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub healed: AtomicU64,
    pub read_errors: AtomicU64,
    pub write_errors: AtomicU64,
}

impl TieredCounters {
    pub fn snapshot(&self) -> TieredStats {
        TieredStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            healed: self.healed.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of tiered cache outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TieredStats {
    /// `get` calls that returned an artifact.
    pub hits: u64,
    /// `get` calls that returned `None`.
    pub misses: u64,
    /// Index entries dropped because the durable object was gone.
    pub healed: u64,
    pub read_errors: u64,
    pub write_errors: u64,
}

impl TieredStats {
    pub fn hit_ratio(&self) -> f64 {
        ratio(self.hits, self.misses)
    }
}

fn ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let stats = TieredStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_ratio() - 0.75).abs() < f64::EPSILON);
        assert_eq!(TieredStats::default().hit_ratio(), 0.0);
    }
}
