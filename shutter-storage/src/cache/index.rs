//! Bounded, frequency-aware membership index.
//!
//! The index records which cache keys are believed to exist in the durable
//! store. It never holds payload bytes, only `(key, cost)` pairs.
//!
//! # Eviction
//!
//! When the resident cost exceeds the capacity, victims come from a small pool
//! of eviction candidates. The pool is refilled by walking the map and keeping
//! the entries with the lowest estimated access frequency, older entries first
//! on ties. Every capacity eviction produces exactly one [`EvictionEvent`],
//! sent on a bounded queue once the map guard has been released. Explicit
//! removals via [`MembershipIndex::remove`] never produce events.
//!
//! # Concurrency
//!
//! Entries live in a [`DashMap`]. Cost accounting and statistics are atomics,
//! and the frequency sketch is lock-free. Evictions are serialized by the
//! candidate pool mutex. Concurrent inserts may overshoot the capacity
//! briefly; the overshoot is bounded by the cost of the in-flight inserts.

use std::cmp::Ordering as CmpOrdering;
use std::collections::hash_map::RandomState;
use std::collections::BinaryHeap;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;
use shutter_core::{Artifact, CacheKey};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::sketch::FrequencySketch;
use super::stats::{IndexCounters, IndexStats};

pub const DEFAULT_SHARDS: usize = 16;
pub const DEFAULT_EVICTION_BATCH: usize = 64;
pub const DEFAULT_EVICTION_QUEUE: usize = 1024;

const MIN_COUNTERS: usize = 1024;
const MAX_COUNTERS: usize = 1 << 22;

/// A pool refill never takes more than this fraction of the resident entries.
const BATCH_DIVISOR: usize = 8;
// ============================================================================
// CONFIGURATION
// ============================================================================

/// How an entry's cost is computed from its artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CostMode {
    /// Every entry costs 1; capacity is an entry count.
    #[default]
    Entries,
    /// Cost is the artifact size in bytes; capacity is a byte budget.
    Bytes,
}

impl CostMode {
    pub fn cost_of(&self, artifact: &Artifact) -> u64 {
        match self {
            CostMode::Entries => 1,
            CostMode::Bytes => (artifact.len() as u64).max(1),
        }
    }
}

impl std::str::FromStr for CostMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "entries" => Ok(CostMode::Entries),
            "bytes" => Ok(CostMode::Bytes),
            other => Err(format!("expected 'entries' or 'bytes', got '{}'", other)),
        }
    }
}

/// Configuration for a [`MembershipIndex`].
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Maximum resident cost.
    pub capacity: u64,
    /// Number of map shards, rounded up to a power of two of at least 2.
    pub shards: usize,
    /// Candidates kept per refill of the eviction pool.
    pub eviction_batch: usize,
    /// Bound of the eviction event queue.
    pub eviction_queue: usize,
    /// Counters per frequency sketch row.
    pub counters: usize,
}

impl IndexConfig {
    /// Config for the given capacity with default tuning.
    ///
    /// The sketch gets ten counters per expected entry, clamped to a sane range.
    pub fn new(capacity: u64) -> Self {
        let counters = (capacity.saturating_mul(10).min(MAX_COUNTERS as u64) as usize)
            .clamp(MIN_COUNTERS, MAX_COUNTERS)
            .next_power_of_two();
        Self {
            capacity,
            shards: DEFAULT_SHARDS,
            eviction_batch: DEFAULT_EVICTION_BATCH,
            eviction_queue: DEFAULT_EVICTION_QUEUE,
            counters,
        }
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn with_eviction_batch(mut self, batch: usize) -> Self {
        self.eviction_batch = batch;
        self
    }

    pub fn with_eviction_queue(mut self, bound: usize) -> Self {
        self.eviction_queue = bound;
        self
    }

    pub fn with_counters(mut self, counters: usize) -> Self {
        self.counters = counters;
        self
    }
}

// ============================================================================
// EVENTS
// ============================================================================

/// Emitted once per capacity-driven eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionEvent {
    pub key: CacheKey,
    pub cost: u64,
}

// ============================================================================
// INDEX
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Entry {
    hash: u64,
    cost: u64,
    seq: u64,
}

/// An entry picked for eviction, ordered by frequency then age.
#[derive(Debug)]
struct Candidate {
    frequency: u8,
    seq: u64,
    key: CacheKey,
}

impl Candidate {
    fn rank(&self) -> (u8, u64) {
        (self.frequency, self.seq)
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.rank().cmp(&other.rank())
    }
}

/// Bounded set of cache keys with frequency-weighted eviction.
#[derive(Debug)]
pub struct MembershipIndex {
    entries: DashMap<CacheKey, Entry>,
    hasher: RandomState,
    sketch: FrequencySketch,
    capacity: u64,
    eviction_batch: usize,
    next_seq: AtomicU64,
    resident_cost: AtomicU64,
    len: AtomicUsize,
    counters: IndexCounters,
    events: mpsc::Sender<EvictionEvent>,
    /// Lowest-ranked candidate last; held for the whole eviction pass.
    pool: Mutex<Vec<Candidate>>,
}

impl MembershipIndex {
    /// Build an index and the receiving end of its eviction queue.
    pub fn new(config: IndexConfig) -> (Self, mpsc::Receiver<EvictionEvent>) {
        let shard_count = config.shards.max(2).next_power_of_two();
        let (events, receiver) = mpsc::channel(config.eviction_queue.max(1));

        let index = Self {
            entries: DashMap::with_shard_amount(shard_count),
            hasher: RandomState::new(),
            sketch: FrequencySketch::new(config.counters),
            capacity: config.capacity,
            eviction_batch: config.eviction_batch.max(1),
            next_seq: AtomicU64::new(0),
            resident_cost: AtomicU64::new(0),
            len: AtomicUsize::new(0),
            counters: IndexCounters::default(),
            events,
            pool: Mutex::new(Vec::new()),
        };
        (index, receiver)
    }

    fn hash(&self, key: &CacheKey) -> u64 {
        self.hasher.hash_one(key)
    }

    /// Check membership, recording a hit or miss and the access frequency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.sketch.increment(self.hash(key));
        let present = self.entries.contains_key(key);

        let counter = if present {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        present
    }

    /// Check membership without touching statistics or frequencies.
    pub fn peek(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Cost currently recorded for `key`.
    pub fn cost_of(&self, key: &CacheKey) -> Option<u64> {
        self.entries.get(key).map(|entry| entry.cost)
    }

    /// Record `key` as present with the given cost, evicting as needed.
    ///
    /// Returns `false` when the entry alone exceeds the capacity. Such an
    /// entry is not admitted; an eviction event is emitted for it so its
    /// durable object is cleaned up like any other evicted entry.
    pub fn insert(&self, key: CacheKey, cost: u64) -> bool {
        let cost = cost.max(1);
        let hash = self.hash(&key);
        self.sketch.increment(hash);

        if cost > self.capacity {
            self.counters.sets_rejected.fetch_add(1, Ordering::Relaxed);
            self.remove(&key);
            tracing::debug!(key = %key, cost, capacity = self.capacity, "Entry exceeds index capacity");
            self.emit(EvictionEvent { key, cost });
            return false;
        }

        let entry = Entry {
            hash,
            cost,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        self.resident_cost.fetch_add(cost, Ordering::AcqRel);
        match self.entries.insert(key.clone(), entry) {
            Some(previous) => {
                self.resident_cost.fetch_sub(previous.cost, Ordering::AcqRel);
                self.counters.keys_updated.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.len.fetch_add(1, Ordering::Relaxed);
                self.counters.keys_added.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.counters.cost_added.fetch_add(cost, Ordering::Relaxed);

        self.enforce_capacity(Some(&key));
        true
    }

    /// Remove `key` without emitting an eviction event.
    ///
    /// Returns whether the key was present.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let Some((_, entry)) = self.entries.remove(key) else {
            return false;
        };
        self.resident_cost.fetch_sub(entry.cost, Ordering::AcqRel);
        self.len.fetch_sub(1, Ordering::Relaxed);
        true
    }

    /// Drop every entry. No eviction events are emitted.
    pub fn clear(&self) {
        let mut cost = 0u64;
        let mut count = 0usize;
        self.entries.retain(|_, entry| {
            cost += entry.cost;
            count += 1;
            false
        });
        self.resident_cost.fetch_sub(cost, Ordering::AcqRel);
        self.len.fetch_sub(count, Ordering::Relaxed);
        self.lock_pool().clear();
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resident_cost(&self) -> u64 {
        self.resident_cost.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn stats(&self) -> IndexStats {
        self.counters
            .snapshot(self.len() as u64, self.resident_cost(), self.capacity)
    }

    // ========================================================================
    // EVICTION
    // ========================================================================

    fn lock_pool(&self) -> std::sync::MutexGuard<'_, Vec<Candidate>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enforce_capacity(&self, protected: Option<&CacheKey>) {
        if self.resident_cost() <= self.capacity {
            return;
        }

        let mut pool = self.lock_pool();
        let max_rounds = self.len() + self.eviction_batch + 1;
        let mut rounds = 0;
        while self.resident_cost() > self.capacity {
            rounds += 1;
            if rounds > max_rounds {
                tracing::warn!(
                    resident_cost = self.resident_cost(),
                    capacity = self.capacity,
                    "Index still over capacity after eviction pass"
                );
                break;
            }

            if pool.is_empty() {
                *pool = self.collect_candidates(protected);
            }
            let Some(candidate) = pool.pop() else {
                break;
            };
            if Some(&candidate.key) == protected {
                continue;
            }

            if let Some(event) = self.evict(&candidate) {
                self.emit(event);
            }
        }
    }

    /// Walk the map and keep the lowest-ranked entries, lowest last.
    ///
    /// At most one entry in [`BATCH_DIVISOR`] is taken so frequently used
    /// keys never reach the pool while colder ones exist.
    fn collect_candidates(&self, protected: Option<&CacheKey>) -> Vec<Candidate> {
        let want = self
            .eviction_batch
            .min(self.len() / BATCH_DIVISOR)
            .max(1);
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(want + 1);

        for item in self.entries.iter() {
            if Some(item.key()) == protected {
                continue;
            }
            let entry = item.value();
            let rank = (self.sketch.estimate(entry.hash), entry.seq);
            if heap.len() >= want && heap.peek().is_some_and(|worst| rank >= worst.rank()) {
                continue;
            }
            heap.push(Candidate {
                frequency: rank.0,
                seq: rank.1,
                key: item.key().clone(),
            });
            if heap.len() > want {
                heap.pop();
            }
        }

        let mut candidates = heap.into_sorted_vec();
        candidates.reverse();
        candidates
    }

    fn evict(&self, candidate: &Candidate) -> Option<EvictionEvent> {
        // The entry may have been removed or rewritten since it was collected.
        let (key, entry) = self
            .entries
            .remove_if(&candidate.key, |_, entry| entry.seq == candidate.seq)?;

        self.resident_cost.fetch_sub(entry.cost, Ordering::AcqRel);
        self.len.fetch_sub(1, Ordering::Relaxed);
        self.counters.keys_evicted.fetch_add(1, Ordering::Relaxed);
        self.counters
            .cost_evicted
            .fetch_add(entry.cost, Ordering::Relaxed);

        Some(EvictionEvent {
            key,
            cost: entry.cost,
        })
    }

    fn emit(&self, event: EvictionEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.counters
                    .evictions_dropped
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %event.key, "Eviction queue full, durable object left behind");
            }
            Err(TrySendError::Closed(event)) => {
                self.counters
                    .evictions_dropped
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %event.key, "Eviction queue closed");
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: usize) -> CacheKey {
        CacheKey::new(format!("/pic/{}.jpg@200x0", i))
    }

    fn drain(receiver: &mut mpsc::Receiver<EvictionEvent>) -> Vec<EvictionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_insert_and_contains() {
        let (index, _rx) = MembershipIndex::new(IndexConfig::new(10));
        assert!(!index.contains(&key(1)));
        assert!(index.insert(key(1), 1));
        assert!(index.contains(&key(1)));
        assert_eq!(index.len(), 1);
        assert_eq!(index.resident_cost(), 1);

        let stats = index.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.keys_added, 1);
    }

    #[test]
    fn test_peek_does_not_count() {
        let (index, _rx) = MembershipIndex::new(IndexConfig::new(10));
        index.insert(key(1), 1);
        assert!(index.peek(&key(1)));
        assert!(!index.peek(&key(2)));
        assert_eq!(index.stats().hits + index.stats().misses, 0);
    }

    #[test]
    fn test_update_adjusts_cost() {
        let (index, _rx) = MembershipIndex::new(IndexConfig::new(100));
        index.insert(key(1), 10);
        index.insert(key(1), 30);
        assert_eq!(index.len(), 1);
        assert_eq!(index.resident_cost(), 30);
        assert_eq!(index.cost_of(&key(1)), Some(30));
        assert_eq!(index.stats().keys_updated, 1);
    }

    #[test]
    fn test_capacity_enforced_with_events() {
        let (index, mut rx) = MembershipIndex::new(IndexConfig::new(3));
        for i in 0..10 {
            index.insert(key(i), 1);
            assert!(index.resident_cost() <= 3);
        }
        assert_eq!(index.len(), 3);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 7);
        assert_eq!(index.stats().keys_evicted, 7);
        assert_eq!(index.stats().cost_evicted, 7);

        // Every evicted key is gone from the index.
        for event in &events {
            assert!(!index.peek(&event.key));
        }
    }

    #[test]
    fn test_just_inserted_key_survives() {
        let (index, _rx) = MembershipIndex::new(IndexConfig::new(1));
        for i in 0..20 {
            index.insert(key(i), 1);
            assert!(index.peek(&key(i)));
        }
    }

    #[test]
    fn test_frequent_keys_are_kept() {
        let (index, _rx) = MembershipIndex::new(IndexConfig::new(50));
        index.insert(key(0), 1);
        for _ in 0..14 {
            index.contains(&key(0));
        }
        for i in 1..200 {
            index.insert(key(i), 1);
        }
        assert!(index.peek(&key(0)));
    }

    #[test]
    fn test_ties_evict_oldest_first() {
        let (index, mut rx) = MembershipIndex::new(IndexConfig::new(3));
        for i in 0..6 {
            index.insert(key(i), 1);
        }
        let evicted: Vec<_> = drain(&mut rx).into_iter().map(|e| e.key).collect();
        assert_eq!(evicted, vec![key(0), key(1), key(2)]);
    }

    #[test]
    fn test_rewritten_candidate_is_not_evicted() {
        let (index, mut rx) = MembershipIndex::new(IndexConfig::new(16));
        for i in 0..17 {
            index.insert(key(i), 1);
        }
        // key(1) is still pooled from the last pass; rewriting it supersedes that.
        index.insert(key(1), 1);
        index.insert(key(17), 1);

        let evicted: Vec<_> = drain(&mut rx).into_iter().map(|e| e.key).collect();
        assert_eq!(evicted, vec![key(0), key(2)]);
        assert!(index.peek(&key(1)));
        assert_eq!(index.len(), 16);
    }

    #[test]
    fn test_oversize_entry_rejected() {
        let (index, mut rx) = MembershipIndex::new(IndexConfig::new(100));
        assert!(!index.insert(key(1), 101));
        assert!(!index.peek(&key(1)));
        assert_eq!(index.stats().sets_rejected, 1);

        let events = drain(&mut rx);
        assert_eq!(events, vec![EvictionEvent { key: key(1), cost: 101 }]);
    }

    #[test]
    fn test_remove_emits_no_event() {
        let (index, mut rx) = MembershipIndex::new(IndexConfig::new(10));
        index.insert(key(1), 4);
        assert!(index.remove(&key(1)));
        assert!(!index.remove(&key(1)));
        assert_eq!(index.resident_cost(), 0);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(index.stats().keys_evicted, 0);
    }

    #[test]
    fn test_full_queue_counts_dropped_events() {
        let config = IndexConfig::new(1).with_eviction_queue(2);
        let (index, mut rx) = MembershipIndex::new(config);
        for i in 0..6 {
            index.insert(key(i), 1);
        }
        assert_eq!(drain(&mut rx).len(), 2);
        assert_eq!(index.stats().evictions_dropped, 3);
        assert_eq!(index.stats().keys_evicted, 5);
    }

    #[test]
    fn test_closed_queue_does_not_block() {
        let (index, rx) = MembershipIndex::new(IndexConfig::new(1));
        drop(rx);
        index.insert(key(1), 1);
        index.insert(key(2), 1);
        assert_eq!(index.len(), 1);
        assert_eq!(index.stats().evictions_dropped, 1);
    }

    #[test]
    fn test_clear() {
        let (index, mut rx) = MembershipIndex::new(IndexConfig::new(10));
        for i in 0..5 {
            index.insert(key(i), 2);
        }
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.resident_cost(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_cost_mode() {
        let artifact = Artifact::new(vec![0u8; 42], "image/jpeg");
        assert_eq!(CostMode::Entries.cost_of(&artifact), 1);
        assert_eq!(CostMode::Bytes.cost_of(&artifact), 42);
        assert_eq!(CostMode::Bytes.cost_of(&Artifact::new(Vec::new(), "image/jpeg")), 1);
        assert_eq!("BYTES".parse::<CostMode>(), Ok(CostMode::Bytes));
        assert!("pages".parse::<CostMode>().is_err());
    }

    #[test]
    fn test_config_counters() {
        assert_eq!(IndexConfig::new(10).counters, 1024);
        assert_eq!(IndexConfig::new(100_000).counters, 1 << 20);
        assert_eq!(IndexConfig::new(u64::MAX).counters, 1 << 22);
    }

    #[test]
    fn test_concurrent_inserts_stay_bounded() {
        use std::sync::Arc;

        let (index, _rx) = MembershipIndex::new(IndexConfig::new(64).with_eviction_queue(10_000));
        let index = Arc::new(index);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        index.insert(key(t * 1000 + i), 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(index.resident_cost() <= 64);
        assert_eq!(index.resident_cost(), index.len() as u64);
        let stats = index.stats();
        assert_eq!(stats.keys_added - stats.keys_evicted, index.len() as u64);
    }
}
