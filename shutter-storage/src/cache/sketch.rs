//! Count-min frequency sketch with aging.
//!
//! Approximates how often a key has been touched using four rows of
//! saturating counters, one byte each and capped at 15. Lookups and
//! increments are lock-free. After
//! `width * 10` increments every counter is halved so stale popularity fades.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

const DEPTH: usize = 4;
const MAX_COUNT: u8 = 15;
const RESET_MULTIPLIER: usize = 10;

const SEEDS: [u64; DEPTH] = [
    0x9E37_79B9_7F4A_7C15,
    0xC2B2_AE3D_27D4_EB4F,
    0x1656_67B1_9E37_79F9,
    0x85EB_CA77_C2B2_AE63,
];

#[derive(Debug)]
pub struct FrequencySketch {
    table: Box<[AtomicU8]>,
    width_mask: usize,
    additions: AtomicUsize,
    reset_at: usize,
}

impl FrequencySketch {
    /// Create a sketch with roughly `counters` counters per row.
    ///
    /// The row width is rounded up to a power of two.
    pub fn new(counters: usize) -> Self {
        let width = counters.max(16).next_power_of_two();
        let table = (0..width * DEPTH).map(|_| AtomicU8::new(0)).collect();
        Self {
            table,
            width_mask: width - 1,
            additions: AtomicUsize::new(0),
            reset_at: width.saturating_mul(RESET_MULTIPLIER),
        }
    }

    pub fn width(&self) -> usize {
        self.width_mask + 1
    }

    fn slot(&self, row: usize, hash: u64) -> usize {
        let mixed = (hash ^ SEEDS[row]).wrapping_mul(SEEDS[(row + 1) % DEPTH]);
        let column = (mixed >> 32) as usize & self.width_mask;
        row * self.width() + column
    }

    /// Record one access of `hash`.
    pub fn increment(&self, hash: u64) {
        for row in 0..DEPTH {
            let counter = &self.table[self.slot(row, hash)];
            let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |value| {
                (value < MAX_COUNT).then_some(value + 1)
            });
        }

        let seen = self.additions.fetch_add(1, Ordering::Relaxed) + 1;
        if seen >= self.reset_at
            && self
                .additions
                .compare_exchange(seen, 0, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        {
            self.halve();
        }
    }

    /// Estimated access count of `hash`, never below the true count unless aged.
    pub fn estimate(&self, hash: u64) -> u8 {
        (0..DEPTH)
            .map(|row| self.table[self.slot(row, hash)].load(Ordering::Relaxed))
            .min()
            .unwrap_or(0)
    }

    fn halve(&self) {
        for counter in self.table.iter() {
            let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |value| {
                Some(value >> 1)
            });
        }
    }
}
