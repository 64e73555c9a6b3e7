//! Property-Based Tests for the Membership Index
//!
//! Property: for any sequence of inserts and removals the resident cost never
//! exceeds the capacity, the accounting matches the live entries, and every
//! capacity eviction is announced exactly once.

use proptest::prelude::*;
use shutter_storage::{EvictionEvent, IndexConfig, MembershipIndex};
use shutter_core::CacheKey;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Op {
    Insert { key: u16, cost: u64 },
    Remove { key: u16 },
    Lookup { key: u16 },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0u16..64, 1u64..8).prop_map(|(key, cost)| Op::Insert { key, cost }),
        1 => (0u16..64).prop_map(|key| Op::Remove { key }),
        2 => (0u16..64).prop_map(|key| Op::Lookup { key }),
    ]
}

fn key(i: u16) -> CacheKey {
    CacheKey::new(format!("/img/{}.jpg@100x0", i))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_capacity_and_accounting_hold(
        capacity in 1u64..40,
        ops in prop::collection::vec(arb_op(), 1..200),
    ) {
        let config = IndexConfig::new(capacity).with_eviction_queue(10_000);
        let (index, mut events) = MembershipIndex::new(config);

        for op in ops {
            match op {
                Op::Insert { key: k, cost } => {
                    index.insert(key(k), cost);
                }
                Op::Remove { key: k } => {
                    index.remove(&key(k));
                }
                Op::Lookup { key: k } => {
                    index.contains(&key(k));
                }
            }
            prop_assert!(index.resident_cost() <= capacity);
        }

        let live: u64 = (0u16..64).filter_map(|k| index.cost_of(&key(k))).sum();
        prop_assert_eq!(live, index.resident_cost());

        let mut announced: Vec<EvictionEvent> = Vec::new();
        while let Ok(event) = events.try_recv() {
            announced.push(event);
        }
        let stats = index.stats();
        prop_assert_eq!(announced.len() as u64, stats.keys_evicted + stats.sets_rejected);
        prop_assert_eq!(stats.evictions_dropped, 0);
    }

    #[test]
    fn prop_evicted_keys_leave_the_index(
        keys in prop::collection::vec(0u16..500, 1..300),
    ) {
        let (index, mut events) = MembershipIndex::new(IndexConfig::new(16).with_eviction_queue(10_000));
        let mut inserted = HashSet::new();
        for k in keys {
            index.insert(key(k), 1);
            inserted.insert(k);
        }

        let resident = (0u16..500).filter(|k| index.peek(&key(*k))).count();
        prop_assert_eq!(resident, index.len());
        prop_assert!(index.len() <= 16);
        prop_assert_eq!(index.len(), inserted.len().min(16));

        while let Ok(event) = events.try_recv() {
            prop_assert_eq!(event.cost, 1);
        }
    }
}
