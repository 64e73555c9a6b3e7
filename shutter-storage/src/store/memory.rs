//! In-process durable store.
//!
//! Useful for single-node deployments without persistence and as the store
//! behind tests: it counts calls and can be told to fail on demand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shutter_core::{Artifact, CacheKey, DurableStore, StoreError};

#[derive(Debug, Clone)]
struct StoredObject {
    artifact: Artifact,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredObject {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Number of calls made to each store operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCallCounts {
    pub exists: u64,
    pub gets: u64,
    pub puts: u64,
    pub deletes: u64,
}

#[derive(Debug, Default)]
struct CallCounters {
    exists: AtomicU64,
    gets: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
}

#[derive(Debug, Default)]
struct Faults {
    exists: AtomicBool,
    gets: AtomicBool,
    puts: AtomicBool,
    deletes: AtomicBool,
}

/// Durable store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<CacheKey, StoredObject>>,
    calls: CallCounters,
    faults: Faults,
    /// Milliseconds each `put` waits before writing.
    put_delay_ms: AtomicU64,
}

fn injected(operation: &str) -> StoreError {
    StoreError::Unavailable {
        reason: format!("injected {} failure", operation),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_counts(&self) -> StoreCallCounts {
        StoreCallCounts {
            exists: self.calls.exists.load(Ordering::Relaxed),
            gets: self.calls.gets.load(Ordering::Relaxed),
            puts: self.calls.puts.load(Ordering::Relaxed),
            deletes: self.calls.deletes.load(Ordering::Relaxed),
        }
    }

    pub fn fail_exists(&self, fail: bool) {
        self.faults.exists.store(fail, Ordering::Relaxed);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.faults.gets.store(fail, Ordering::Relaxed);
    }

    pub fn fail_puts(&self, fail: bool) {
        self.faults.puts.store(fail, Ordering::Relaxed);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.faults.deletes.store(fail, Ordering::Relaxed);
    }

    /// Make every later `put` wait `delay` before writing.
    pub fn delay_puts(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.put_delay_ms.store(millis, Ordering::Relaxed);
    }

    /// Drop an object behind the cache's back, as an external actor would.
    pub fn forget(&self, key: &CacheKey) -> bool {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Whether `key` is stored, without counting a call or applying expiry.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Expiry recorded for `key`; `None` when the key is absent.
    pub fn expires_at(&self, key: &CacheKey) -> Option<Option<DateTime<Utc>>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|object| object.expires_at)
    }

    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, key: &CacheKey) -> Option<StoredObject> {
        let now = Utc::now();
        let object = self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()?;
        if object.is_expired(now) {
            self.forget(key);
            return None;
        }
        Some(object)
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn exists(&self, key: &CacheKey) -> Result<bool, StoreError> {
        self.calls.exists.fetch_add(1, Ordering::Relaxed);
        if self.faults.exists.load(Ordering::Relaxed) {
            return Err(injected("exists"));
        }
        Ok(self.live(key).is_some())
    }

    async fn get(&self, key: &CacheKey) -> Result<Artifact, StoreError> {
        self.calls.gets.fetch_add(1, Ordering::Relaxed);
        if self.faults.gets.load(Ordering::Relaxed) {
            return Err(injected("get"));
        }
        self.live(key)
            .map(|object| object.artifact)
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn put(
        &self,
        key: &CacheKey,
        artifact: &Artifact,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.calls.puts.fetch_add(1, Ordering::Relaxed);
        let delay = self.put_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.faults.puts.load(Ordering::Relaxed) {
            return Err(injected("put"));
        }
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.clone(),
                StoredObject {
                    artifact: artifact.clone(),
                    expires_at,
                },
            );
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        self.calls.deletes.fetch_add(1, Ordering::Relaxed);
        if self.faults.deletes.load(Ordering::Relaxed) {
            return Err(injected("delete"));
        }
        self.forget(key);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
