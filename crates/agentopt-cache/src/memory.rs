use std::time::{Duration, Instant};

use agentopt_models::EvictionPolicy;
use moka::sync::Cache;
use moka::Expiry;

use crate::backend::{CacheBackend, MAX_TTL};

#[derive(Clone)]
struct Timed<V> {
    value: V,
    ttl: Duration,
}

/// Expires each entry after the TTL it was inserted with.
struct PerEntryTtl;

impl<V> Expiry<String, Timed<V>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Timed<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Timed<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory cache backed by moka.
///
/// Frequency-aware: moka admits and evicts with TinyLFU, so a hot key survives
/// a burst of one-off inserts. Capacity is enforced by moka's maintenance
/// tasks and may briefly overshoot `max_capacity`.
pub struct MemoryCache<V> {
    inner: Cache<String, Timed<V>>,
}

impl<V: Clone + Send + Sync + 'static> MemoryCache<V> {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key).map(|timed| timed.value)
    }

    pub fn insert(&self, key: String, value: V, ttl: Duration) {
        let ttl = ttl.min(MAX_TTL);
        self.inner.insert(key, Timed { value, ttl });
    }

    pub fn invalidate(&self, key: &str) -> Option<V> {
        self.inner.remove(key).map(|timed| timed.value)
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

impl<V: Clone + Send + Sync + 'static> CacheBackend<V> for MemoryCache<V> {
    fn get(&self, key: &str) -> Option<V> {
        MemoryCache::get(self, key)
    }

    fn set(&self, key: &str, value: V, ttl: Duration) {
        self.insert(key.to_string(), value, ttl);
    }

    fn remove(&self, key: &str) -> Option<V> {
        self.invalidate(key)
    }

    fn clear(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
    }

    fn len(&self) -> usize {
        self.entry_count() as usize
    }

    fn policy(&self) -> EvictionPolicy {
        EvictionPolicy::Adaptive
    }
}
