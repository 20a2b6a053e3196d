use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use agentopt_models::EvictionPolicy;
use tracing::trace;

use crate::backend::{CacheBackend, MAX_TTL};

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    /// Insertion sequence number, the eviction order.
    seq: u64,
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V> Inner<V> {
    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) {
        if let Some((_, key)) = self.order.pop_first() {
            trace!(key = %key, "Evicting oldest cache entry");
            self.entries.remove(&key);
        }
    }
}

/// `now + ttl`, halving `ttl` until `Instant` can represent the sum.
fn deadline(now: Instant, ttl: Duration) -> Instant {
    let mut ttl = ttl.min(MAX_TTL);
    loop {
        if let Some(at) = now.checked_add(ttl) {
            return at;
        }
        ttl /= 2;
    }
}

/// Bounded key-value store with per-entry TTL.
///
/// Expiry is lazy: an expired entry is purged by the read that finds it, there
/// is no background sweep. When full, the oldest *inserted* key is evicted;
/// reads do not refresh an entry's position, so this is not access-order LRU.
///
/// Every operation runs under one mutex, which keeps the capacity bound exact
/// when the store is shared across threads.
pub struct CacheStore<V> {
    inner: Mutex<Inner<V>>,
    max_size: usize,
}

impl<V: Clone> CacheStore<V> {
    /// A `max_size` of zero is treated as one.
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
            max_size: max_size.max(1),
        }
    }

    /// Insert or overwrite `key`. Overwriting keeps the key's original
    /// insertion position and never evicts.
    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        let expires_at = deadline(Instant::now(), ttl);
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = inner.entries.get_mut(key) {
            entry.value = value;
            entry.expires_at = expires_at;
            return;
        }

        if inner.entries.len() >= self.max_size {
            inner.evict_oldest();
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.to_string());
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at,
                seq,
            },
        );
    }

    /// Returns the value if present and unexpired. An expired entry is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => Instant::now() > entry.expires_at,
        };

        if expired {
            trace!(key = %key, "Purging expired cache entry");
            inner.remove(key);
            return None;
        }
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Same as `get(key).is_some()`, including the purge of an expired entry.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.remove(key).map(|entry| entry.value)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.clear();
        inner.order.clear();
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl<V: Clone + Send + Sync> CacheBackend<V> for CacheStore<V> {
    fn get(&self, key: &str) -> Option<V> {
        CacheStore::get(self, key)
    }

    fn set(&self, key: &str, value: V, ttl: Duration) {
        CacheStore::set(self, key, value, ttl);
    }

    fn remove(&self, key: &str) -> Option<V> {
        CacheStore::remove(self, key)
    }

    fn clear(&self) {
        CacheStore::clear(self);
    }

    fn len(&self) -> usize {
        CacheStore::len(self)
    }

    fn policy(&self) -> EvictionPolicy {
        EvictionPolicy::InsertionOrder
    }
}
