use std::sync::Arc;
use std::time::Duration;

use agentopt_models::EvictionPolicy;

use crate::error::CacheError;
use crate::memory::MemoryCache;
use crate::store::CacheStore;

/// Longest TTL a backend honours. Longer TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// The cache surface agents program against.
///
/// Operations are synchronous: bookkeeping never suspends, only the wrapped
/// operation does.
pub trait CacheBackend<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;

    /// `ttl` is clamped to [`MAX_TTL`].
    fn set(&self, key: &str, value: V, ttl: Duration);

    /// Implemented via `get`, so it may purge an expired entry.
    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn remove(&self, key: &str) -> Option<V>;

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn policy(&self) -> EvictionPolicy;
}

/// Build a cache for the configured eviction policy.
pub fn build_cache<V>(
    policy: EvictionPolicy,
    max_size: usize,
) -> Result<Arc<dyn CacheBackend<V>>, CacheError>
where
    V: Clone + Send + Sync + 'static,
{
    if max_size == 0 {
        return Err(CacheError::InvalidCapacity(max_size));
    }

    Ok(match policy {
        EvictionPolicy::InsertionOrder => Arc::new(CacheStore::new(max_size)),
        EvictionPolicy::Adaptive => Arc::new(MemoryCache::new(max_size as u64)),
    })
}
