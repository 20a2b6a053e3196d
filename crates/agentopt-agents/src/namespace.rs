use std::sync::Arc;
use std::time::Duration;

use agentopt_cache::{CacheBackend, SingleFlight};

use crate::error::AgentError;

/// One independently keyed, independently TTL'd cache owned by an agent,
/// together with the single-flight map that coalesces misses on it.
pub struct CacheNamespace<V> {
    name: &'static str,
    store: Arc<dyn CacheBackend<V>>,
    flight: SingleFlight<Result<V, AgentError>>,
    ttl: Duration,
}

impl<V: Clone + Send + Sync + 'static> CacheNamespace<V> {
    pub fn new(name: &'static str, store: Arc<dyn CacheBackend<V>>, ttl: Duration) -> Self {
        Self {
            name,
            store,
            flight: SingleFlight::new(),
            ttl,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.store.get(key)
    }

    pub fn put(&self, key: &str, value: V) {
        self.store.set(key, value, self.ttl);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.has(key)
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.store.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub(crate) fn flight(&self) -> &SingleFlight<Result<V, AgentError>> {
        &self.flight
    }
}
