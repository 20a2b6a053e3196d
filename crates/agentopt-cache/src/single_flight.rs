use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::debug;

use crate::error::CacheError;

/// Coalesces concurrent computations for the same key.
///
/// The first caller for a key (the leader) runs its future; callers arriving
/// while it is in flight wait for the leader's output instead of running their
/// own. Once the leader finishes the key is released and the next caller starts
/// a fresh computation.
pub struct SingleFlight<T> {
    calls: Mutex<HashMap<String, broadcast::Sender<T>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` unless a computation for `key` is already in flight, in which
    /// case wait for that one. Returns `Abandoned` to followers whose leader
    /// was dropped before finishing.
    pub async fn run<F>(&self, key: &str, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = T>,
    {
        let follower = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            match calls.get(key) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    calls.insert(key.to_string(), tx);
                    None
                }
            }
        };

        if let Some(mut rx) = follower {
            debug!(key = %key, "Joining in-flight computation");
            return rx
                .recv()
                .await
                .map_err(|_| CacheError::Abandoned(key.to_string()));
        }

        let guard = LeaderGuard {
            flight: self,
            key,
            finished: false,
        };
        let value = fut.await;
        if let Some(tx) = guard.finish() {
            // No receivers is fine: nobody joined.
            let _ = tx.send(value.clone());
        }
        Ok(value)
    }

    /// Keys with a computation currently in flight.
    pub fn in_flight(&self) -> Vec<String> {
        let calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        calls.keys().cloned().collect()
    }
}

/// Releases the leader's key even when the leader future is dropped mid-flight.
struct LeaderGuard<'a, T> {
    flight: &'a SingleFlight<T>,
    key: &'a str,
    finished: bool,
}

impl<T> LeaderGuard<'_, T> {
    fn release(&self) -> Option<broadcast::Sender<T>> {
        let mut calls = self
            .flight
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        calls.remove(self.key)
    }

    fn finish(mut self) -> Option<broadcast::Sender<T>> {
        self.finished = true;
        self.release()
    }
}

impl<T> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            // Dropping the sender wakes followers with a closed channel.
            self.release();
        }
    }
}
