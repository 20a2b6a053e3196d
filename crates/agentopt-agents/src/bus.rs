use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

/// Channel writers publish to when stored trades change. Payload
/// `{"user_id": ...}` targets one user; anything else means everyone.
pub const CACHE_INVALIDATION_CHANNEL: &str = "cache.invalidate";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusMessage {
    pub channel: String,
    pub sender: String,
    pub payload: Value,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&BusMessage) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    channels: HashMap<String, Vec<(SubscriptionId, Handler)>>,
}

/// In-process publish/subscribe between agents.
///
/// Delivery is synchronous, in subscription order, on the publisher's
/// thread. Handlers may publish or subscribe themselves: the handler list is
/// copied out before any handler runs.
#[derive(Default)]
pub struct CommunicationBus {
    registry: RwLock<Registry>,
}

impl CommunicationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, channel: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&BusMessage) + Send + Sync + 'static,
    {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry
            .channels
            .entry(channel.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        registry.channels.retain(|_, handlers| {
            let before = handlers.len();
            handlers.retain(|(sid, _)| *sid != id);
            removed |= handlers.len() != before;
            !handlers.is_empty()
        });
        removed
    }

    /// Deliver to every current subscriber of `channel`. Returns how many
    /// handlers ran.
    pub fn publish(&self, channel: &str, sender: &str, payload: Value) -> usize {
        let handlers: Vec<Handler> = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .channels
            .get(channel)
            .map(|subs| subs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        let message = BusMessage {
            channel: channel.to_string(),
            sender: sender.to_string(),
            payload,
            sent_at: Utc::now(),
        };
        for handler in &handlers {
            handler(&message);
        }

        trace!(channel = %channel, sender = %sender, delivered = handlers.len(), "Published");
        handlers.len()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .channels
            .get(channel)
            .map_or(0, Vec::len)
    }
}
