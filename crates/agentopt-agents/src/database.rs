use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use agentopt_cache::CacheBackend;
use agentopt_models::{AgentResult, DatabaseAgentConfig, PortfolioSummary, ResultSource, Trade};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agent::{unsupported, AgentRequest, AgentResponse, Method, OptimizedAgent};
use crate::base::BaseAgent;
use crate::bus::{CommunicationBus, SubscriptionId, CACHE_INVALIDATION_CHANNEL};
use crate::error::AgentError;
use crate::namespace::CacheNamespace;

/// Read access to stored trades. Implemented by both the optimized query
/// path and the legacy one.
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn fetch_trades(
        &self,
        user_id: &str,
        limit: Option<u32>,
        cancel: CancellationToken,
    ) -> Result<Vec<Trade>, AgentError>;

    async fn fetch_portfolio_metrics(
        &self,
        user_id: &str,
        cancel: CancellationToken,
    ) -> Result<PortfolioSummary, AgentError>;
}

/// The index is swept once it tracks more than twice this many keys, or
/// twice the number of cached trade lists if that is larger.
const SWEEP_FLOOR: usize = 64;

/// Trade-list keys per user, so a user can be invalidated without knowing
/// which limits were queried.
#[derive(Default)]
struct KeyIndex {
    by_user: HashMap<String, HashSet<String>>,
    tracked: usize,
}

impl KeyIndex {
    fn insert(&mut self, user_id: &str, key: String) {
        if self.by_user.entry(user_id.to_string()).or_default().insert(key) {
            self.tracked += 1;
        }
    }

    fn remove_user(&mut self, user_id: &str) -> HashSet<String> {
        let keys = self.by_user.remove(user_id).unwrap_or_default();
        self.tracked -= keys.len();
        keys
    }

    /// Keep only keys for which `live` holds, dropping users left with none.
    fn retain(&mut self, mut live: impl FnMut(&str) -> bool) {
        self.by_user.retain(|_, keys| {
            keys.retain(|key| live(key));
            !keys.is_empty()
        });
        self.tracked = self.by_user.values().map(HashSet::len).sum();
    }

    fn clear(&mut self) {
        self.by_user.clear();
        self.tracked = 0;
    }
}

/// Read caches for the two query shapes the database agent serves.
///
/// Trade lists go stale faster than aggregate metrics, so each namespace has
/// its own TTL. Nothing here watches for writes: whoever writes must call
/// `invalidate_user` or `clear`.
pub struct QueryOptimizer {
    trades: CacheNamespace<Vec<Trade>>,
    metrics: CacheNamespace<PortfolioSummary>,
    issued: Mutex<KeyIndex>,
}

impl QueryOptimizer {
    pub fn new(
        trades_store: Arc<dyn CacheBackend<Vec<Trade>>>,
        trades_ttl: Duration,
        metrics_store: Arc<dyn CacheBackend<PortfolioSummary>>,
        metrics_ttl: Duration,
    ) -> Self {
        Self {
            trades: CacheNamespace::new("trades", trades_store, trades_ttl),
            metrics: CacheNamespace::new("portfolio_metrics", metrics_store, metrics_ttl),
            issued: Mutex::new(KeyIndex::default()),
        }
    }

    pub fn trades_key(user_id: &str, limit: Option<u32>) -> String {
        match limit {
            Some(limit) => format!("trades:{user_id}:{limit}"),
            None => format!("trades:{user_id}:all"),
        }
    }

    pub fn metrics_key(user_id: &str) -> String {
        format!("metrics:{user_id}")
    }

    pub fn trades(&self) -> &CacheNamespace<Vec<Trade>> {
        &self.trades
    }

    pub fn metrics(&self) -> &CacheNamespace<PortfolioSummary> {
        &self.metrics
    }

    /// Trade-list keys currently indexed for invalidation.
    pub fn tracked_keys(&self) -> usize {
        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tracked
    }

    /// Index `key` after its entry was cached. Keys whose entries were
    /// evicted or expired are swept out once the index outgrows the cache.
    fn remember_trades_key(&self, user_id: &str, key: String) {
        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        issued.insert(user_id, key);

        if issued.tracked > 2 * self.trades.len().max(SWEEP_FLOOR) {
            let before = issued.tracked;
            issued.retain(|key| self.trades.contains(key));
            debug!(before, after = issued.tracked, "Swept stale trade-list keys");
        }
    }

    /// Drop every cached entry belonging to `user_id`.
    pub fn invalidate_user(&self, user_id: &str) {
        let keys = self
            .issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_user(user_id);
        for key in &keys {
            self.trades.invalidate(key);
        }
        self.metrics.invalidate(&Self::metrics_key(user_id));
        debug!(user_id = %user_id, trade_keys = keys.len(), "Invalidated user cache entries");
    }

    /// Drop both namespaces wholesale.
    pub fn clear(&self) {
        self.trades.clear();
        self.metrics.clear();
        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Serves read-heavy trade queries from cache, falling back to the legacy
/// store when the optimized one fails or is too slow.
pub struct DatabaseAgent {
    base: BaseAgent,
    store: Arc<dyn TradeStore>,
    legacy: Arc<dyn TradeStore>,
    optimizer: QueryOptimizer,
}

impl DatabaseAgent {
    pub fn new(
        config: &DatabaseAgentConfig,
        optimizer: QueryOptimizer,
        store: Arc<dyn TradeStore>,
        legacy: Arc<dyn TradeStore>,
    ) -> Self {
        Self {
            base: BaseAgent::new(config.agent_config()),
            store,
            legacy,
            optimizer,
        }
    }

    pub fn optimizer(&self) -> &QueryOptimizer {
        &self.optimizer
    }

    pub async fn get_trades(&self, user_id: &str, limit: Option<u32>) -> AgentResult<Vec<Trade>> {
        let key = QueryOptimizer::trades_key(user_id, limit);
        let store = Arc::clone(&self.store);
        let legacy = Arc::clone(&self.legacy);

        let result = self
            .base
            .execute(
                Some((&self.optimizer.trades, key.clone())),
                |cancel| async move { store.fetch_trades(user_id, limit, cancel).await },
                |cancel| async move { legacy.fetch_trades(user_id, limit, cancel).await },
            )
            .await;

        // Only the primary path writes the cache.
        if result.success && result.source == ResultSource::Agent {
            self.optimizer.remember_trades_key(user_id, key);
        }
        result
    }

    pub async fn get_portfolio_metrics(&self, user_id: &str) -> AgentResult<PortfolioSummary> {
        let key = QueryOptimizer::metrics_key(user_id);
        let store = Arc::clone(&self.store);
        let legacy = Arc::clone(&self.legacy);

        self.base
            .execute(
                Some((&self.optimizer.metrics, key)),
                |cancel| async move { store.fetch_portfolio_metrics(user_id, cancel).await },
                |cancel| async move { legacy.fetch_portfolio_metrics(user_id, cancel).await },
            )
            .await
    }

    pub fn invalidate_user(&self, user_id: &str) {
        self.optimizer.invalidate_user(user_id);
    }

    /// Opt in to invalidation messages on the bus.
    ///
    /// A message whose payload carries `user_id` invalidates that user; any
    /// other message clears both caches. The subscription holds a weak
    /// reference, so it does not keep the agent alive.
    pub fn attach_invalidation(self: &Arc<Self>, bus: &CommunicationBus) -> SubscriptionId {
        let agent: Weak<Self> = Arc::downgrade(self);
        bus.subscribe(CACHE_INVALIDATION_CHANNEL, move |message| {
            let Some(agent) = agent.upgrade() else {
                return;
            };
            match message.payload.get("user_id").and_then(|v| v.as_str()) {
                Some(user_id) => agent.invalidate_user(user_id),
                None => {
                    info!(sender = %message.sender, "Clearing query caches on request");
                    agent.optimizer.clear();
                }
            }
        })
    }
}

#[async_trait]
impl OptimizedAgent for DatabaseAgent {
    fn base(&self) -> &BaseAgent {
        &self.base
    }

    fn capabilities(&self) -> &'static [Method] {
        &[
            Method::GetTrades,
            Method::GetPortfolioMetrics,
            Method::ClearCache,
        ]
    }

    async fn handle(&self, request: AgentRequest) -> Result<AgentResponse, AgentError> {
        match request {
            AgentRequest::GetTrades { user_id, limit } => Ok(AgentResponse::Trades(
                self.get_trades(&user_id, limit).await,
            )),
            AgentRequest::GetPortfolioMetrics { user_id } => Ok(AgentResponse::PortfolioMetrics(
                self.get_portfolio_metrics(&user_id).await,
            )),
            AgentRequest::ClearCache => {
                self.clear_cache();
                Ok(AgentResponse::CacheCleared)
            }
            other => Err(unsupported(self.id(), other.method())),
        }
    }

    fn clear_cache(&self) {
        self.optimizer.clear();
    }
}
