use std::sync::Arc;
use std::time::Duration;

use agentopt_cache::CacheBackend;
use agentopt_models::{AgentResult, AiAgentConfig, ResultSource, Trade, TradeAnalysis};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent::{unsupported, AgentRequest, AgentResponse, Method, OptimizedAgent};
use crate::base::BaseAgent;
use crate::cost::{CostSummary, CostTracker};
use crate::error::AgentError;
use crate::namespace::CacheNamespace;

const KEY_DELIMITER: char = '|';

/// Produces an analysis for a trade. Mockable for testing.
#[async_trait]
pub trait TradeAnalyzer: Send + Sync {
    /// Identifies the analyzer in logs.
    fn name(&self) -> &str;

    /// `cancel` fires when the caller stops waiting; implementations should
    /// abort the underlying request.
    async fn analyze(
        &self,
        trade: &Trade,
        cancel: CancellationToken,
    ) -> Result<TradeAnalysis, AgentError>;
}

/// Memoizes language-model trade analysis and books its cost.
pub struct AiIntegrationAgent {
    base: BaseAgent,
    analyzer: Arc<dyn TradeAnalyzer>,
    fallback: Arc<dyn TradeAnalyzer>,
    cache: CacheNamespace<TradeAnalysis>,
    costs: Arc<CostTracker>,
    cost_per_call: Decimal,
    cache_analysis: bool,
}

impl AiIntegrationAgent {
    pub fn new(
        config: &AiAgentConfig,
        store: Arc<dyn CacheBackend<TradeAnalysis>>,
        analyzer: Arc<dyn TradeAnalyzer>,
        fallback: Arc<dyn TradeAnalyzer>,
        costs: Arc<CostTracker>,
    ) -> Self {
        Self {
            base: BaseAgent::new(config.agent_config()),
            analyzer,
            fallback,
            cache: CacheNamespace::new(
                "analysis",
                store,
                Duration::from_secs(config.cache_ttl_secs),
            ),
            costs,
            cost_per_call: config.cost_per_call,
            cache_analysis: config.cache_analysis,
        }
    }

    /// Trades with the same economic parameters share one analysis.
    pub fn cache_key(trade: &Trade) -> String {
        fn price(p: Option<Decimal>) -> String {
            p.map(|d| d.normalize().to_string()).unwrap_or_default()
        }

        [
            trade.symbol.to_ascii_uppercase(),
            trade.direction.as_str().to_string(),
            trade.entry_price.normalize().to_string(),
            price(trade.exit_price),
            price(trade.stop_loss),
            price(trade.take_profit),
        ]
        .join(&KEY_DELIMITER.to_string())
    }

    pub async fn analyze_trade(&self, trade: &Trade) -> AgentResult<TradeAnalysis> {
        let cached = self
            .cache_analysis
            .then(|| (&self.cache, Self::cache_key(trade)));

        let analyzer = Arc::clone(&self.analyzer);
        let fallback = Arc::clone(&self.fallback);
        let result = self
            .base
            .execute(
                cached,
                |cancel| async move { analyzer.analyze(trade, cancel).await },
                |cancel| async move { fallback.analyze(trade, cancel).await },
            )
            .await;

        if result.cache_hit {
            self.costs.record_saving(self.cost_per_call);
        } else if result.success && result.source == ResultSource::Agent {
            self.costs.record_cost(self.cost_per_call);
        } else if result.is_fallback() {
            debug!(
                symbol = %trade.symbol,
                analyzer = self.analyzer.name(),
                fallback = self.fallback.name(),
                success = result.success,
                "Analysis served by fallback analyzer"
            );
        }

        result
    }

    pub fn cost_savings(&self) -> Decimal {
        self.costs.cost_savings()
    }

    pub fn total_cost(&self) -> Decimal {
        self.costs.total_cost()
    }

    pub fn cached_analyses(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl OptimizedAgent for AiIntegrationAgent {
    fn base(&self) -> &BaseAgent {
        &self.base
    }

    fn capabilities(&self) -> &'static [Method] {
        &[Method::AnalyzeTrade, Method::ClearCache]
    }

    async fn handle(&self, request: AgentRequest) -> Result<AgentResponse, AgentError> {
        match request {
            AgentRequest::AnalyzeTrade(trade) => {
                Ok(AgentResponse::Analysis(self.analyze_trade(&trade).await))
            }
            AgentRequest::ClearCache => {
                self.clear_cache();
                Ok(AgentResponse::CacheCleared)
            }
            other => Err(unsupported(self.id(), other.method())),
        }
    }

    fn cost(&self) -> Option<CostSummary> {
        Some(self.costs.summary())
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}
