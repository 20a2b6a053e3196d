//! agentopt - caching, timeout and fallback layer for trading agents
//!
//! Wraps expensive or unreliable operations (model-based trade analysis,
//! database reads, portfolio aggregation, trade validation) in agents that
//! memoize results, bound execution time, fall back to a slower path on
//! failure, and keep running performance metrics.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use agentopt::agents::{AgentRequest, Orchestrator, TradeAnalyzer, TradeStore};
//! use agentopt::models::{OptimizerConfig, Trade};
//! use agentopt::{build_orchestrator, load_config, Collaborators};
//! ```

pub use agentopt_agents as agents;
pub use agentopt_cache as cache;
pub use agentopt_models as models;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agentopt_agents::{
    AiIntegrationAgent, CommunicationBus, CostTracker, DatabaseAgent, Orchestrator,
    PortfolioAgent, QueryOptimizer, TradeAgent, TradeAnalyzer, TradeStore,
};
use agentopt_cache::{build_cache, CacheBackend, MAX_TTL};
use agentopt_models::{CacheConfig, LoggingConfig, OptimizerConfig};
use anyhow::{ensure, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// The external services the agents wrap. Each primary has a slower or
/// simpler stand-in used when it fails.
pub struct Collaborators {
    pub analyzer: Arc<dyn TradeAnalyzer>,
    pub analyzer_fallback: Arc<dyn TradeAnalyzer>,
    pub store: Arc<dyn TradeStore>,
    pub legacy_store: Arc<dyn TradeStore>,
}

/// Parse configuration from TOML text.
pub fn parse_config(raw: &str) -> Result<OptimizerConfig> {
    let config: OptimizerConfig = toml::from_str(raw).context("Failed to parse config")?;
    ensure!(config.cache.max_size > 0, "cache.max_size must be at least 1");

    let agents = &config.agents;
    for (key, secs) in [
        ("agents.ai.cache_ttl_secs", agents.ai.cache_ttl_secs),
        ("agents.database.trades_ttl_secs", agents.database.trades_ttl_secs),
        ("agents.database.metrics_ttl_secs", agents.database.metrics_ttl_secs),
    ] {
        ensure!(
            secs <= MAX_TTL.as_secs(),
            "{key} must be at most {} seconds",
            MAX_TTL.as_secs()
        );
    }
    Ok(config)
}

/// Read and parse a TOML configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<OptimizerConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("Invalid config: {}", path.display()))
}

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` overrides `config.level` when set. Fails if a subscriber is
/// already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log level: {}", config.level))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}

fn cache_for<V>(config: &CacheConfig, name: &str) -> Result<Arc<dyn CacheBackend<V>>>
where
    V: Clone + Send + Sync + 'static,
{
    build_cache(config.eviction, config.max_size)
        .with_context(|| format!("Failed to build {name} cache"))
}

/// Build an Orchestrator with all four agents registered. The database agent
/// listens for invalidations on the orchestrator's bus.
pub fn build_orchestrator(
    config: &OptimizerConfig,
    collaborators: Collaborators,
) -> Result<Orchestrator> {
    let agents = &config.agents;

    let ai = AiIntegrationAgent::new(
        &agents.ai,
        cache_for(&config.cache, "analysis")?,
        collaborators.analyzer,
        collaborators.analyzer_fallback,
        Arc::new(CostTracker::new()),
    );

    let optimizer = QueryOptimizer::new(
        cache_for(&config.cache, "trades")?,
        Duration::from_secs(agents.database.trades_ttl_secs),
        cache_for(&config.cache, "portfolio metrics")?,
        Duration::from_secs(agents.database.metrics_ttl_secs),
    );
    let database = Arc::new(DatabaseAgent::new(
        &agents.database,
        optimizer,
        collaborators.store,
        collaborators.legacy_store,
    ));

    let orchestrator = Orchestrator::new(Arc::new(CommunicationBus::new()));
    database.attach_invalidation(orchestrator.bus());
    orchestrator.register(Arc::new(ai));
    orchestrator.register(database);
    orchestrator.register(Arc::new(PortfolioAgent::new(agents.portfolio.agent_config())));
    orchestrator.register(Arc::new(TradeAgent::new(agents.trade.agent_config())));

    info!(
        agents = ?orchestrator.agent_ids(),
        max_size = config.cache.max_size,
        eviction = ?config.cache.eviction,
        "Orchestrator ready"
    );
    Ok(orchestrator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentopt_agents::test_support::{sample_trade, MockAnalyzer, MockTradeStore};
    use agentopt_agents::{AgentRequest, AgentResponse, CACHE_INVALIDATION_CHANNEL};
    use agentopt_models::EvictionPolicy;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn collaborators() -> Collaborators {
        Collaborators {
            analyzer: Arc::new(MockAnalyzer::new("model")),
            analyzer_fallback: Arc::new(MockAnalyzer::new("rules")),
            store: Arc::new(MockTradeStore::new(3)),
            legacy_store: Arc::new(MockTradeStore::new(3)),
        }
    }

    #[test]
    fn example_config_matches_defaults() {
        let config = parse_config(include_str!("../../../config/agentopt.example.toml")).unwrap();
        assert_eq!(config, OptimizerConfig::default());
    }

    #[test]
    fn load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache]\nmax_size = 10\neviction = \"adaptive\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.cache.max_size, 10);
        assert_eq!(config.cache.eviction, EvictionPolicy::Adaptive);
    }

    #[test]
    fn missing_file_names_path() {
        let err = load_config("/nonexistent/agentopt.toml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/agentopt.toml"));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = parse_config("[cache]\nmax_size = 0").unwrap_err();
        assert!(err.to_string().contains("max_size"));
    }

    #[test]
    fn oversized_ttl_is_rejected() {
        let err = parse_config("[agents.database]\nmetrics_ttl_secs = 9223372036854775807")
            .unwrap_err();
        assert!(err.to_string().contains("agents.database.metrics_ttl_secs"));

        let at_limit = format!("[agents.ai]\ncache_ttl_secs = {}", MAX_TTL.as_secs());
        assert!(parse_config(&at_limit).is_ok());
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let config = LoggingConfig {
            level: "agentopt=loud".to_string(),
            json: false,
        };
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(init_tracing(&config).is_err());
        }
    }

    #[test]
    fn registers_every_agent() {
        let orchestrator = build_orchestrator(&OptimizerConfig::default(), collaborators()).unwrap();
        assert_eq!(
            orchestrator.agent_ids(),
            vec!["ai", "database", "portfolio", "trade"]
        );
    }

    #[tokio::test]
    async fn bus_invalidates_database_reads() {
        let orchestrator = build_orchestrator(&OptimizerConfig::default(), collaborators()).unwrap();
        let request = || AgentRequest::GetTrades {
            user_id: "u1".to_string(),
            limit: None,
        };
        let cache_hit = |response: AgentResponse| match response {
            AgentResponse::Trades(result) => result.cache_hit,
            other => panic!("unexpected response {other:?}"),
        };

        orchestrator.route("database", request()).await.unwrap();
        assert!(cache_hit(orchestrator.route("database", request()).await.unwrap()));

        let delivered = orchestrator.bus().publish(
            CACHE_INVALIDATION_CHANNEL,
            "importer",
            serde_json::json!({"user_id": "u1"}),
        );
        assert_eq!(delivered, 1);
        assert!(!cache_hit(orchestrator.route("database", request()).await.unwrap()));
    }

    #[tokio::test]
    async fn adaptive_caches_serve_hits() {
        let mut config = OptimizerConfig::default();
        config.cache.eviction = EvictionPolicy::Adaptive;
        let orchestrator = build_orchestrator(&config, collaborators()).unwrap();

        let trade = sample_trade("AAPL", dec!(150));
        orchestrator
            .route("ai", AgentRequest::AnalyzeTrade(trade.clone()))
            .await
            .unwrap();
        let response = orchestrator
            .route("ai", AgentRequest::AnalyzeTrade(trade))
            .await
            .unwrap();

        match response {
            AgentResponse::Analysis(result) => assert!(result.cache_hit),
            other => panic!("unexpected response {other:?}"),
        }
        assert_eq!(orchestrator.metrics_report().cost_saved, dec!(0.02));
    }
}
