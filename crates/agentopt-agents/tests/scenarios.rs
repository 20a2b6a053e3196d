//! End-to-end scenarios across the cache, the agents and the orchestrator.
//!
//! Every collaborator is a mock from `test_support`, so the tests observe
//! call counts, timeouts and fallbacks without any external service.

use std::sync::Arc;
use std::time::Duration;

use agentopt_agents::test_support::{sample_record, sample_trade, MockAnalyzer, MockTradeStore};
use agentopt_agents::{
    AgentError, AgentRequest, AgentResponse, AiIntegrationAgent, CommunicationBus, CostTracker,
    DatabaseAgent, OptimizedAgent, Orchestrator, PortfolioAgent, QueryOptimizer, TradeAgent,
    CACHE_INVALIDATION_CHANNEL,
};
use agentopt_cache::{CacheBackend, CacheStore};
use agentopt_models::{AgentsConfig, AiAgentConfig, DatabaseAgentConfig, ResultSource, TradeRecord};
use rust_decimal_macros::dec;
use serde_json::json;

fn ai_agent(analyzer: Arc<MockAnalyzer>, fallback: Arc<MockAnalyzer>) -> AiIntegrationAgent {
    AiIntegrationAgent::new(
        &AiAgentConfig::default(),
        Arc::new(CacheStore::new(100)),
        analyzer,
        fallback,
        Arc::new(CostTracker::new()),
    )
}

fn db_agent(
    config: &DatabaseAgentConfig,
    store: Arc<MockTradeStore>,
    legacy: Arc<MockTradeStore>,
) -> DatabaseAgent {
    let optimizer = QueryOptimizer::new(
        Arc::new(CacheStore::new(100)),
        Duration::from_secs(config.trades_ttl_secs),
        Arc::new(CacheStore::new(100)),
        Duration::from_secs(config.metrics_ttl_secs),
    );
    DatabaseAgent::new(config, optimizer, store, legacy)
}

fn orchestrator() -> (Orchestrator, Arc<MockAnalyzer>) {
    let agents = AgentsConfig::default();
    let analyzer = Arc::new(MockAnalyzer::new("model"));
    let orchestrator = Orchestrator::new(Arc::new(CommunicationBus::new()));

    orchestrator.register(Arc::new(ai_agent(
        Arc::clone(&analyzer),
        Arc::new(MockAnalyzer::new("rules")),
    )));
    orchestrator.register(Arc::new(db_agent(
        &agents.database,
        Arc::new(MockTradeStore::new(3)),
        Arc::new(MockTradeStore::new(3)),
    )));
    orchestrator.register(Arc::new(PortfolioAgent::new(agents.portfolio.agent_config())));
    orchestrator.register(Arc::new(TradeAgent::new(agents.trade.agent_config())));
    (orchestrator, analyzer)
}

#[test]
fn cache_of_two_evicts_first_insert() {
    let cache = CacheStore::new(2);
    let ttl = Duration::from_secs(60);
    cache.set("a", 1, ttl);
    cache.set("b", 2, ttl);
    cache.set("c", 3, ttl);

    assert!(!cache.has("a"));
    assert_eq!(cache.get("b"), Some(2));
    assert_eq!(cache.get("c"), Some(3));
}

#[tokio::test]
async fn identical_trades_are_analyzed_once() {
    let analyzer = Arc::new(MockAnalyzer::new("model"));
    let agent = ai_agent(Arc::clone(&analyzer), Arc::new(MockAnalyzer::new("rules")));

    let first = agent.analyze_trade(&sample_trade("AAPL", dec!(150))).await;
    let second = agent.analyze_trade(&sample_trade("AAPL", dec!(150))).await;

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.data, second.data);
    assert_eq!(analyzer.calls(), 1);
    assert_eq!(agent.cost_savings(), dec!(0.02));
}

#[tokio::test]
async fn slow_database_falls_back() {
    let config = DatabaseAgentConfig {
        timeout_ms: 1,
        ..DatabaseAgentConfig::default()
    };
    let store = Arc::new(MockTradeStore::new(5).with_delay(Duration::from_millis(50)));
    let legacy = Arc::new(MockTradeStore::new(5));
    let agent = db_agent(&config, Arc::clone(&store), Arc::clone(&legacy));

    let result = agent.get_trades("u1", Some(2)).await;

    assert!(result.success);
    assert_eq!(result.source, ResultSource::Fallback);
    assert_eq!(result.data.map(|t| t.len()), Some(2));
    assert_eq!(legacy.trade_calls(), 1);
    // Fallback output is never cached.
    assert!(!agent
        .optimizer()
        .trades()
        .contains(&QueryOptimizer::trades_key("u1", Some(2))));
}

#[tokio::test]
async fn timed_out_model_call_is_not_charged() {
    let analyzer = Arc::new(MockAnalyzer::new("model").with_delay(Duration::from_secs(5)));
    let config = AiAgentConfig {
        timeout_ms: 20,
        ..AiAgentConfig::default()
    };
    let agent = AiIntegrationAgent::new(
        &config,
        Arc::new(CacheStore::new(10)),
        analyzer.clone(),
        Arc::new(MockAnalyzer::new("rules")),
        Arc::new(CostTracker::new()),
    );

    let result = agent.analyze_trade(&sample_trade("NVDA", dec!(900))).await;
    assert_eq!(result.source, ResultSource::Fallback);
    assert_eq!(analyzer.calls(), 1);
    assert_eq!(agent.total_cost(), dec!(0));
}

#[tokio::test]
async fn trade_agent_reports_all_issues() {
    let agent = TradeAgent::new(AgentsConfig::default().trade.agent_config());
    let record: TradeRecord = serde_json::from_value(json!({
        "direction": "long",
        "entry_price": "abc",
        "quantity": 10
    }))
    .unwrap();

    let result = agent.process(&record).await;

    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.contains("Missing symbol"));
    assert!(error.contains("Invalid entry price"));
}

#[tokio::test]
async fn fallback_only_after_primary_failure() {
    let agent = db_agent(
        &DatabaseAgentConfig::default(),
        Arc::new(MockTradeStore::failing()),
        Arc::new(MockTradeStore::new(1)),
    );
    let healthy = db_agent(
        &DatabaseAgentConfig::default(),
        Arc::new(MockTradeStore::new(1)),
        Arc::new(MockTradeStore::new(1)),
    );

    assert_eq!(
        agent.get_portfolio_metrics("u1").await.source,
        ResultSource::Fallback
    );
    assert_eq!(
        healthy.get_portfolio_metrics("u1").await.source,
        ResultSource::Agent
    );
}

#[tokio::test]
async fn both_paths_failing() {
    let agent = db_agent(
        &DatabaseAgentConfig::default(),
        Arc::new(MockTradeStore::failing()),
        Arc::new(MockTradeStore::failing()),
    );

    let result = agent.get_trades("u1", None).await;
    assert!(!result.success);
    assert_eq!(result.source, ResultSource::Fallback);
    assert!(result.error.unwrap().starts_with("Fallback failed"));
}

#[tokio::test]
async fn metrics_stay_consistent() {
    let agent = db_agent(
        &DatabaseAgentConfig::default(),
        Arc::new(MockTradeStore::failing()),
        Arc::new(MockTradeStore::failing()),
    );
    let trade_agent = TradeAgent::new(AgentsConfig::default().trade.agent_config());

    for _ in 0..4 {
        agent.get_trades("u1", None).await;
    }
    for record in [sample_record(), TradeRecord::default(), sample_record()] {
        trade_agent.process(&record).await;
    }

    let db = agent.metrics();
    assert_eq!(db.total_requests, 4);
    assert_eq!(db.failed_requests, 4);
    assert_eq!(db.cache_hit_rate, 0.0);

    let trade = trade_agent.metrics();
    assert_eq!(trade.total_requests, 3);
    assert_eq!(trade.successful_requests + trade.failed_requests, 3);
    assert_eq!(trade.failed_requests, 1);
}

#[tokio::test]
async fn concurrent_misses_share_one_query() {
    let store = Arc::new(MockTradeStore::new(2).with_delay(Duration::from_millis(30)));
    let agent = Arc::new(db_agent(
        &DatabaseAgentConfig::default(),
        Arc::clone(&store),
        Arc::new(MockTradeStore::new(0)),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move { agent.get_portfolio_metrics("u1").await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().success);
    }

    assert_eq!(store.metrics_calls(), 1);
}

#[tokio::test]
async fn orchestrator_routes_and_reports() {
    let (orchestrator, analyzer) = orchestrator();

    assert_eq!(
        orchestrator.agent_ids(),
        vec!["ai", "database", "portfolio", "trade"]
    );

    let trade = sample_trade("AAPL", dec!(150));
    for _ in 0..2 {
        let response = orchestrator
            .route("ai", AgentRequest::AnalyzeTrade(trade.clone()))
            .await
            .unwrap();
        assert!(response.success());
    }
    assert_eq!(analyzer.calls(), 1);

    let response = orchestrator
        .route_named("database", "getTrades", json!({"user_id": "u1", "limit": 2}))
        .await
        .unwrap();
    match response {
        AgentResponse::Trades(result) => assert_eq!(result.data.unwrap().len(), 2),
        other => panic!("unexpected response {other:?}"),
    }

    let report = orchestrator.metrics_report();
    assert_eq!(report.total_cost, dec!(0.02));
    assert_eq!(report.cost_saved, dec!(0.02));
    let ai = &report.agents[0];
    assert_eq!(ai.metrics.total_requests, 2);
    assert!((ai.metrics.cache_hit_rate - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn orchestrator_errors() {
    let (orchestrator, _) = orchestrator();

    let err = orchestrator
        .route("missing", AgentRequest::ClearCache)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::AgentNotFound(_)));

    let err = orchestrator
        .route("portfolio", AgentRequest::ClearCache)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::MethodNotFound { .. }));

    let err = orchestrator
        .route_named("database", "getTrades", json!({"limit": "many"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidRequest(_)));
}

#[tokio::test]
async fn writers_invalidate_through_the_bus() {
    let bus = CommunicationBus::new();
    let store = Arc::new(MockTradeStore::new(2));
    let agent = Arc::new(db_agent(
        &DatabaseAgentConfig::default(),
        Arc::clone(&store),
        Arc::new(MockTradeStore::new(0)),
    ));
    agent.attach_invalidation(&bus);

    agent.get_portfolio_metrics("u1").await;
    assert!(agent.get_portfolio_metrics("u1").await.cache_hit);

    let delivered = bus.publish(CACHE_INVALIDATION_CHANNEL, "importer", json!({"user_id": "u1"}));
    assert_eq!(delivered, 1);
    assert!(!agent.get_portfolio_metrics("u1").await.cache_hit);
    assert_eq!(store.metrics_calls(), 2);
}

#[tokio::test]
async fn cached_entries_expire() {
    let backend: Arc<dyn CacheBackend<u32>> = Arc::new(CacheStore::new(4));
    backend.set("k", 1, Duration::from_millis(20));
    assert!(backend.has("k"));
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(backend.get("k"), None);
    assert!(backend.is_empty());
}
