pub mod agent;
pub mod ai;
pub mod base;
pub mod bus;
pub mod cost;
pub mod database;
pub mod error;
pub mod metrics;
pub mod namespace;
pub mod orchestrator;
pub mod portfolio;
pub mod trade;

pub mod test_support;

pub use agent::{AgentRequest, AgentResponse, Method, OptimizedAgent};
pub use ai::{AiIntegrationAgent, TradeAnalyzer};
pub use base::BaseAgent;
pub use bus::{BusMessage, CommunicationBus, SubscriptionId, CACHE_INVALIDATION_CHANNEL};
pub use cost::{CostSummary, CostTracker};
pub use database::{DatabaseAgent, QueryOptimizer, TradeStore};
pub use error::AgentError;
pub use metrics::MetricsRecorder;
pub use namespace::CacheNamespace;
pub use orchestrator::{AgentPerformance, Orchestrator, PerformanceReport};
pub use portfolio::{summarize, PortfolioAgent};
pub use trade::{enrich, TradeAgent, ValidationIssue};
