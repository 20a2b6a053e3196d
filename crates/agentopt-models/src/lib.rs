pub mod agent;
pub mod analysis;
pub mod config;
pub mod portfolio;
pub mod trade;

pub use agent::{AgentConfig, AgentMetrics, AgentResult, ResultSource};
pub use analysis::{RiskLevel, TradeAnalysis};
pub use config::{
    AgentsConfig, AiAgentConfig, CacheConfig, DatabaseAgentConfig, EvictionPolicy, LoggingConfig,
    OptimizerConfig, PortfolioAgentConfig, TradeAgentConfig,
};
pub use portfolio::PortfolioSummary;
pub use trade::{EnrichedTrade, Trade, TradeDirection, TradeRecord};
