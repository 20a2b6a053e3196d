use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::agent::AgentConfig;

/// Top-level configuration for the optimization layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub agents: AgentsConfig,
}

/// How a full cache picks the entry to drop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Drop the oldest inserted key. Reads do not refresh position.
    #[default]
    InsertionOrder,
    /// Frequency-aware admission and eviction (moka TinyLFU).
    Adaptive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries in each agent cache.
    pub max_size: usize,
    pub eviction: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1_000,
            eviction: EvictionPolicy::InsertionOrder,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Per-agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    pub ai: AiAgentConfig,
    pub database: DatabaseAgentConfig,
    pub portfolio: PortfolioAgentConfig,
    pub trade: TradeAgentConfig,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            ai: AiAgentConfig::default(),
            database: DatabaseAgentConfig::default(),
            portfolio: PortfolioAgentConfig::default(),
            trade: TradeAgentConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AiAgentConfig {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub priority: u32,
    pub timeout_ms: u64,
    /// How long an analysis stays reusable for identical trade parameters.
    pub cache_ttl_secs: u64,
    /// Flat cost booked per model call, and saved per cache hit.
    pub cost_per_call: Decimal,
    /// Memoize analysis output. Disable when the model is not deterministic enough.
    pub cache_analysis: bool,
}

impl Default for AiAgentConfig {
    fn default() -> Self {
        Self {
            id: "ai".to_string(),
            name: "AI Integration Agent".to_string(),
            enabled: true,
            priority: 1,
            timeout_ms: 30_000,
            cache_ttl_secs: 30 * 60,
            cost_per_call: Decimal::new(2, 2),
            cache_analysis: true,
        }
    }
}

impl AiAgentConfig {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            id: self.id.clone(),
            name: self.name.clone(),
            enabled: self.enabled,
            priority: self.priority,
            timeout_ms: self.timeout_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseAgentConfig {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub priority: u32,
    pub timeout_ms: u64,
    pub trades_ttl_secs: u64,
    pub metrics_ttl_secs: u64,
}

impl Default for DatabaseAgentConfig {
    fn default() -> Self {
        Self {
            id: "database".to_string(),
            name: "Database Agent".to_string(),
            enabled: true,
            priority: 2,
            timeout_ms: 5_000,
            trades_ttl_secs: 2 * 60,
            metrics_ttl_secs: 5 * 60,
        }
    }
}

impl DatabaseAgentConfig {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            id: self.id.clone(),
            name: self.name.clone(),
            enabled: self.enabled,
            priority: self.priority,
            timeout_ms: self.timeout_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PortfolioAgentConfig {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub priority: u32,
    pub timeout_ms: u64,
}

impl Default for PortfolioAgentConfig {
    fn default() -> Self {
        Self {
            id: "portfolio".to_string(),
            name: "Portfolio Agent".to_string(),
            enabled: true,
            priority: 3,
            timeout_ms: 2_000,
        }
    }
}

impl PortfolioAgentConfig {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            id: self.id.clone(),
            name: self.name.clone(),
            enabled: self.enabled,
            priority: self.priority,
            timeout_ms: self.timeout_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TradeAgentConfig {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub priority: u32,
    pub timeout_ms: u64,
}

impl Default for TradeAgentConfig {
    fn default() -> Self {
        Self {
            id: "trade".to_string(),
            name: "Trade Agent".to_string(),
            enabled: true,
            priority: 4,
            timeout_ms: 1_000,
        }
    }
}

impl TradeAgentConfig {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            id: self.id.clone(),
            name: self.name.clone(),
            enabled: self.enabled,
            priority: self.priority,
            timeout_ms: self.timeout_ms,
        }
    }
}
