use std::fmt;
use std::str::FromStr;

use agentopt_models::{
    AgentConfig, AgentMetrics, AgentResult, EnrichedTrade, PortfolioSummary, Trade, TradeAnalysis,
    TradeRecord,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::base::BaseAgent;
use crate::cost::CostSummary;
use crate::error::AgentError;

/// Operations an agent can be asked to perform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    AnalyzeTrade,
    GetTrades,
    GetPortfolioMetrics,
    CalculatePortfolio,
    ProcessTrade,
    ClearCache,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::AnalyzeTrade => "analyze_trade",
            Method::GetTrades => "get_trades",
            Method::GetPortfolioMetrics => "get_portfolio_metrics",
            Method::CalculatePortfolio => "calculate_portfolio",
            Method::ProcessTrade => "process_trade",
            Method::ClearCache => "clear_cache",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ();

    /// Accepts snake_case and camelCase names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "analyzetrade" => Ok(Method::AnalyzeTrade),
            "gettrades" => Ok(Method::GetTrades),
            "getportfoliometrics" => Ok(Method::GetPortfolioMetrics),
            "calculateportfolio" => Ok(Method::CalculatePortfolio),
            "processtrade" => Ok(Method::ProcessTrade),
            "clearcache" => Ok(Method::ClearCache),
            _ => Err(()),
        }
    }
}

/// A typed call into an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum AgentRequest {
    AnalyzeTrade(Trade),
    GetTrades {
        user_id: String,
        #[serde(default)]
        limit: Option<u32>,
    },
    GetPortfolioMetrics {
        user_id: String,
    },
    CalculatePortfolio {
        trades: Vec<Trade>,
    },
    ProcessTrade(TradeRecord),
    ClearCache,
}

impl AgentRequest {
    pub fn method(&self) -> Method {
        match self {
            AgentRequest::AnalyzeTrade(_) => Method::AnalyzeTrade,
            AgentRequest::GetTrades { .. } => Method::GetTrades,
            AgentRequest::GetPortfolioMetrics { .. } => Method::GetPortfolioMetrics,
            AgentRequest::CalculatePortfolio { .. } => Method::CalculatePortfolio,
            AgentRequest::ProcessTrade(_) => Method::ProcessTrade,
            AgentRequest::ClearCache => Method::ClearCache,
        }
    }

    /// Build a request from a method name and JSON arguments, for callers
    /// sitting at an untyped boundary.
    pub fn from_parts(method: &str, args: serde_json::Value) -> Result<Self, AgentError> {
        let method: Method = method.parse().map_err(|_| {
            AgentError::InvalidRequest(format!("Unknown method: {method}"))
        })?;

        let mut envelope = serde_json::Map::new();
        envelope.insert(
            "method".to_string(),
            serde_json::Value::String(method.as_str().to_string()),
        );
        if !args.is_null() {
            envelope.insert("args".to_string(), args);
        }

        serde_json::from_value(serde_json::Value::Object(envelope)).map_err(|e| {
            AgentError::InvalidRequest(format!("Bad arguments for {method}: {e}"))
        })
    }
}

/// The typed answer to an `AgentRequest`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum AgentResponse {
    Analysis(AgentResult<TradeAnalysis>),
    Trades(AgentResult<Vec<Trade>>),
    PortfolioMetrics(AgentResult<PortfolioSummary>),
    Portfolio(AgentResult<PortfolioSummary>),
    ProcessedTrade(AgentResult<EnrichedTrade>),
    CacheCleared,
}

impl AgentResponse {
    pub fn success(&self) -> bool {
        match self {
            AgentResponse::Analysis(r) => r.success,
            AgentResponse::Trades(r) => r.success,
            AgentResponse::PortfolioMetrics(r) => r.success,
            AgentResponse::Portfolio(r) => r.success,
            AgentResponse::ProcessedTrade(r) => r.success,
            AgentResponse::CacheCleared => true,
        }
    }
}

/// Capability interface implemented by every agent the orchestrator can route to.
#[async_trait]
pub trait OptimizedAgent: Send + Sync {
    fn base(&self) -> &BaseAgent;

    fn capabilities(&self) -> &'static [Method];

    async fn handle(&self, request: AgentRequest) -> Result<AgentResponse, AgentError>;

    fn id(&self) -> &str {
        self.base().id()
    }

    fn config(&self) -> &AgentConfig {
        self.base().config()
    }

    fn supports(&self, method: Method) -> bool {
        self.capabilities().contains(&method)
    }

    fn metrics(&self) -> AgentMetrics {
        self.base().metrics()
    }

    /// Spend and savings, for agents that book them.
    fn cost(&self) -> Option<CostSummary> {
        None
    }

    fn clear_cache(&self) {}

    fn shutdown(&self) {
        self.base().shutdown();
    }
}

pub(crate) fn unsupported(agent: &str, method: Method) -> AgentError {
    AgentError::MethodNotFound {
        agent: agent.to_string(),
        method: method.as_str().to_string(),
    }
}
