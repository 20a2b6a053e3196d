use serde::{Deserialize, Serialize};

/// Static identity and limits for one agent. Supplied at construction, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lower values are listed first by the orchestrator.
    #[serde(default)]
    pub priority: u32,
    /// Upper bound for a single primary operation.
    pub timeout_ms: u64,
}

fn default_enabled() -> bool {
    true
}

impl AgentConfig {
    pub fn new(id: &str, name: &str, timeout_ms: u64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            enabled: true,
            priority: 0,
            timeout_ms,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Which path produced an `AgentResult`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// The optimized primary path, or its cache.
    Agent,
    /// The legacy path, taken after the primary failed or timed out.
    Fallback,
}

/// Outcome of one agent call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub source: ResultSource,
    pub execution_time_ms: u64,
    pub cache_hit: bool,
    pub error: Option<String>,
}

impl<T> AgentResult<T> {
    pub fn from_agent(data: T, execution_time_ms: u64, cache_hit: bool) -> Self {
        Self {
            success: true,
            data: Some(data),
            source: ResultSource::Agent,
            execution_time_ms,
            cache_hit,
            error: None,
        }
    }

    pub fn from_fallback(data: T, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            data: Some(data),
            source: ResultSource::Fallback,
            execution_time_ms,
            cache_hit: false,
            error: None,
        }
    }

    pub fn failure(source: ResultSource, error: String, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            data: None,
            source,
            execution_time_ms,
            cache_hit: false,
            error: Some(error),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == ResultSource::Fallback
    }
}

/// Running aggregate of an agent's call history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_execution_time_ms: f64,
    /// Fraction of requests served from cache, 0.0 to 1.0.
    pub cache_hit_rate: f64,
    pub last_error: Option<String>,
}

impl AgentMetrics {
    /// Fraction of requests that succeeded, 0.0 when nothing has run yet.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }
}
