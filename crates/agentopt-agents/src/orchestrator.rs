use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use agentopt_models::AgentMetrics;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::{AgentRequest, AgentResponse, Method, OptimizedAgent};
use crate::bus::CommunicationBus;
use crate::error::AgentError;

/// Point-in-time metrics for one registered agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentPerformance {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub success_rate: f64,
    pub metrics: AgentMetrics,
}

/// Metrics across every registered agent, plus cost totals from the agents
/// that book them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub agents: Vec<AgentPerformance>,
    pub total_cost: Decimal,
    pub cost_saved: Decimal,
}

/// Routes typed requests to registered agents by id.
pub struct Orchestrator {
    agents: RwLock<HashMap<String, Arc<dyn OptimizedAgent>>>,
    bus: Arc<CommunicationBus>,
}

impl Orchestrator {
    pub fn new(bus: Arc<CommunicationBus>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<CommunicationBus> {
        &self.bus
    }

    /// Register `agent` under its configured id, returning any agent it replaced.
    pub fn register(&self, agent: Arc<dyn OptimizedAgent>) -> Option<Arc<dyn OptimizedAgent>> {
        let id = agent.id().to_string();
        info!(agent = %id, "Registering agent");
        let replaced = self
            .agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), agent);
        if replaced.is_some() {
            warn!(agent = %id, "Replaced existing agent with the same id");
        }
        replaced
    }

    pub fn unregister(&self, id: &str) -> Option<Arc<dyn OptimizedAgent>> {
        self.agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn OptimizedAgent>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Agents ordered by configured priority, then id.
    fn sorted_agents(&self) -> Vec<Arc<dyn OptimizedAgent>> {
        let mut agents: Vec<_> = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        agents.sort_by(|a, b| {
            a.config()
                .priority
                .cmp(&b.config().priority)
                .then_with(|| a.id().cmp(b.id()))
        });
        agents
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.sorted_agents()
            .iter()
            .map(|a| a.id().to_string())
            .collect()
    }

    pub async fn route(
        &self,
        agent_id: &str,
        request: AgentRequest,
    ) -> Result<AgentResponse, AgentError> {
        let agent = self
            .get(agent_id)
            .ok_or_else(|| AgentError::AgentNotFound(agent_id.to_string()))?;

        let method = request.method();
        if !agent.supports(method) {
            return Err(AgentError::MethodNotFound {
                agent: agent_id.to_string(),
                method: method.to_string(),
            });
        }

        debug!(agent = %agent_id, method = %method, "Routing request");
        agent.handle(request).await
    }

    /// Route by method name with JSON arguments.
    ///
    /// The agent is resolved before the method, so an unknown agent is
    /// always `AgentNotFound` and an unknown method on a known agent is
    /// `MethodNotFound`.
    pub async fn route_named(
        &self,
        agent_id: &str,
        method: &str,
        args: serde_json::Value,
    ) -> Result<AgentResponse, AgentError> {
        if self.get(agent_id).is_none() {
            return Err(AgentError::AgentNotFound(agent_id.to_string()));
        }
        if method.parse::<Method>().is_err() {
            return Err(AgentError::MethodNotFound {
                agent: agent_id.to_string(),
                method: method.to_string(),
            });
        }
        let request = AgentRequest::from_parts(method, args)?;
        self.route(agent_id, request).await
    }

    pub fn metrics_report(&self) -> PerformanceReport {
        let mut total_cost = Decimal::ZERO;
        let mut cost_saved = Decimal::ZERO;

        let agents = self
            .sorted_agents()
            .iter()
            .map(|agent| {
                if let Some(cost) = agent.cost() {
                    total_cost += cost.total_cost;
                    cost_saved += cost.cost_saved;
                }
                let metrics = agent.metrics();
                AgentPerformance {
                    id: agent.id().to_string(),
                    name: agent.config().name.clone(),
                    enabled: agent.config().enabled,
                    success_rate: metrics.success_rate(),
                    metrics,
                }
            })
            .collect();

        PerformanceReport {
            generated_at: Utc::now(),
            agents,
            total_cost,
            cost_saved,
        }
    }

    pub fn clear_caches(&self) {
        for agent in self.sorted_agents() {
            agent.clear_cache();
        }
    }

    /// Cancel in-flight work on every agent. Agents stay registered but
    /// refuse new work.
    pub fn shutdown(&self) {
        let agents = self.sorted_agents();
        info!(agents = agents.len(), "Shutting down agents");
        for agent in agents {
            agent.shutdown();
        }
    }
}
