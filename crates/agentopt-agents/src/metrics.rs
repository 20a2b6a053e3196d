use std::sync::{Mutex, PoisonError};

use agentopt_models::AgentMetrics;

/// Per-agent running aggregate of call outcomes.
///
/// Latency and cache-hit rate are incremental means over `total_requests`, so
/// each call is folded in exactly once.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    inner: Mutex<AgentMetrics>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one call into the aggregate. `error`, when present, replaces `last_error`.
    pub fn record(&self, success: bool, execution_time_ms: u64, cache_hit: bool, error: Option<&str>) {
        let mut metrics = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        metrics.total_requests += 1;
        if success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }

        let n = metrics.total_requests as f64;
        metrics.average_execution_time_ms =
            (metrics.average_execution_time_ms * (n - 1.0) + execution_time_ms as f64) / n;
        let hit = if cache_hit { 1.0 } else { 0.0 };
        metrics.cache_hit_rate = (metrics.cache_hit_rate * (n - 1.0) + hit) / n;

        if let Some(error) = error {
            metrics.last_error = Some(error.to_string());
        }
    }

    pub fn snapshot(&self) -> AgentMetrics {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reset(&self) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = AgentMetrics::default();
    }
}
