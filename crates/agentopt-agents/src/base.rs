use std::future::Future;
use std::time::{Duration, Instant};

use agentopt_models::{AgentConfig, AgentMetrics, AgentResult, ResultSource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::AgentError;
use crate::metrics::MetricsRecorder;
use crate::namespace::CacheNamespace;

/// Shared execution core for every agent: timeout-bounded primary calls,
/// cache lookups, fallback on failure, and metrics bookkeeping.
///
/// Each primary or fallback call receives a child of the agent's shutdown
/// token. On timeout that child is cancelled and the call's future is dropped,
/// so the collaborator can release whatever it was holding.
pub struct BaseAgent {
    config: AgentConfig,
    metrics: MetricsRecorder,
    shutdown: CancellationToken,
}

type NoFallback<V> = fn(CancellationToken) -> std::future::Ready<Result<V, AgentError>>;

impl BaseAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            metrics: MetricsRecorder::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    pub fn metrics(&self) -> AgentMetrics {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    pub fn update_metrics(
        &self,
        success: bool,
        execution_time_ms: u64,
        cache_hit: bool,
        error: Option<&str>,
    ) {
        self.metrics.record(success, execution_time_ms, cache_hit, error);
    }

    /// Cancel every in-flight call and refuse to start new ones.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Race `operation` against `timeout` and the agent's shutdown token.
    pub async fn execute_with_timeout<V, P, Fut>(
        &self,
        operation: P,
        timeout: Duration,
    ) -> Result<V, AgentError>
    where
        P: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<V, AgentError>>,
    {
        if self.shutdown.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let token = self.shutdown.child_token();
        let op = operation(token.clone());

        tokio::select! {
            result = op => result,
            _ = tokio::time::sleep(timeout) => {
                token.cancel();
                Err(AgentError::Timeout(timeout.as_millis() as u64))
            }
            _ = self.shutdown.cancelled() => Err(AgentError::Cancelled),
        }
    }

    /// Run a primary operation with an optional cache lookup in front of it
    /// and `fallback` behind it.
    ///
    /// The fallback receives no timeout of its own; it is the path of last resort.
    pub async fn execute<V, P, PFut, F, FFut>(
        &self,
        cached: Option<(&CacheNamespace<V>, String)>,
        primary: P,
        fallback: F,
    ) -> AgentResult<V>
    where
        V: Clone + Send + Sync + 'static,
        P: FnOnce(CancellationToken) -> PFut + Send,
        PFut: Future<Output = Result<V, AgentError>> + Send,
        F: FnOnce(CancellationToken) -> FFut + Send,
        FFut: Future<Output = Result<V, AgentError>> + Send,
    {
        self.run(cached, primary, Some(fallback)).await
    }

    /// Like `execute`, for operations with no degraded path. A primary
    /// failure is returned directly as `success == false`.
    pub async fn execute_without_fallback<V, P, PFut>(
        &self,
        cached: Option<(&CacheNamespace<V>, String)>,
        primary: P,
    ) -> AgentResult<V>
    where
        V: Clone + Send + Sync + 'static,
        P: FnOnce(CancellationToken) -> PFut + Send,
        PFut: Future<Output = Result<V, AgentError>> + Send,
    {
        self.run(cached, primary, None::<NoFallback<V>>).await
    }

    async fn run<V, P, PFut, F, FFut>(
        &self,
        cached: Option<(&CacheNamespace<V>, String)>,
        primary: P,
        fallback: Option<F>,
    ) -> AgentResult<V>
    where
        V: Clone + Send + Sync + 'static,
        P: FnOnce(CancellationToken) -> PFut + Send,
        PFut: Future<Output = Result<V, AgentError>> + Send,
        F: FnOnce(CancellationToken) -> FFut + Send,
        FFut: Future<Output = Result<V, AgentError>> + Send,
    {
        let start = Instant::now();

        if !self.config.enabled {
            let err = AgentError::Disabled(self.config.id.clone());
            return self.fail(ResultSource::Agent, &err, start);
        }

        if let Some((namespace, key)) = &cached {
            if let Some(value) = namespace.get(key) {
                let elapsed = elapsed_ms(start);
                debug!(agent = %self.config.id, cache = namespace.name(), key = %key, "Cache hit");
                self.metrics.record(true, elapsed, true, None);
                return AgentResult::from_agent(value, elapsed, true);
            }
        }

        let timeout = self.timeout();
        let outcome = match &cached {
            Some((namespace, key)) => {
                debug!(agent = %self.config.id, cache = namespace.name(), key = %key, "Cache miss");
                // The entry is written before the flight releases the key.
                let leader = async {
                    let outcome = self.execute_with_timeout(primary, timeout).await;
                    if let Ok(value) = &outcome {
                        namespace.put(key, value.clone());
                    }
                    outcome
                };
                namespace
                    .flight()
                    .run(key, leader)
                    .await
                    .unwrap_or_else(|e| Err(AgentError::from(e)))
            }
            None => self.execute_with_timeout(primary, timeout).await,
        };

        let primary_err = match outcome {
            Ok(value) => {
                let elapsed = elapsed_ms(start);
                self.metrics.record(true, elapsed, false, None);
                return AgentResult::from_agent(value, elapsed, false);
            }
            Err(e) => e,
        };

        let fallback = match fallback {
            Some(fallback) if primary_err != AgentError::Cancelled => fallback,
            _ => {
                warn!(agent = %self.config.id, error = %primary_err, "Primary operation failed");
                return self.fail(ResultSource::Agent, &primary_err, start);
            }
        };

        warn!(
            agent = %self.config.id,
            error = %primary_err,
            elapsed_ms = elapsed_ms(start),
            "Primary operation failed, using fallback"
        );

        match fallback(self.shutdown.child_token()).await {
            Ok(value) => {
                let elapsed = elapsed_ms(start);
                self.metrics.record(true, elapsed, false, None);
                AgentResult::from_fallback(value, elapsed)
            }
            Err(fallback_err) => {
                error!(
                    agent = %self.config.id,
                    primary_error = %primary_err,
                    fallback_error = %fallback_err,
                    "Fallback failed"
                );
                let err = AgentError::Fallback(fallback_err.to_string());
                self.fail(ResultSource::Fallback, &err, start)
            }
        }
    }

    fn fail<V>(&self, source: ResultSource, err: &AgentError, start: Instant) -> AgentResult<V> {
        let elapsed = elapsed_ms(start);
        let message = err.to_string();
        self.metrics.record(false, elapsed, false, Some(&message));
        AgentResult::failure(source, message, elapsed)
    }
}

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentopt_cache::{CacheBackend, CacheStore};
    use agentopt_models::EvictionPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Blocks the writing thread in `set`, widening the gap between a leader
    /// finishing its call and its entry becoming readable.
    struct SlowWriteStore {
        inner: CacheStore<String>,
        delay: Duration,
    }

    impl CacheBackend<String> for SlowWriteStore {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: String, ttl: Duration) {
            std::thread::sleep(self.delay);
            self.inner.set(key, value, ttl);
        }

        fn remove(&self, key: &str) -> Option<String> {
            self.inner.remove(key)
        }

        fn clear(&self) {
            self.inner.clear();
        }

        fn len(&self) -> usize {
            self.inner.len()
        }

        fn policy(&self) -> EvictionPolicy {
            EvictionPolicy::InsertionOrder
        }
    }

    fn agent(timeout_ms: u64) -> BaseAgent {
        BaseAgent::new(AgentConfig::new("test", "Test Agent", timeout_ms))
    }

    fn namespace() -> CacheNamespace<String> {
        CacheNamespace::new(
            "test",
            Arc::new(CacheStore::new(16)),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn timeout_fires_before_slow_operation() {
        let agent = agent(10);
        let result = agent
            .execute_with_timeout(
                |_| async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok::<_, AgentError>(1)
                },
                Duration::from_millis(10),
            )
            .await;
        assert_eq!(result, Err(AgentError::Timeout(10)));
    }

    #[tokio::test]
    async fn timeout_cancels_operation_token() {
        let agent = agent(10);
        let seen = Arc::new(std::sync::Mutex::new(None::<CancellationToken>));
        let seen_in_op = Arc::clone(&seen);

        let _ = agent
            .execute_with_timeout(
                move |token| {
                    *seen_in_op.lock().unwrap() = Some(token);
                    async {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok::<_, AgentError>(())
                    }
                },
                Duration::from_millis(10),
            )
            .await;

        let token = seen.lock().unwrap().clone().unwrap();
        assert!(token.is_cancelled());
        assert!(!agent.is_shut_down());
    }

    #[tokio::test]
    async fn second_call_is_cache_hit() {
        let agent = agent(1_000);
        let ns = namespace();
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        for expected_hit in [false, true] {
            let result = agent
                .execute_without_fallback(Some((&ns, "k".to_string())), move |_| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("value".to_string())
                })
                .await;
            assert!(result.success);
            assert_eq!(result.data.as_deref(), Some("value"));
            assert_eq!(result.cache_hit, expected_hit);
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let metrics = agent.metrics();
        assert_eq!(metrics.total_requests, 2);
        assert!((metrics.cache_hit_rate - 0.5).abs() < 1e-9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn key_stays_in_flight_until_cached() {
        let agent = Arc::new(agent(1_000));
        let ns = Arc::new(CacheNamespace::new(
            "slow",
            Arc::new(SlowWriteStore {
                inner: CacheStore::new(16),
                delay: Duration::from_millis(150),
            }),
            Duration::from_secs(60),
        ));
        let calls = Arc::new(AtomicUsize::new(0));

        let spawn_call = || {
            let agent = Arc::clone(&agent);
            let ns = Arc::clone(&ns);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                agent
                    .execute_without_fallback(Some((&*ns, "k".to_string())), move |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok("value".to_string())
                    })
                    .await
            })
        };

        let leader = spawn_call();
        // The leader is now blocked writing its entry.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let follower = spawn_call();

        assert!(leader.await.unwrap().success);
        let joined = follower.await.unwrap();
        assert!(joined.success);
        assert!(!joined.cache_hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(ns.contains("k"));
    }

    #[tokio::test]
    async fn failure_uses_fallback() {
        let agent = agent(1_000);
        let result = agent
            .execute(
                None,
                |_| async { Err::<u32, _>(AgentError::Operation("primary down".to_string())) },
                |_| async { Ok(7) },
            )
            .await;

        assert!(result.success);
        assert_eq!(result.source, ResultSource::Fallback);
        assert_eq!(result.data, Some(7));
        assert_eq!(agent.metrics().successful_requests, 1);
    }

    #[tokio::test]
    async fn fallback_failure_reports_fallback_error_only() {
        let agent = agent(1_000);
        let result = agent
            .execute(
                None,
                |_| async { Err::<u32, _>(AgentError::Operation("primary down".to_string())) },
                |_| async { Err(AgentError::Operation("legacy down".to_string())) },
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.source, ResultSource::Fallback);
        let error = result.error.unwrap();
        assert!(error.contains("legacy down"));
        assert!(!error.contains("primary down"));

        let metrics = agent.metrics();
        assert_eq!(metrics.failed_requests, 1);
        assert_eq!(metrics.last_error.as_deref(), Some(error.as_str()));
    }

    #[tokio::test]
    async fn fallback_results_are_not_cached() {
        let agent = agent(1_000);
        let ns = namespace();
        let result = agent
            .execute(
                Some((&ns, "k".to_string())),
                |_| async { Err(AgentError::Operation("down".to_string())) },
                |_| async { Ok("legacy".to_string()) },
            )
            .await;

        assert!(result.is_fallback());
        assert!(!ns.contains("k"));
    }

    #[tokio::test]
    async fn failure_without_fallback() {
        let agent = agent(1_000);
        let result = agent
            .execute_without_fallback(None, |_| async {
                Err::<u32, _>(AgentError::Operation("bad input".to_string()))
            })
            .await;

        assert!(!result.success);
        assert_eq!(result.source, ResultSource::Agent);
        assert!(result.error.unwrap().contains("bad input"));
    }

    #[tokio::test]
    async fn disabled_agent_does_not_run() {
        let agent = BaseAgent::new(AgentConfig::new("off", "Off", 1_000).disabled());
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = agent
            .execute_without_fallback(None, move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("disabled"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shutdown_skips_fallback() {
        let agent = agent(1_000);
        agent.shutdown();
        let counter = AtomicUsize::new(0);
        let fallback_calls = &counter;
        let result = agent
            .execute(
                None,
                |_| async { Ok(1) },
                move |_| async move {
                    fallback_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(2)
                },
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Operation cancelled"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_misses_run_primary_once() {
        let agent = Arc::new(agent(1_000));
        let ns = Arc::new(namespace());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let (agent, ns, calls) = (Arc::clone(&agent), Arc::clone(&ns), Arc::clone(&calls));
            handles.push(tokio::spawn(async move {
                agent
                    .execute_without_fallback(Some((&*ns, "hot".to_string())), |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok("computed".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            let result = handle.await.unwrap();
            assert_eq!(result.data.as_deref(), Some("computed"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(agent.metrics().total_requests, 5);
    }
}
