//! # Health Monitor
//!
//! Periodically probes every registered instance and feeds the outcomes
//! through the circuit breaker hooks. Probing ignores circuit state:
//! Open instances keep being probed while selection excludes them, and
//! an observed success is the only way a circuit recovers.
//!
//! Each cycle runs five steps in order: promote overdue Open circuits
//! to probation, snapshot the registry, probe every instance
//! concurrently, apply all outcomes in one registry pass, publish the
//! per-instance results and the fresh selectable list.

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryResult;
use crate::events::{DiscoveryEvent, EventBus};
use crate::health::{HealthCheckResult, HealthChecker, ProbeOutcome};
use crate::registry::ServiceRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Outcome of one health cycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HealthCycleSummary {
    /// Instances promoted from Open to probation at the cycle start
    pub promoted: Vec<String>,
    /// Number of instances probed
    pub probed: usize,
}

/// Periodic concurrent health probing over the registry
pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    checker: Arc<dyn HealthChecker>,
    events: EventBus,
    config: DiscoveryConfig,
    loop_handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl HealthMonitor {
    /// Creates a monitor over the given registry and checker
    pub fn new(
        registry: Arc<ServiceRegistry>,
        checker: Arc<dyn HealthChecker>,
        events: EventBus,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            registry,
            checker,
            events,
            config,
            loop_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Runs one health cycle immediately
    ///
    /// Promotion happens before the probes, so an instance whose
    /// recovery timeout has elapsed can be proven healthy and closed
    /// within the same cycle.
    #[instrument(skip(self))]
    pub async fn run_health_cycle(&self) -> DiscoveryResult<HealthCycleSummary> {
        Self::cycle(&self.registry, &self.checker, &self.events, &self.config).await
    }

    async fn cycle(
        registry: &ServiceRegistry,
        checker: &Arc<dyn HealthChecker>,
        events: &EventBus,
        config: &DiscoveryConfig,
    ) -> DiscoveryResult<HealthCycleSummary> {
        let promoted = registry.promote_recovered(config).await;
        if !promoted.is_empty() {
            info!(count = promoted.len(), "Promoted recovered circuits to probation");
        }

        let instances = registry.snapshot().await;
        if instances.is_empty() {
            debug!("No instances to probe, skipping cycle");
            return Ok(HealthCycleSummary { promoted, probed: 0 });
        }

        debug!(instance_count = instances.len(), "Starting health probe round");

        // Probe all instances concurrently
        let mut probe_tasks = Vec::with_capacity(instances.len());
        for instance in instances {
            let checker = checker.clone();
            let task = tokio::spawn(async move {
                let started = Instant::now();
                let result = match checker.check_health(&instance).await {
                    Ok(result) => result,
                    Err(e) => HealthCheckResult::Failed(format!("Health check error: {}", e)),
                };
                ProbeOutcome {
                    instance_id: instance.id,
                    result,
                    latency_ms: started.elapsed().as_millis() as u64,
                }
            });
            probe_tasks.push(task);
        }

        let mut outcomes = Vec::with_capacity(probe_tasks.len());
        for task in probe_tasks {
            match task.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "Health probe task panicked"),
            }
        }

        for outcome in &outcomes {
            match outcome.result.error_message() {
                Some(reason) => warn!(
                    instance_id = %outcome.instance_id,
                    reason = %reason,
                    "Health check failed"
                ),
                None => debug!(
                    instance_id = %outcome.instance_id,
                    latency_ms = outcome.latency_ms,
                    "Health check passed"
                ),
            }
        }

        let probed = outcomes.len();
        let updated = registry.apply_outcomes(&outcomes, config).await;

        for instance in updated {
            events.publish(DiscoveryEvent::HealthUpdate(instance));
        }
        events.publish(DiscoveryEvent::HealthyInstances(
            registry.healthy_snapshot().await,
        ));

        Ok(HealthCycleSummary { promoted, probed })
    }

    /// Starts the supervised health monitoring loop
    ///
    /// The first cycle runs immediately; afterwards the loop sleeps the
    /// probe interval, or the shorter retry interval after a cycle
    /// driver failure. Individual probe failures are outcomes, not loop
    /// errors. Calling `start` while the loop is running is a no-op.
    pub async fn start(&self) -> DiscoveryResult<()> {
        {
            let handle = self.loop_handle.read().await;
            if handle.is_some() {
                info!("Health monitor loop already running, skipping start");
                return Ok(());
            }
        }

        info!(
            checker = self.checker.name(),
            interval_secs = self.config.probe_interval.as_secs(),
            timeout_secs = self.config.probe_timeout.as_secs(),
            "Starting health monitor loop"
        );

        // Clone necessary data for the monitoring task
        let registry = self.registry.clone();
        let checker = self.checker.clone();
        let events = self.events.clone();
        let config = self.config.clone();

        let task_handle = tokio::spawn(async move {
            loop {
                let pause = match Self::cycle(&registry, &checker, &events, &config).await {
                    Ok(_) => config.probe_interval,
                    Err(e) => {
                        warn!(
                            error = %e,
                            retry_secs = config.probe_retry_interval.as_secs(),
                            "Health cycle failed, will retry"
                        );
                        config.probe_retry_interval
                    }
                };
                tokio::time::sleep(pause).await;
            }
        });

        {
            let mut handle = self.loop_handle.write().await;
            *handle = Some(task_handle);
        }

        info!("Health monitor loop started successfully");
        Ok(())
    }

    /// Stops the health monitoring loop
    #[instrument(skip(self))]
    pub async fn stop(&self) -> DiscoveryResult<()> {
        let task_handle = {
            let mut handle = self.loop_handle.write().await;
            handle.take()
        };

        if let Some(handle) = task_handle {
            info!("Stopping health monitor loop");
            handle.abort();

            match tokio::time::timeout(Duration::from_secs(5), async {
                let _ = handle.await;
            })
            .await
            {
                Ok(_) => info!("Health monitor loop stopped successfully"),
                Err(_) => warn!("Health monitor loop did not stop within timeout, force terminated"),
            }
        } else {
            debug!("Health monitor loop was not running");
        }

        Ok(())
    }

    /// Returns whether the monitoring loop is currently running
    pub async fn is_running(&self) -> bool {
        self.loop_handle.read().await.is_some()
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("checker", &self.checker.name())
            .field("loop_handle", &"<RwLock<Option<JoinHandle>>>")
            .finish()
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        // Best-effort abort; stop() is the graceful path.
        if let Ok(handle) = self.loop_handle.try_read() {
            if let Some(task) = handle.as_ref() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Advertisement, CircuitState};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Checker returning scripted results keyed by base URL
    struct ScriptedChecker {
        results: Arc<RwLock<HashMap<String, HealthCheckResult>>>,
    }

    impl ScriptedChecker {
        fn new() -> Self {
            Self {
                results: Arc::new(RwLock::new(HashMap::new())),
            }
        }

        async fn script(&self, base_url: &str, result: HealthCheckResult) {
            self.results.write().await.insert(base_url.to_string(), result);
        }
    }

    #[async_trait]
    impl HealthChecker for ScriptedChecker {
        async fn check_url(&self, base_url: &str) -> DiscoveryResult<HealthCheckResult> {
            Ok(self
                .results
                .read()
                .await
                .get(base_url)
                .cloned()
                .unwrap_or_else(|| HealthCheckResult::Failed("unscripted".to_string())))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    async fn seeded_registry(hosts: &[&str]) -> Arc<ServiceRegistry> {
        let registry = Arc::new(ServiceRegistry::new());
        let ads: Vec<Advertisement> = hosts
            .iter()
            .map(|host| Advertisement::new("svc", *host, 8080))
            .collect();
        registry.reconcile(&ads, "static").await;
        registry
    }

    #[tokio::test]
    async fn test_cycle_applies_mixed_outcomes() {
        let registry = seeded_registry(&["10.0.0.1", "10.0.0.2"]).await;
        let checker = Arc::new(ScriptedChecker::new());
        checker.script("http://10.0.0.1:8080", HealthCheckResult::Healthy).await;
        checker
            .script(
                "http://10.0.0.2:8080",
                HealthCheckResult::Unhealthy("HTTP 503".to_string()),
            )
            .await;

        let events = EventBus::new(16);
        let mut rx = events.subscribe();
        let monitor = HealthMonitor::new(
            registry.clone(),
            checker,
            events,
            DiscoveryConfig::default(),
        );

        let summary = monitor.run_health_cycle().await.unwrap();
        assert_eq!(summary.probed, 2);
        assert!(summary.promoted.is_empty());

        let good = registry.get("10.0.0.1:8080").await.unwrap();
        assert!(good.is_healthy);
        let bad = registry.get("10.0.0.2:8080").await.unwrap();
        assert!(!bad.is_healthy);
        assert_eq!(bad.failure_count, 1);

        let mut health_updates = 0;
        let mut list_snapshots = 0;
        for _ in 0..3 {
            match rx.recv().await.unwrap() {
                DiscoveryEvent::HealthUpdate(_) => health_updates += 1,
                DiscoveryEvent::HealthyInstances(list) => {
                    list_snapshots += 1;
                    assert_eq!(list.len(), 1);
                }
            }
        }
        assert_eq!(health_updates, 2);
        assert_eq!(list_snapshots, 1);
    }

    #[tokio::test]
    async fn test_empty_registry_skips_probing() {
        let registry = Arc::new(ServiceRegistry::new());
        let monitor = HealthMonitor::new(
            registry,
            Arc::new(ScriptedChecker::new()),
            EventBus::new(8),
            DiscoveryConfig::default(),
        );

        let summary = monitor.run_health_cycle().await.unwrap();
        assert_eq!(summary.probed, 0);
    }

    #[tokio::test]
    async fn test_repeated_failures_open_circuit_and_promotion_recovers_it() {
        let mut config = DiscoveryConfig::default();
        config.recovery_timeout = Duration::from_millis(50);

        let registry = seeded_registry(&["10.0.0.1"]).await;
        let checker = Arc::new(ScriptedChecker::new());
        checker
            .script(
                "http://10.0.0.1:8080",
                HealthCheckResult::Failed("connection refused".to_string()),
            )
            .await;

        let monitor = HealthMonitor::new(
            registry.clone(),
            checker.clone(),
            EventBus::new(16),
            config,
        );

        for _ in 0..3 {
            monitor.run_health_cycle().await.unwrap();
        }
        let inst = registry.get("10.0.0.1:8080").await.unwrap();
        assert_eq!(inst.circuit_state, CircuitState::Open);
        assert!(!inst.is_selectable());

        // Past the recovery timeout but still failing: the cycle promotes
        // to probation, then the failed probe reopens the circuit.
        tokio::time::sleep(Duration::from_millis(80)).await;
        let summary = monitor.run_health_cycle().await.unwrap();
        assert_eq!(summary.promoted, vec!["10.0.0.1:8080".to_string()]);
        let inst = registry.get("10.0.0.1:8080").await.unwrap();
        assert_eq!(inst.circuit_state, CircuitState::Open);

        // Past the timeout again and now answering: promotion and the
        // healthy probe close the circuit within one cycle.
        checker.script("http://10.0.0.1:8080", HealthCheckResult::Healthy).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        let summary = monitor.run_health_cycle().await.unwrap();
        assert_eq!(summary.promoted, vec!["10.0.0.1:8080".to_string()]);

        let inst = registry.get("10.0.0.1:8080").await.unwrap();
        assert_eq!(inst.circuit_state, CircuitState::Closed);
        assert!(inst.is_healthy);
        assert!(inst.is_selectable());
        assert_eq!(inst.failure_count, 0);
    }

    #[tokio::test]
    async fn test_open_instances_are_still_probed() {
        let registry = seeded_registry(&["10.0.0.1"]).await;
        let checker = Arc::new(ScriptedChecker::new());
        checker
            .script(
                "http://10.0.0.1:8080",
                HealthCheckResult::Failed("down".to_string()),
            )
            .await;

        let monitor = HealthMonitor::new(
            registry.clone(),
            checker,
            EventBus::new(16),
            DiscoveryConfig::default(),
        );

        for _ in 0..5 {
            let summary = monitor.run_health_cycle().await.unwrap();
            assert_eq!(summary.probed, 1, "open circuit must not stop probing");
        }
        let inst = registry.get("10.0.0.1:8080").await.unwrap();
        assert_eq!(inst.failure_count, 5);
    }

    #[tokio::test]
    async fn test_loop_runs_and_stops() {
        let mut config = DiscoveryConfig::default();
        config.probe_interval = Duration::from_millis(40);
        config.probe_retry_interval = Duration::from_millis(20);
        config.probe_timeout = Duration::from_millis(10);

        let registry = seeded_registry(&["10.0.0.1"]).await;
        let checker = Arc::new(ScriptedChecker::new());
        checker.script("http://10.0.0.1:8080", HealthCheckResult::Healthy).await;

        let monitor = HealthMonitor::new(registry.clone(), checker, EventBus::new(16), config);

        assert!(!monitor.is_running().await);
        monitor.start().await.unwrap();
        assert!(monitor.is_running().await);
        monitor.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let inst = registry.get("10.0.0.1:8080").await.unwrap();
        assert!(inst.weight > 1.0, "healthy probes should have grown the weight");

        monitor.stop().await.unwrap();
        assert!(!monitor.is_running().await);
        monitor.stop().await.unwrap();
    }
}
