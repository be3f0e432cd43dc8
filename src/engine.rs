//! # Discovery Engine
//!
//! Drives the discovery transport on a fixed period and reconciles each
//! cycle's advertisement set into the registry. The loop is supervised:
//! a failed cycle is logged and retried after a shorter backoff, and the
//! loop never terminates on error.

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryResult;
use crate::events::{DiscoveryEvent, EventBus};
use crate::registry::{ReconcileSummary, ServiceRegistry};
use crate::transport::DiscoveryTransport;
use crate::types::Advertisement;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Periodic advertisement collection and registry reconciliation
///
/// One engine owns one transport. Each cycle listens for the configured
/// window, validates and de-duplicates what it heard, applies the result
/// to the registry as a full add/update/remove diff, and publishes the
/// selectable-instance list to subscribers.
pub struct DiscoveryEngine {
    registry: Arc<ServiceRegistry>,
    transport: Arc<dyn DiscoveryTransport>,
    events: EventBus,
    config: DiscoveryConfig,
    loop_handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl DiscoveryEngine {
    /// Creates an engine over the given registry and transport
    pub fn new(
        registry: Arc<ServiceRegistry>,
        transport: Arc<dyn DiscoveryTransport>,
        events: EventBus,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            events,
            config,
            loop_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Runs one discovery cycle immediately
    ///
    /// Listens for the configured window, then reconciles. Discovering
    /// zero instances is a valid outcome that empties the registry; only
    /// transport-level failures return an error.
    #[instrument(skip(self))]
    pub async fn run_discovery_cycle(&self) -> DiscoveryResult<ReconcileSummary> {
        Self::cycle(&self.registry, self.transport.as_ref(), &self.events, &self.config).await
    }

    async fn cycle(
        registry: &ServiceRegistry,
        transport: &dyn DiscoveryTransport,
        events: &EventBus,
        config: &DiscoveryConfig,
    ) -> DiscoveryResult<ReconcileSummary> {
        let advertisements = transport.discover(config.discovery_timeout).await?;

        let mut valid: HashMap<String, Advertisement> = HashMap::new();
        for ad in advertisements {
            match ad.validate() {
                Ok(()) => {
                    valid.insert(ad.instance_id(), ad);
                }
                Err(e) => {
                    warn!(error = %e, "Dropping invalid advertisement");
                }
            }
        }

        let ads: Vec<Advertisement> = valid.into_values().collect();
        let summary = registry.reconcile(&ads, transport.name()).await;

        if summary.added > 0 || summary.removed > 0 {
            info!(
                added = summary.added,
                updated = summary.updated,
                removed = summary.removed,
                "Discovery cycle changed registry"
            );
        } else {
            debug!(updated = summary.updated, "Discovery cycle completed");
        }

        events.publish(DiscoveryEvent::HealthyInstances(
            registry.healthy_snapshot().await,
        ));
        Ok(summary)
    }

    /// Starts the supervised discovery loop
    ///
    /// The first cycle runs immediately; afterwards the loop sleeps the
    /// discovery interval, or the shorter retry interval after a failed
    /// cycle. Calling `start` while the loop is running is a no-op.
    pub async fn start(&self) -> DiscoveryResult<()> {
        {
            let handle = self.loop_handle.read().await;
            if handle.is_some() {
                info!("Discovery loop already running, skipping start");
                return Ok(());
            }
        }

        info!(
            transport = self.transport.name(),
            interval_secs = self.config.discovery_interval.as_secs(),
            retry_secs = self.config.discovery_retry_interval.as_secs(),
            "Starting discovery loop"
        );

        // Clone necessary data for the discovery task
        let registry = self.registry.clone();
        let transport = self.transport.clone();
        let events = self.events.clone();
        let config = self.config.clone();

        let task_handle = tokio::spawn(async move {
            loop {
                let pause =
                    match Self::cycle(&registry, transport.as_ref(), &events, &config).await {
                        Ok(_) => config.discovery_interval,
                        Err(e) => {
                            warn!(
                                error = %e,
                                retry_secs = config.discovery_retry_interval.as_secs(),
                                "Discovery cycle failed, will retry"
                            );
                            config.discovery_retry_interval
                        }
                    };
                tokio::time::sleep(pause).await;
            }
        });

        {
            let mut handle = self.loop_handle.write().await;
            *handle = Some(task_handle);
        }

        info!("Discovery loop started successfully");
        Ok(())
    }

    /// Stops the discovery loop
    ///
    /// Aborts the background task and waits briefly for it to wind
    /// down. Safe to call when the loop is not running.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> DiscoveryResult<()> {
        let task_handle = {
            let mut handle = self.loop_handle.write().await;
            handle.take()
        };

        if let Some(handle) = task_handle {
            info!("Stopping discovery loop");
            handle.abort();

            match tokio::time::timeout(Duration::from_secs(5), async {
                let _ = handle.await;
            })
            .await
            {
                Ok(_) => info!("Discovery loop stopped successfully"),
                Err(_) => warn!("Discovery loop did not stop within timeout, force terminated"),
            }
        } else {
            debug!("Discovery loop was not running");
        }

        Ok(())
    }

    /// Returns whether the discovery loop is currently running
    pub async fn is_running(&self) -> bool {
        self.loop_handle.read().await.is_some()
    }
}

impl std::fmt::Debug for DiscoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryEngine")
            .field("transport", &self.transport.name())
            .field("loop_handle", &"<RwLock<Option<JoinHandle>>>")
            .finish()
    }
}

impl Drop for DiscoveryEngine {
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
    use crate::transport::StaticDiscovery;
    use async_trait::async_trait;

    /// Transport whose advertisement set can be swapped between cycles
    struct SwappableTransport {
        ads: Arc<RwLock<Vec<Advertisement>>>,
    }

    #[async_trait]
    impl DiscoveryTransport for SwappableTransport {
        async fn discover(&self, _timeout: Duration) -> DiscoveryResult<Vec<Advertisement>> {
            Ok(self.ads.read().await.clone())
        }

        fn name(&self) -> &'static str {
            "swappable"
        }
    }

    fn fast_config() -> DiscoveryConfig {
        let mut config = DiscoveryConfig::default();
        config.discovery_interval = Duration::from_millis(50);
        config.discovery_retry_interval = Duration::from_millis(20);
        config.discovery_timeout = Duration::from_millis(10);
        config
    }

    #[tokio::test]
    async fn test_cycle_populates_registry_and_publishes() {
        let registry = Arc::new(ServiceRegistry::new());
        let events = EventBus::new(8);
        let mut rx = events.subscribe();
        let transport = Arc::new(StaticDiscovery::new(vec![
            Advertisement::new("a", "10.0.0.1", 8080),
            Advertisement::new("b", "10.0.0.2", 8080),
        ]));
        let engine = DiscoveryEngine::new(registry.clone(), transport, events, fast_config());

        let summary = engine.run_discovery_cycle().await.unwrap();
        assert_eq!(summary.added, 2);
        assert_eq!(registry.len().await, 2);

        match rx.recv().await.unwrap() {
            DiscoveryEvent::HealthyInstances(list) => assert_eq!(list.len(), 2),
            other => panic!("unexpected event: {:?}", other),
        }

        let instance = registry.get("10.0.0.1:8080").await.unwrap();
        assert_eq!(
            instance.metadata.get(crate::types::META_DISCOVERY_METHOD).map(String::as_str),
            Some("static")
        );
    }

    #[tokio::test]
    async fn test_cycle_drops_invalid_advertisements() {
        let registry = Arc::new(ServiceRegistry::new());
        let transport = Arc::new(StaticDiscovery::new(vec![
            Advertisement::new("good", "10.0.0.1", 8080),
            Advertisement::new("", "10.0.0.2", 8080),
            Advertisement::new("zero-port", "10.0.0.3", 0),
        ]));
        let engine =
            DiscoveryEngine::new(registry.clone(), transport, EventBus::new(8), fast_config());

        let summary = engine.run_discovery_cycle().await.unwrap();
        assert_eq!(summary.added, 1);
        assert!(registry.get("10.0.0.1:8080").await.is_some());
        assert!(registry.get("10.0.0.2:8080").await.is_none());
    }

    #[tokio::test]
    async fn test_consecutive_cycles_apply_full_diff() {
        let registry = Arc::new(ServiceRegistry::new());
        let ads = Arc::new(RwLock::new(vec![
            Advertisement::new("a", "10.0.0.1", 8080),
            Advertisement::new("b", "10.0.0.2", 8080),
        ]));
        let transport = Arc::new(SwappableTransport { ads: ads.clone() });
        let engine =
            DiscoveryEngine::new(registry.clone(), transport, EventBus::new(8), fast_config());

        engine.run_discovery_cycle().await.unwrap();
        assert_eq!(registry.len().await, 2);

        *ads.write().await = vec![
            Advertisement::new("a", "10.0.0.1", 8080),
            Advertisement::new("c", "10.0.0.3", 8080),
        ];
        let summary = engine.run_discovery_cycle().await.unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.removed, 1);

        assert!(registry.get("10.0.0.1:8080").await.is_some());
        assert!(registry.get("10.0.0.2:8080").await.is_none());
        assert!(registry.get("10.0.0.3:8080").await.is_some());
    }

    #[tokio::test]
    async fn test_loop_runs_and_stops() {
        let registry = Arc::new(ServiceRegistry::new());
        let ads = Arc::new(RwLock::new(vec![Advertisement::new("a", "10.0.0.1", 8080)]));
        let transport = Arc::new(SwappableTransport { ads: ads.clone() });
        let engine =
            DiscoveryEngine::new(registry.clone(), transport, EventBus::new(8), fast_config());

        assert!(!engine.is_running().await);
        engine.start().await.unwrap();
        assert!(engine.is_running().await);

        // Second start is a no-op while the loop runs.
        engine.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(registry.len().await, 1);

        *ads.write().await = Vec::new();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(registry.is_empty().await);

        engine.stop().await.unwrap();
        assert!(!engine.is_running().await);
        engine.stop().await.unwrap();
    }
}
