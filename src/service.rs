//! Top-level service discovery facade
//!
//! [`ServiceDiscovery`] wires the registry, discovery engine, health
//! monitor, selector, acquisition ladder, and event bus into one
//! handle. Most applications construct it from a [`DiscoveryConfig`],
//! call [`start`](ServiceDiscovery::start), and then use
//! [`pick_instance`](ServiceDiscovery::pick_instance) per request.
//!
//! All operations are safe to call concurrently from multiple tasks.

use crate::cache::UrlCache;
use crate::config::DiscoveryConfig;
use crate::engine::DiscoveryEngine;
use crate::error::DiscoveryResult;
use crate::events::{DiscoveryEvent, EventBus};
use crate::fallback::UrlAcquirer;
use crate::health::{HealthCheckResult, HealthChecker, HttpHealthChecker, ProbeOutcome};
use crate::monitor::{HealthCycleSummary, HealthMonitor};
use crate::registry::{ReconcileSummary, ServiceRegistry};
use crate::selector::InstanceSelector;
use crate::transport::{DiscoveryTransport, MulticastDiscovery};
use crate::types::{ServiceInstance, ServiceStats};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::instrument;

/// Complete service discovery system
///
/// Owns the discovery and health loops and exposes instance selection,
/// event subscription, manual outcome reporting, and cold-start URL
/// acquisition over one shared registry.
///
/// # Examples
///
/// ```rust
/// use lantern::{DiscoveryConfig, ServiceDiscovery};
///
/// # async fn example() -> Result<(), lantern::DiscoveryError> {
/// let discovery = ServiceDiscovery::with_config(DiscoveryConfig::default())?;
/// discovery.start().await?;
///
/// if let Some(instance) = discovery.pick_instance().await {
///     println!("Routing to {}", instance.base_url);
/// }
///
/// discovery.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ServiceDiscovery {
    config: DiscoveryConfig,
    registry: Arc<ServiceRegistry>,
    events: EventBus,
    engine: DiscoveryEngine,
    monitor: HealthMonitor,
    selector: InstanceSelector,
    acquirer: UrlAcquirer,
    cache: UrlCache,
}

impl ServiceDiscovery {
    /// Creates a service discovery system with default configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lantern::ServiceDiscovery;
    ///
    /// # fn main() -> Result<(), lantern::DiscoveryError> {
    /// let discovery = ServiceDiscovery::new()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new() -> DiscoveryResult<Self> {
        Self::with_config(DiscoveryConfig::default())
    }

    /// Creates a service discovery system with custom configuration
    ///
    /// The configuration is validated up front; discovery runs over the
    /// configured multicast transport and probes with an HTTP checker.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lantern::{DiscoveryConfig, ServiceDiscovery};
    /// use std::time::Duration;
    ///
    /// # fn main() -> Result<(), lantern::DiscoveryError> {
    /// let config = DiscoveryConfig {
    ///     probe_interval: Duration::from_secs(10),
    ///     failure_threshold: 5,
    ///     ..Default::default()
    /// };
    /// let discovery = ServiceDiscovery::with_config(config)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_config(config: DiscoveryConfig) -> DiscoveryResult<Self> {
        config.validate()?;

        let transport: Arc<dyn DiscoveryTransport> =
            Arc::new(MulticastDiscovery::from_config(&config));
        let checker = HttpHealthChecker::new(config.probe_timeout, config.health_path.clone());
        let cache = UrlCache::from_config(&config);
        let acquirer =
            UrlAcquirer::with_checker(transport.clone(), &checker, &config, cache.clone());

        Ok(Self::assemble(config, transport, Arc::new(checker), cache, acquirer))
    }

    /// Creates a service discovery system with injected transport and checker
    ///
    /// This is primarily useful for testing with scripted transports or
    /// health checkers. The acquisition ladder keeps its own HTTP prober
    /// so that cached and fallback URLs are always verified over the wire.
    pub fn with_components(
        config: DiscoveryConfig,
        transport: Arc<dyn DiscoveryTransport>,
        checker: Arc<dyn HealthChecker>,
    ) -> DiscoveryResult<Self> {
        config.validate()?;

        let cache = UrlCache::from_config(&config);
        let acquirer = UrlAcquirer::new(transport.clone(), &config, cache.clone());

        Ok(Self::assemble(config, transport, checker, cache, acquirer))
    }

    fn assemble(
        config: DiscoveryConfig,
        transport: Arc<dyn DiscoveryTransport>,
        checker: Arc<dyn HealthChecker>,
        cache: UrlCache,
        acquirer: UrlAcquirer,
    ) -> Self {
        let registry = Arc::new(ServiceRegistry::new());
        let events = EventBus::new(config.event_capacity);
        let engine = DiscoveryEngine::new(
            registry.clone(),
            transport,
            events.clone(),
            config.clone(),
        );
        let monitor = HealthMonitor::new(
            registry.clone(),
            checker,
            events.clone(),
            config.clone(),
        );
        let selector = InstanceSelector::new(registry.clone());

        Self {
            config,
            registry,
            events,
            engine,
            monitor,
            selector,
            acquirer,
            cache,
        }
    }

    /// Starts the discovery and health monitoring loops
    ///
    /// Both loops run their first cycle immediately. Starting an
    /// already-started system is a no-op.
    pub async fn start(&self) -> DiscoveryResult<()> {
        self.engine.start().await?;
        self.monitor.start().await?;
        Ok(())
    }

    /// Stops both background loops
    ///
    /// Waits briefly for each loop to acknowledge cancellation. Stopping
    /// an already-stopped system is a no-op.
    pub async fn stop(&self) -> DiscoveryResult<()> {
        self.monitor.stop().await?;
        self.engine.stop().await?;
        Ok(())
    }

    /// Returns true while either background loop is running
    pub async fn is_running(&self) -> bool {
        self.engine.is_running().await || self.monitor.is_running().await
    }

    /// Picks one instance by weighted-random selection
    ///
    /// Only healthy instances whose circuit is not open participate.
    /// Returns `None` when no instance is currently eligible; callers
    /// should then fall back to [`acquire_base_url`](Self::acquire_base_url)
    /// or a cached URL.
    pub async fn pick_instance(&self) -> Option<ServiceInstance> {
        self.selector.pick().await
    }

    /// Returns a snapshot of every registered instance
    pub async fn all_instances(&self) -> Vec<ServiceInstance> {
        self.registry.snapshot().await
    }

    /// Returns a snapshot of instances currently eligible for selection
    pub async fn healthy_instances(&self) -> Vec<ServiceInstance> {
        self.registry.healthy_snapshot().await
    }

    /// Returns aggregate registry statistics
    pub async fn stats(&self) -> ServiceStats {
        self.registry.stats().await
    }

    /// Runs one discovery cycle immediately, outside the loop cadence
    pub async fn force_refresh(&self) -> DiscoveryResult<ReconcileSummary> {
        self.engine.run_discovery_cycle().await
    }

    /// Runs one health cycle immediately, outside the loop cadence
    pub async fn force_probe(&self) -> DiscoveryResult<HealthCycleSummary> {
        self.monitor.run_health_cycle().await
    }

    /// Subscribes to instance health and roster change events
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }

    /// Reports a successful business call against an instance
    ///
    /// Feeds the same recovery hooks as a passing health probe: failure
    /// count resets, the circuit closes, and the weight grows when the
    /// call was fast. Unknown ids are ignored.
    #[instrument(skip(self))]
    pub async fn report_success(&self, instance_id: &str, latency_ms: u64) {
        let outcome = ProbeOutcome {
            instance_id: instance_id.to_string(),
            result: HealthCheckResult::Healthy,
            latency_ms,
        };
        if let Some(updated) = self.registry.apply_outcome(&outcome, &self.config).await {
            self.events.publish(DiscoveryEvent::HealthUpdate(updated));
        }
    }

    /// Reports a failed business call against an instance
    ///
    /// Feeds the same degradation hooks as a failing health probe:
    /// weight decays and the circuit opens once the failure threshold is
    /// reached. Unknown ids are ignored.
    #[instrument(skip(self))]
    pub async fn report_failure(&self, instance_id: &str, reason: &str) {
        let outcome = ProbeOutcome {
            instance_id: instance_id.to_string(),
            result: HealthCheckResult::Unhealthy(reason.to_string()),
            latency_ms: 0,
        };
        if let Some(updated) = self.registry.apply_outcome(&outcome, &self.config).await {
            self.events.publish(DiscoveryEvent::HealthUpdate(updated));
        }
    }

    /// Acquires a live base URL through the cold-start ladder
    ///
    /// Intended for startup paths that need an answer before the first
    /// discovery cycle completes. See [`UrlAcquirer::acquire`].
    pub async fn acquire_base_url(&self) -> DiscoveryResult<String> {
        self.acquirer.acquire().await
    }

    /// Returns the last-known-good URL cache
    ///
    /// Exposed so callers can seed a known server address manually or
    /// clear a stale entry.
    pub fn cache(&self) -> &UrlCache {
        &self.cache
    }

    /// Returns the active configuration
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }
}
