//! # Service Registry
//!
//! The single source of truth for tracked service instances. Discovery
//! reconciles advertisement sets into it, the health monitor applies
//! probe outcomes to it, and the selector reads snapshots from it.
//!
//! ## Concurrency
//!
//! The registry is the only shared mutable structure in the subsystem.
//! It is guarded by an async `RwLock`; writers hold the lock only for
//! in-memory mutation, never across network I/O. Components that probe
//! or select first take a cloned snapshot and release the lock.

use crate::config::DiscoveryConfig;
use crate::health::{HealthCheckResult, ProbeOutcome};
use crate::types::{Advertisement, CircuitState, ServiceInstance, ServiceStats};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Outcome of one reconciliation pass
///
/// Counts are per cycle: `added` instances were seen for the first time,
/// `updated` were already tracked, `removed` vanished from the
/// advertisement set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileSummary {
    /// Instances created this cycle
    pub added: usize,
    /// Instances already tracked and refreshed this cycle
    pub updated: usize,
    /// Instances dropped because they were no longer advertised
    pub removed: usize,
}

/// Concurrent map of instance id to tracked instance state
///
/// Identity is `host:port`. Re-discovery of a known id refreshes the
/// connection fields and nothing else; adaptive state (`weight`,
/// `failure_count`, `circuit_state`) survives every reconciliation and
/// is dropped only when the id disappears from the advertisement set.
///
/// # Examples
///
/// ```rust
/// use lantern::{Advertisement, ServiceRegistry};
///
/// # async fn example() {
/// let registry = ServiceRegistry::new();
/// let ads = vec![Advertisement::new("svc", "10.0.0.5", 8080)];
/// let summary = registry.reconcile(&ads, "static").await;
/// assert_eq!(summary.added, 1);
/// assert_eq!(registry.len().await, 1);
/// # }
/// ```
pub struct ServiceRegistry {
    instances: Arc<RwLock<HashMap<String, ServiceInstance>>>,
}

impl ServiceRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            instances: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Applies a full advertisement set atomically
    ///
    /// Present ids are upserted: known instances keep their adaptive
    /// state and get fresh connection fields, unknown instances are
    /// created with defaults. Ids absent from `advertisements` are
    /// removed. An empty set is valid and empties the registry.
    ///
    /// # Arguments
    ///
    /// * `advertisements` - The complete set observed this cycle,
    ///   already validated and de-duplicated by the caller
    /// * `discovery_method` - Transport name recorded on new instances
    pub async fn reconcile(
        &self,
        advertisements: &[Advertisement],
        discovery_method: &str,
    ) -> ReconcileSummary {
        let mut desired: HashMap<String, &Advertisement> = HashMap::new();
        for ad in advertisements {
            desired.insert(ad.instance_id(), ad);
        }

        let mut summary = ReconcileSummary::default();
        let mut instances = self.instances.write().await;

        let stale: Vec<String> = instances
            .keys()
            .filter(|id| !desired.contains_key(*id))
            .cloned()
            .collect();
        for id in stale {
            instances.remove(&id);
            summary.removed += 1;
            info!(instance_id = %id, "Removed instance no longer advertised");
        }

        for (id, ad) in desired {
            match instances.get_mut(&id) {
                Some(existing) => {
                    existing.base_url = ad.base_url();
                    existing.host = ad.host.clone();
                    existing.port = ad.port;
                    summary.updated += 1;
                }
                None => {
                    info!(
                        instance_id = %id,
                        name = %ad.name,
                        "Discovered new service instance"
                    );
                    instances.insert(id, ServiceInstance::from_advertisement(ad, discovery_method));
                    summary.added += 1;
                }
            }
        }

        debug!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            total = instances.len(),
            "Reconciled advertisement set"
        );
        summary
    }

    /// Returns a cloned snapshot of every tracked instance
    pub async fn snapshot(&self) -> Vec<ServiceInstance> {
        let instances = self.instances.read().await;
        instances.values().cloned().collect()
    }

    /// Returns a cloned snapshot of the selectable instances
    ///
    /// Selectable means healthy with a non-Open circuit; instances on
    /// probation are included.
    pub async fn healthy_snapshot(&self) -> Vec<ServiceInstance> {
        let instances = self.instances.read().await;
        instances
            .values()
            .filter(|i| i.is_selectable())
            .cloned()
            .collect()
    }

    /// Looks up a single instance by id
    pub async fn get(&self, id: &str) -> Option<ServiceInstance> {
        let instances = self.instances.read().await;
        instances.get(id).cloned()
    }

    /// Returns the number of tracked instances
    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    /// Returns whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }

    /// Applies one probe outcome to its instance
    ///
    /// Returns the updated instance, or `None` when the id was removed
    /// between snapshot and apply (the outcome is then discarded).
    pub async fn apply_outcome(
        &self,
        outcome: &ProbeOutcome,
        config: &DiscoveryConfig,
    ) -> Option<ServiceInstance> {
        let mut instances = self.instances.write().await;
        let instance = match instances.get_mut(&outcome.instance_id) {
            Some(instance) => instance,
            None => {
                debug!(
                    instance_id = %outcome.instance_id,
                    "Discarding outcome for instance removed mid-probe"
                );
                return None;
            }
        };

        match &outcome.result {
            HealthCheckResult::Healthy => {
                instance.record_success(outcome.latency_ms, config);
            }
            HealthCheckResult::Unhealthy(_) | HealthCheckResult::Failed(_) => {
                instance.record_failure(config);
            }
        }
        Some(instance.clone())
    }

    /// Applies a batch of probe outcomes in one atomic pass
    ///
    /// Returns the updated instances in outcome order, skipping ids
    /// removed mid-probe.
    pub async fn apply_outcomes(
        &self,
        outcomes: &[ProbeOutcome],
        config: &DiscoveryConfig,
    ) -> Vec<ServiceInstance> {
        let mut instances = self.instances.write().await;
        let mut updated = Vec::with_capacity(outcomes.len());

        for outcome in outcomes {
            let instance = match instances.get_mut(&outcome.instance_id) {
                Some(instance) => instance,
                None => continue,
            };
            match &outcome.result {
                HealthCheckResult::Healthy => {
                    instance.record_success(outcome.latency_ms, config);
                }
                HealthCheckResult::Unhealthy(_) | HealthCheckResult::Failed(_) => {
                    instance.record_failure(config);
                }
            }
            updated.push(instance.clone());
        }
        updated
    }

    /// Moves every overdue Open circuit to probation
    ///
    /// Called at the start of each health cycle, before probes are
    /// issued, so the same cycle's probe can close a recovered circuit.
    /// Returns the promoted instance ids.
    pub async fn promote_recovered(&self, config: &DiscoveryConfig) -> Vec<String> {
        let mut instances = self.instances.write().await;
        let mut promoted = Vec::new();

        for instance in instances.values_mut() {
            if instance.recovery_due(config) {
                instance.begin_probation();
                promoted.push(instance.id.clone());
            }
        }
        promoted
    }

    /// Computes aggregate statistics over the current contents
    ///
    /// The latency average covers healthy instances only and is 0.0
    /// when none are healthy.
    pub async fn stats(&self) -> ServiceStats {
        let instances = self.instances.read().await;

        let total_instances = instances.len();
        let healthy: Vec<&ServiceInstance> =
            instances.values().filter(|i| i.is_healthy).collect();
        let circuit_open = instances
            .values()
            .filter(|i| i.circuit_state == CircuitState::Open)
            .count();
        let circuit_half_open = instances
            .values()
            .filter(|i| i.circuit_state == CircuitState::HalfOpen)
            .count();

        let avg_response_time_ms = if healthy.is_empty() {
            0.0
        } else {
            healthy.iter().map(|i| i.response_time_ms as f64).sum::<f64>() / healthy.len() as f64
        };

        ServiceStats {
            total_instances,
            healthy_instances: healthy.len(),
            circuit_open,
            circuit_half_open,
            avg_response_time_ms,
        }
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("instances", &"<RwLock<HashMap>>")
            .finish()
    }
}
