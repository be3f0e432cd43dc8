//! # Instance Selection
//!
//! Weighted-random choice among the selectable instances. Every
//! selectable instance keeps receiving a share of traffic proportional
//! to its adaptive weight; no instance is starved while its weight is
//! positive.

use crate::registry::ServiceRegistry;
use crate::types::ServiceInstance;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, warn};

/// Picks one instance from a selectable snapshot by weight
///
/// Draws `r` uniformly from `[0, total_weight)` and walks the slice
/// subtracting weights; the instance that drives the remainder to zero
/// wins. When the total weight is not positive (all weights decayed
/// away) the choice degrades to uniform random.
///
/// Returns `None` only for an empty slice. Never mutates anything.
pub fn select_weighted(candidates: &[ServiceInstance]) -> Option<&ServiceInstance> {
    if candidates.is_empty() {
        return None;
    }

    let total: f64 = candidates.iter().map(|i| i.weight).sum();
    let mut rng = rand::thread_rng();

    if total <= 0.0 {
        return candidates.get(rng.gen_range(0..candidates.len()));
    }

    let mut remaining = rng.gen_range(0.0..total);
    for instance in candidates {
        remaining -= instance.weight;
        if remaining <= 0.0 {
            return Some(instance);
        }
    }
    // Floating point accumulation can leave a sliver of remainder.
    candidates.first()
}

/// Health-aware selector over the shared registry
///
/// # Examples
///
/// ```rust
/// use lantern::{InstanceSelector, ServiceRegistry};
/// use std::sync::Arc;
///
/// # async fn example() {
/// let registry = Arc::new(ServiceRegistry::new());
/// let selector = InstanceSelector::new(registry);
/// assert!(selector.pick().await.is_none());
/// # }
/// ```
#[derive(Debug)]
pub struct InstanceSelector {
    registry: Arc<ServiceRegistry>,
}

impl InstanceSelector {
    /// Creates a selector reading from the given registry
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the instance to use for the next request
    ///
    /// Filters the registry to healthy instances with non-Open circuits
    /// and draws by weight. Returns `None` when nothing is selectable;
    /// callers then fall back to the acquisition ladder or surface an
    /// unavailability error.
    pub async fn pick(&self) -> Option<ServiceInstance> {
        let candidates = self.registry.healthy_snapshot().await;
        if candidates.is_empty() {
            warn!("No healthy service instances available for selection");
            return None;
        }

        let chosen = select_weighted(&candidates).cloned();
        if let Some(instance) = &chosen {
            debug!(
                instance_id = %instance.id,
                weight = instance.weight,
                candidates = candidates.len(),
                "Selected instance"
            );
        }
        chosen
    }
}
