//! # Discovery Configuration
//!
//! Configuration for the discovery, health monitoring, and selection
//! subsystem. All parameters are validated before the subsystem starts.
//!
//! ## Configuration Sources (precedence order)
//!
//! 1. Command line arguments (highest priority)
//! 2. Environment variables (LANTERN_*)
//! 3. Compiled defaults (lowest priority)

use crate::error::{DiscoveryError, DiscoveryResult};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the discovery subsystem
///
/// The defaults are tuned for a LAN deployment where instances announce
/// themselves over multicast and serve an HTTP health endpoint. Every
/// field can be overridden; [`DiscoveryConfig::validate`] rejects
/// combinations that cannot work.
///
/// # Examples
///
/// ```rust
/// use lantern::DiscoveryConfig;
/// use std::time::Duration;
///
/// let mut config = DiscoveryConfig::default();
/// config.probe_interval = Duration::from_secs(10);
/// config.probe_timeout = Duration::from_secs(2);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Service label announcements must carry to be accepted
    ///
    /// **Default**: `lantern`
    /// **Environment**: `LANTERN_SERVICE_LABEL`
    ///
    /// Beacons advertising a different label are ignored, so multiple
    /// unrelated deployments can share a multicast group.
    pub service_label: String,

    /// Multicast group the beacon transport joins
    ///
    /// **Default**: `239.255.42.42`
    /// **Environment**: `LANTERN_MULTICAST_GROUP`
    pub multicast_group: Ipv4Addr,

    /// UDP port the beacon transport listens on
    ///
    /// **Default**: `9999`
    /// **Environment**: `LANTERN_MULTICAST_PORT`
    pub multicast_port: u16,

    /// Pause between successful discovery cycles
    ///
    /// **Default**: `60 seconds`
    pub discovery_interval: Duration,

    /// Pause before retrying a failed discovery cycle
    ///
    /// **Default**: `30 seconds`
    pub discovery_retry_interval: Duration,

    /// How long a single discovery cycle may listen for announcements
    ///
    /// **Default**: `10 seconds`
    /// **Validation**: Must not exceed `discovery_interval`
    pub discovery_timeout: Duration,

    /// Pause between successful health probe rounds
    ///
    /// **Default**: `30 seconds`
    pub probe_interval: Duration,

    /// Pause before retrying after a failed probe round
    ///
    /// **Default**: `10 seconds`
    pub probe_retry_interval: Duration,

    /// Deadline for a single health probe
    ///
    /// **Default**: `5 seconds`
    /// **Validation**: Must be shorter than `probe_interval`
    pub probe_timeout: Duration,

    /// Path of the health endpoint, joined onto each instance's base URL
    ///
    /// **Default**: `/health`
    pub health_path: String,

    /// Consecutive failures that open an instance's circuit
    ///
    /// **Default**: `3`
    /// **Validation**: Must be greater than zero
    pub failure_threshold: u32,

    /// How long an Open circuit waits before probation
    ///
    /// **Default**: `60 seconds`
    pub recovery_timeout: Duration,

    /// Multiplier applied to an instance's weight on a fast success
    ///
    /// **Default**: `1.1`
    /// **Validation**: Must be at least 1.0
    pub weight_growth: f64,

    /// Multiplier applied to an instance's weight on every failure
    ///
    /// **Default**: `0.9`
    /// **Validation**: Must be in `(0.0, 1.0]`
    pub weight_decay: f64,

    /// Upper bound on instance weights
    ///
    /// **Default**: `2.0`
    /// **Validation**: Must be greater than zero
    pub max_weight: f64,

    /// Latency below which a success grows the weight
    ///
    /// **Default**: `1 second`
    pub fast_response_threshold: Duration,

    /// Hostnames tried by the fallback ladder before sweeping the subnet
    ///
    /// **Default**: empty
    /// **Environment**: `LANTERN_WELL_KNOWN_HOSTS` (comma-separated)
    pub well_known_hosts: Vec<String>,

    /// Last-resort base URLs appended to the subnet sweep
    ///
    /// **Default**: empty
    /// **Environment**: `LANTERN_FALLBACK_URLS` (comma-separated)
    pub fallback_urls: Vec<String>,

    /// Port assumed for subnet sweep candidates
    ///
    /// **Default**: `8080`
    pub fallback_port: u16,

    /// Listen window for the ladder's short discovery probe
    ///
    /// **Default**: `3 seconds`
    pub fallback_discovery_timeout: Duration,

    /// Per-candidate probe deadline during the subnet sweep
    ///
    /// **Default**: `2 seconds`
    pub fallback_probe_timeout: Duration,

    /// Last-known-good URL cache location
    ///
    /// **Default**: `None` (a file under the user's cache directory)
    pub cache_path: Option<PathBuf>,

    /// Buffered event capacity per subscriber
    ///
    /// **Default**: `64`
    pub event_capacity: usize,
}

impl Default for DiscoveryConfig {
    /// Creates the default discovery configuration
    ///
    /// # Default Values
    ///
    /// - Discovery: 60s interval, 30s retry, 10s listen window
    /// - Health: 30s interval, 10s retry, 5s probe timeout, `/health`
    /// - Breaker: 3 failures to open, 60s recovery timeout
    /// - Weights: 1.1 growth under 1s latency, 0.9 decay, 2.0 cap
    /// - Transport: multicast `239.255.42.42:9999`, label `lantern`
    fn default() -> Self {
        Self {
            service_label: "lantern".to_string(),
            multicast_group: Ipv4Addr::new(239, 255, 42, 42),
            multicast_port: 9999,
            discovery_interval: Duration::from_secs(60),
            discovery_retry_interval: Duration::from_secs(30),
            discovery_timeout: Duration::from_secs(10),
            probe_interval: Duration::from_secs(30),
            probe_retry_interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            health_path: "/health".to_string(),
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            weight_growth: 1.1,
            weight_decay: 0.9,
            max_weight: 2.0,
            fast_response_threshold: Duration::from_secs(1),
            well_known_hosts: Vec::new(),
            fallback_urls: Vec::new(),
            fallback_port: 8080,
            fallback_discovery_timeout: Duration::from_secs(3),
            fallback_probe_timeout: Duration::from_secs(2),
            cache_path: None,
            event_capacity: 64,
        }
    }
}

impl DiscoveryConfig {
    /// Validates the configuration
    ///
    /// # Validation Rules
    ///
    /// 1. Intervals and timeouts must be non-zero
    /// 2. `probe_timeout` must be shorter than `probe_interval`
    /// 3. `discovery_timeout` must not exceed `discovery_interval`
    /// 4. `failure_threshold` must be greater than zero
    /// 5. `weight_decay` in `(0.0, 1.0]`, `weight_growth >= 1.0`,
    ///    `max_weight > 0.0`
    /// 6. `service_label` must be non-empty, ports non-zero
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` if all rules pass, or a configuration error
    /// naming the first violated rule.
    pub fn validate(&self) -> DiscoveryResult<()> {
        if self.service_label.trim().is_empty() {
            return Err(DiscoveryError::configuration(
                "service_label must not be empty",
                None,
            ));
        }

        if self.multicast_port == 0 || self.fallback_port == 0 {
            return Err(DiscoveryError::configuration(
                "multicast_port and fallback_port must be non-zero",
                None,
            ));
        }

        for (name, value) in [
            ("discovery_interval", self.discovery_interval),
            ("discovery_retry_interval", self.discovery_retry_interval),
            ("discovery_timeout", self.discovery_timeout),
            ("probe_interval", self.probe_interval),
            ("probe_retry_interval", self.probe_retry_interval),
            ("probe_timeout", self.probe_timeout),
            ("recovery_timeout", self.recovery_timeout),
            ("fallback_discovery_timeout", self.fallback_discovery_timeout),
            ("fallback_probe_timeout", self.fallback_probe_timeout),
        ] {
            if value.is_zero() {
                return Err(DiscoveryError::configuration(
                    format!("{} must be non-zero", name),
                    None,
                ));
            }
        }

        if self.probe_timeout >= self.probe_interval {
            return Err(DiscoveryError::configuration(
                format!(
                    "probe_timeout ({:?}) must be shorter than probe_interval ({:?})",
                    self.probe_timeout, self.probe_interval
                ),
                None,
            ));
        }

        if self.discovery_timeout > self.discovery_interval {
            return Err(DiscoveryError::configuration(
                format!(
                    "discovery_timeout ({:?}) must not exceed discovery_interval ({:?})",
                    self.discovery_timeout, self.discovery_interval
                ),
                None,
            ));
        }

        if self.failure_threshold == 0 {
            return Err(DiscoveryError::configuration(
                "failure_threshold must be greater than zero",
                None,
            ));
        }

        if self.weight_decay <= 0.0 || self.weight_decay > 1.0 {
            return Err(DiscoveryError::configuration(
                format!("weight_decay must be in (0.0, 1.0], got {}", self.weight_decay),
                None,
            ));
        }

        if self.weight_growth < 1.0 {
            return Err(DiscoveryError::configuration(
                format!("weight_growth must be at least 1.0, got {}", self.weight_growth),
                None,
            ));
        }

        if self.max_weight <= 0.0 || !self.max_weight.is_finite() {
            return Err(DiscoveryError::configuration(
                format!("max_weight must be positive and finite, got {}", self.max_weight),
                None,
            ));
        }

        if self.event_capacity == 0 {
            return Err(DiscoveryError::configuration(
                "event_capacity must be greater than zero",
                None,
            ));
        }

        Ok(())
    }
}
