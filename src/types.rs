//! Core data structures for service discovery
//!
//! This module contains the fundamental data types used throughout the
//! discovery subsystem: advertisements received from the network, the
//! tracked per-instance record, circuit breaker states, and aggregate
//! statistics.

use crate::error::{DiscoveryError, DiscoveryResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Serde module for SystemTime serialization
pub(crate) mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_secs(secs))
    }

    /// Variant for `Option<SystemTime>` fields
    pub mod optional {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};
        use std::time::{Duration, SystemTime, UNIX_EPOCH};

        pub fn serialize<S>(
            time: &Option<SystemTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match time {
                Some(t) => {
                    let duration = t
                        .duration_since(UNIX_EPOCH)
                        .map_err(serde::ser::Error::custom)?;
                    Some(duration.as_secs()).serialize(serializer)
                }
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SystemTime>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let secs = Option::<u64>::deserialize(deserializer)?;
            Ok(secs.map(|s| UNIX_EPOCH + Duration::from_secs(s)))
        }
    }
}

/// Circuit breaker states for a tracked service instance
///
/// Each instance carries its own independent breaker:
/// - **Closed**: Normal operation, instance eligible for selection
/// - **Open**: Too many consecutive failures, instance excluded from
///   selection until the recovery timeout elapses
/// - **HalfOpen**: Probation after the recovery timeout; one success
///   closes the circuit, one more failure reopens it
///
/// # Serialization
///
/// Serialized as snake_case strings in JSON so the states read naturally
/// in event payloads and logs.
///
/// # Examples
///
/// ```rust
/// use lantern::CircuitState;
/// use serde_json;
///
/// let state = CircuitState::HalfOpen;
/// let json = serde_json::to_string(&state).unwrap();
/// assert_eq!(json, "\"half_open\"");
///
/// let parsed: CircuitState = serde_json::from_str("\"open\"").unwrap();
/// assert_eq!(parsed, CircuitState::Open);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, failures below the threshold
    #[default]
    Closed,

    /// Failure threshold reached, instance excluded from selection
    Open,

    /// Probation window after the recovery timeout
    ///
    /// A success closes the circuit; any further failure reopens it.
    /// Probation does not by itself restore the health flag, so the
    /// instance stays out of selection until a success is observed.
    HalfOpen,
}

impl CircuitState {
    /// Returns the string representation used in logs and events
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lantern::CircuitState;
    ///
    /// assert_eq!(CircuitState::Closed.as_str(), "closed");
    /// assert_eq!(CircuitState::HalfOpen.as_str(), "half_open");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single service announcement observed by a discovery transport
///
/// Advertisements are the raw input to registry reconciliation. They carry
/// only connection information; all health and scoring state lives in the
/// [`ServiceInstance`] the registry derives from them.
///
/// # Examples
///
/// ```rust
/// use lantern::Advertisement;
///
/// let ad = Advertisement::new("attendance-server", "192.168.1.42", 8080);
/// assert_eq!(ad.instance_id(), "192.168.1.42:8080");
/// assert_eq!(ad.base_url(), "http://192.168.1.42:8080");
/// assert!(ad.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Advertisement {
    /// Human-readable service name from the announcement
    pub name: String,

    /// Host address (IP or hostname) the instance serves on
    pub host: String,

    /// TCP port the instance serves on
    pub port: u16,
}

impl Advertisement {
    /// Creates an advertisement from its parts
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    /// Returns the registry identity for this advertisement
    ///
    /// Identity is the `host:port` endpoint. Two announcements with
    /// different names but the same endpoint are the same instance.
    pub fn instance_id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the HTTP base URL for this advertisement
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Validates the advertisement before it may enter the registry
    ///
    /// Rejects empty names, empty or malformed hosts, and port zero.
    /// Rejected advertisements are dropped with a warning; they never
    /// poison a discovery cycle.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lantern::Advertisement;
    ///
    /// assert!(Advertisement::new("svc", "10.0.0.5", 8080).validate().is_ok());
    /// assert!(Advertisement::new("svc", "", 8080).validate().is_err());
    /// assert!(Advertisement::new("svc", "10.0.0.5", 0).validate().is_err());
    /// ```
    pub fn validate(&self) -> DiscoveryResult<()> {
        if self.name.trim().is_empty() {
            return Err(DiscoveryError::protocol("advertisement with empty name"));
        }
        if self.host.trim().is_empty() {
            return Err(DiscoveryError::protocol("advertisement with empty host"));
        }
        if self.host.contains("://") || self.host.chars().any(char::is_whitespace) {
            return Err(DiscoveryError::protocol(format!(
                "advertisement with malformed host: {}",
                self.host
            )));
        }
        if self.port == 0 {
            return Err(DiscoveryError::protocol("advertisement with port 0"));
        }
        Ok(())
    }
}

/// Metadata key holding the advertised service name
pub const META_NAME: &str = "name";

/// Metadata key holding the first-discovery timestamp (epoch millis, string)
pub const META_DISCOVERED_AT: &str = "discovered_at";

/// Metadata key holding the transport that discovered the instance
pub const META_DISCOVERY_METHOD: &str = "discovery_method";

/// A tracked backend service instance
///
/// The registry's unit of state. Connection fields (`base_url`, `host`,
/// `port`) are overwritten on re-discovery; the adaptive fields (`weight`,
/// `failure_count`, `circuit_state`) survive re-discovery and change only
/// through the breaker rules.
///
/// # Weight Semantics
///
/// `weight` starts at 1.0 and moves multiplicatively: decayed on every
/// failure, grown on fast successes, capped at the configured maximum.
/// It is always in `(0.0, max]` and is only consumed by weighted-random
/// selection.
///
/// # Examples
///
/// ```rust
/// use lantern::{Advertisement, CircuitState, ServiceInstance};
///
/// let ad = Advertisement::new("attendance-server", "192.168.1.42", 8080);
/// let instance = ServiceInstance::from_advertisement(&ad, "multicast");
///
/// assert_eq!(instance.id, "192.168.1.42:8080");
/// assert_eq!(instance.base_url, "http://192.168.1.42:8080");
/// assert_eq!(instance.weight, 1.0);
/// assert!(instance.is_healthy);
/// assert_eq!(instance.circuit_state, CircuitState::Closed);
/// assert_eq!(instance.metadata.get("name").map(String::as_str), Some("attendance-server"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Unique instance identity, `host:port`
    pub id: String,

    /// HTTP base URL requests and probes are issued against
    pub base_url: String,

    /// Host address portion of the endpoint
    pub host: String,

    /// Port portion of the endpoint
    pub port: u16,

    /// Adaptive selection weight, `0 < weight <= max_weight`
    pub weight: f64,

    /// Latency of the most recent successful probe in milliseconds
    ///
    /// Failures do not overwrite this; it always reflects the last time
    /// the instance actually answered.
    pub response_time_ms: u64,

    /// When the instance was last probed (success or failure)
    ///
    /// `UNIX_EPOCH` until the first probe completes.
    #[serde(with = "system_time_serde")]
    pub last_health_check_at: SystemTime,

    /// Result of the most recent probe
    ///
    /// New instances start healthy so they are selectable in the window
    /// between discovery and their first probe.
    pub is_healthy: bool,

    /// Consecutive failures since the last success
    pub failure_count: u32,

    /// Current circuit breaker state
    pub circuit_state: CircuitState,

    /// When the instance last failed, if it ever has
    ///
    /// Drives the recovery timeout for Open circuits.
    #[serde(with = "system_time_serde::optional")]
    pub last_failure_at: Option<SystemTime>,

    /// Free-form descriptive attributes
    ///
    /// Populated at discovery time with [`META_NAME`],
    /// [`META_DISCOVERED_AT`], and [`META_DISCOVERY_METHOD`].
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    /// Builds a fresh instance record from an advertisement
    ///
    /// # Arguments
    ///
    /// * `ad` - Validated advertisement carrying the endpoint
    /// * `discovery_method` - Name of the transport that produced it
    pub fn from_advertisement(ad: &Advertisement, discovery_method: &str) -> Self {
        let discovered_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis().to_string())
            .unwrap_or_else(|_| "0".to_string());

        let mut metadata = HashMap::new();
        metadata.insert(META_NAME.to_string(), ad.name.clone());
        metadata.insert(META_DISCOVERED_AT.to_string(), discovered_at);
        metadata.insert(META_DISCOVERY_METHOD.to_string(), discovery_method.to_string());

        Self {
            id: ad.instance_id(),
            base_url: ad.base_url(),
            host: ad.host.clone(),
            port: ad.port,
            weight: 1.0,
            response_time_ms: 0,
            last_health_check_at: UNIX_EPOCH,
            is_healthy: true,
            failure_count: 0,
            circuit_state: CircuitState::Closed,
            last_failure_at: None,
            metadata,
        }
    }

    /// Returns whether the selector may pick this instance
    ///
    /// Selectable means healthy with a non-Open circuit. A HalfOpen
    /// circuit alone does not exclude an instance; the health flag and
    /// an Open circuit do.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lantern::{Advertisement, CircuitState, ServiceInstance};
    ///
    /// let ad = Advertisement::new("svc", "10.0.0.5", 8080);
    /// let mut instance = ServiceInstance::from_advertisement(&ad, "static");
    /// assert!(instance.is_selectable());
    ///
    /// instance.circuit_state = CircuitState::Open;
    /// assert!(!instance.is_selectable());
    ///
    /// instance.circuit_state = CircuitState::HalfOpen;
    /// assert!(instance.is_selectable());
    /// ```
    pub fn is_selectable(&self) -> bool {
        self.is_healthy && self.circuit_state != CircuitState::Open
    }

    /// Returns the advertised name, falling back to the instance id
    pub fn display_name(&self) -> &str {
        self.metadata
            .get(META_NAME)
            .map(String::as_str)
            .unwrap_or(&self.id)
    }
}

/// Aggregate statistics over the current registry contents
///
/// Snapshot values for dashboards and logs; computing them never blocks
/// the discovery or health loops.
///
/// # Examples
///
/// ```rust
/// use lantern::ServiceStats;
///
/// let stats = ServiceStats::default();
/// assert_eq!(stats.total_instances, 0);
/// assert_eq!(stats.avg_response_time_ms, 0.0);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Number of tracked instances
    pub total_instances: usize,

    /// Number of instances whose last probe succeeded
    pub healthy_instances: usize,

    /// Number of instances with an Open circuit
    pub circuit_open: usize,

    /// Number of instances on probation
    pub circuit_half_open: usize,

    /// Mean `response_time_ms` across healthy instances, 0.0 when none
    pub avg_response_time_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_state_serde_roundtrip() {
        for state in [CircuitState::Closed, CircuitState::Open, CircuitState::HalfOpen] {
            let json = serde_json::to_string(&state).unwrap();
            let parsed: CircuitState = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, state);
        }
        assert_eq!(
            serde_json::to_string(&CircuitState::HalfOpen).unwrap(),
            "\"half_open\""
        );
    }

    #[test]
    fn test_advertisement_validation() {
        assert!(Advertisement::new("svc", "192.168.1.5", 8080).validate().is_ok());
        assert!(Advertisement::new("svc", "server.local", 9000).validate().is_ok());
        assert!(Advertisement::new("", "192.168.1.5", 8080).validate().is_err());
        assert!(Advertisement::new("svc", "", 8080).validate().is_err());
        assert!(Advertisement::new("svc", "http://h", 8080).validate().is_err());
        assert!(Advertisement::new("svc", "bad host", 8080).validate().is_err());
        assert!(Advertisement::new("svc", "192.168.1.5", 0).validate().is_err());
    }

    #[test]
    fn test_instance_defaults() {
        let ad = Advertisement::new("attendance-server", "10.1.2.3", 8080);
        let instance = ServiceInstance::from_advertisement(&ad, "multicast");

        assert_eq!(instance.id, "10.1.2.3:8080");
        assert_eq!(instance.base_url, "http://10.1.2.3:8080");
        assert_eq!(instance.weight, 1.0);
        assert_eq!(instance.response_time_ms, 0);
        assert_eq!(instance.last_health_check_at, UNIX_EPOCH);
        assert!(instance.is_healthy);
        assert_eq!(instance.failure_count, 0);
        assert_eq!(instance.circuit_state, CircuitState::Closed);
        assert_eq!(instance.last_failure_at, None);
        assert_eq!(instance.display_name(), "attendance-server");
        assert_eq!(
            instance.metadata.get(META_DISCOVERY_METHOD).map(String::as_str),
            Some("multicast")
        );
        assert!(instance.metadata.contains_key(META_DISCOVERED_AT));
    }

    #[test]
    fn test_instance_serde_roundtrip() {
        let ad = Advertisement::new("svc", "10.1.2.3", 8080);
        let mut instance = ServiceInstance::from_advertisement(&ad, "static");
        instance.last_failure_at = Some(SystemTime::now());
        instance.failure_count = 2;

        let json = serde_json::to_string(&instance).unwrap();
        let parsed: ServiceInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, instance.id);
        assert_eq!(parsed.failure_count, 2);
        assert!(parsed.last_failure_at.is_some());
    }

    #[test]
    fn test_selectability() {
        let ad = Advertisement::new("svc", "10.1.2.3", 8080);
        let mut instance = ServiceInstance::from_advertisement(&ad, "static");
        assert!(instance.is_selectable());

        instance.is_healthy = false;
        assert!(!instance.is_selectable());

        instance.is_healthy = true;
        instance.circuit_state = CircuitState::Open;
        assert!(!instance.is_selectable());

        instance.circuit_state = CircuitState::HalfOpen;
        assert!(instance.is_selectable());
    }
}
