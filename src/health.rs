//! Health checking for discovered service instances
//!
//! This module provides the probe primitives used by the health monitor
//! and the fallback ladder: the probe result type, the checker trait for
//! injectable implementations, and the HTTP checker that validates the
//! liveness marker.

use crate::error::DiscoveryResult;
use crate::types::ServiceInstance;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Literal marker a health response body must contain to count as live
pub const HEALTH_MARKER: &str = "healthy";

/// Health check result for individual instances
///
/// This enum represents the possible outcomes of a single probe against
/// an instance's health endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthCheckResult {
    /// Instance answered with a success status and the liveness marker
    Healthy,

    /// Instance answered, but the response does not prove liveness
    Unhealthy(String),

    /// Probe failed due to a network or protocol error
    Failed(String),
}

impl HealthCheckResult {
    /// Returns whether this result indicates a live instance
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lantern::HealthCheckResult;
    ///
    /// assert!(HealthCheckResult::Healthy.is_healthy());
    /// assert!(!HealthCheckResult::Unhealthy("HTTP 503".to_string()).is_healthy());
    /// assert!(!HealthCheckResult::Failed("timeout".to_string()).is_healthy());
    /// ```
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Returns the error message if the result is not healthy
    ///
    /// # Returns
    ///
    /// Returns `None` for healthy results, `Some(message)` for unhealthy
    /// or failed results.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lantern::HealthCheckResult;
    ///
    /// assert_eq!(HealthCheckResult::Healthy.error_message(), None);
    /// assert_eq!(
    ///     HealthCheckResult::Failed("timeout".to_string()).error_message(),
    ///     Some("timeout")
    /// );
    /// ```
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Healthy => None,
            Self::Unhealthy(msg) | Self::Failed(msg) => Some(msg),
        }
    }
}

/// One instance's probe result, paired with the measured latency
///
/// Produced by the health monitor and consumed by the registry in a
/// single atomic application pass. `latency_ms` is meaningful only for
/// healthy results.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    /// Registry id of the probed instance
    pub instance_id: String,
    /// What the probe observed
    pub result: HealthCheckResult,
    /// Round-trip time of the probe in milliseconds
    pub latency_ms: u64,
}

/// Joins a health path onto a base URL, tolerating trailing slashes
///
/// # Examples
///
/// ```rust
/// use lantern::health::join_url;
///
/// assert_eq!(join_url("http://10.0.0.5:8080", "/health"), "http://10.0.0.5:8080/health");
/// assert_eq!(join_url("http://10.0.0.5:8080/", "/health"), "http://10.0.0.5:8080/health");
/// assert_eq!(join_url("http://10.0.0.5:8080", "health"), "http://10.0.0.5:8080/health");
/// ```
pub fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Trait for health checking implementations
///
/// This trait defines the interface for different health checking
/// strategies, and allows tests and embedders to inject mock checkers.
/// The URL form exists because the fallback ladder probes candidate
/// addresses that are not (yet) registry instances.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Probes an arbitrary base URL for liveness
    ///
    /// # Arguments
    ///
    /// * `base_url` - HTTP base URL of the candidate, without the health path
    ///
    /// # Returns
    ///
    /// Returns the probe result. Network failures are a result variant,
    /// not an error: an `Err` means the checker itself could not run.
    async fn check_url(&self, base_url: &str) -> DiscoveryResult<HealthCheckResult>;

    /// Probes a registered instance for liveness
    async fn check_health(&self, instance: &ServiceInstance) -> DiscoveryResult<HealthCheckResult> {
        self.check_url(&instance.base_url).await
    }

    /// Returns the name of this health checker implementation
    fn name(&self) -> &'static str;
}

/// HTTP-based health checker implementation
///
/// Performs health checks by issuing HTTP GET requests to each
/// instance's health endpoint. A probe is healthy only when the response
/// has a success status and the body contains [`HEALTH_MARKER`]; a
/// success status with no marker is reported as unhealthy.
#[derive(Debug, Clone)]
pub struct HttpHealthChecker {
    client: Client,
    timeout: Duration,
    health_path: String,
}

impl HttpHealthChecker {
    /// Creates a new HTTP health checker
    ///
    /// # Arguments
    ///
    /// * `timeout` - Deadline for each probe request
    /// * `health_path` - Endpoint path joined onto instance base URLs
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lantern::{HealthChecker, HttpHealthChecker};
    /// use std::time::Duration;
    ///
    /// let checker = HttpHealthChecker::new(Duration::from_secs(5), "/health");
    /// assert_eq!(checker.name(), "http");
    /// ```
    pub fn new(timeout: Duration, health_path: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            timeout,
            health_path: health_path.into(),
        }
    }

    /// Returns a copy of this checker with a different probe deadline
    ///
    /// The fallback ladder uses this for its faster sweep probes while
    /// sharing the underlying connection pool.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            client: self.client.clone(),
            timeout,
            health_path: self.health_path.clone(),
        }
    }
}

#[async_trait]
impl HealthChecker for HttpHealthChecker {
    async fn check_url(&self, base_url: &str) -> DiscoveryResult<HealthCheckResult> {
        let url = join_url(base_url, &self.health_path);

        debug!("Performing health check at {}", url);

        match tokio::time::timeout(self.timeout, self.client.get(&url).send()).await {
            Ok(Ok(response)) => {
                let status = response.status();
                if !status.is_success() {
                    return Ok(HealthCheckResult::Unhealthy(format!("HTTP {}", status)));
                }
                match response.text().await {
                    Ok(body) if body.contains(HEALTH_MARKER) => Ok(HealthCheckResult::Healthy),
                    Ok(_) => Ok(HealthCheckResult::Unhealthy(
                        "liveness marker missing from response".to_string(),
                    )),
                    Err(e) => Ok(HealthCheckResult::Failed(format!(
                        "Failed to read response body: {}",
                        e
                    ))),
                }
            }
            Ok(Err(e)) => {
                debug!("Health check request failed for {}: {}", url, e);
                Ok(HealthCheckResult::Failed(format!("Request failed: {}", e)))
            }
            Err(_) => {
                debug!("Health check timeout for {}", url);
                Ok(HealthCheckResult::Failed("Request timeout".to_string()))
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
