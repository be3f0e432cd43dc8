//! Cold-start URL acquisition
//!
//! Walks an ordered ladder of increasingly desperate sources for a live
//! base URL: the persisted cache, well-known hostnames, hostname
//! resolution, a short discovery probe, and finally a sweep of likely
//! addresses on the local subnet plus the configured static fallbacks.
//! The first candidate that passes a health probe wins and is written
//! back to the cache.
//!
//! Every rung verifies liveness before answering; the ladder never
//! returns an unprobed guess. Exhausting every rung is reported as
//! unavailability, not as a fabricated default.

use crate::cache::UrlCache;
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::health::{HealthChecker, HttpHealthChecker};
use crate::transport::DiscoveryTransport;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Last octets tried first during a subnet sweep
const SWEEP_PRIORITY_OCTETS: [u8; 8] = [1, 100, 101, 10, 2, 3, 4, 5];

/// Inclusive range of additional last octets swept after the priority set
const SWEEP_RANGE: std::ops::RangeInclusive<u8> = 20..=50;

/// Maximum candidate probes in flight at once during the sweep
const SWEEP_CONCURRENCY: usize = 16;

/// Builds the ordered candidate URLs for a /24 subnet sweep
///
/// Takes the device's own address, keeps its first three octets, and
/// substitutes the priority octets, the sweep range, and finally the
/// device's own last octet. Duplicates are removed while preserving
/// first-occurrence order.
pub(crate) fn subnet_candidates(local: Ipv4Addr, port: u16) -> Vec<String> {
    let [a, b, c, own] = local.octets();

    let mut octets: Vec<u8> = SWEEP_PRIORITY_OCTETS.to_vec();
    octets.extend(SWEEP_RANGE);
    octets.push(own);

    let mut seen = HashSet::new();
    octets
        .into_iter()
        .filter(|octet| seen.insert(*octet))
        .map(|octet| format!("http://{a}.{b}.{c}.{octet}:{port}"))
        .collect()
}

/// Determines the device's own IPv4 address on the active route
///
/// Uses a connected UDP socket to let the OS pick the outbound
/// interface; no packet is sent. Returns `None` when no usable
/// non-loopback address exists, in which case the subnet sweep is
/// skipped.
async fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect("8.8.8.8:80").await.ok()?;
    match socket.local_addr().ok()? {
        SocketAddr::V4(addr) if !addr.ip().is_loopback() && !addr.ip().is_unspecified() => {
            Some(*addr.ip())
        }
        _ => None,
    }
}

/// Ordered cold-start acquisition of a live base URL
///
/// # Examples
///
/// ```rust
/// use lantern::{DiscoveryConfig, UrlAcquirer, UrlCache};
/// use lantern::transport::StaticDiscovery;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), lantern::DiscoveryError> {
/// let config = DiscoveryConfig::default();
/// let transport = Arc::new(StaticDiscovery::new(Vec::new()));
/// let cache = UrlCache::from_config(&config);
/// let acquirer = UrlAcquirer::new(transport, &config, cache);
/// let base_url = acquirer.acquire().await?;
/// println!("Serving from {}", base_url);
/// # Ok(())
/// # }
/// ```
pub struct UrlAcquirer {
    transport: Arc<dyn DiscoveryTransport>,
    checker: HttpHealthChecker,
    cache: UrlCache,
    config: DiscoveryConfig,
}

impl UrlAcquirer {
    /// Creates an acquirer probing with the fast fallback timeout
    pub fn new(
        transport: Arc<dyn DiscoveryTransport>,
        config: &DiscoveryConfig,
        cache: UrlCache,
    ) -> Self {
        let checker =
            HttpHealthChecker::new(config.fallback_probe_timeout, config.health_path.clone());
        Self {
            transport,
            checker,
            cache,
            config: config.clone(),
        }
    }

    /// Creates an acquirer that shares an existing checker's HTTP client
    pub fn with_checker(
        transport: Arc<dyn DiscoveryTransport>,
        checker: &HttpHealthChecker,
        config: &DiscoveryConfig,
        cache: UrlCache,
    ) -> Self {
        Self {
            transport,
            checker: checker.with_timeout(config.fallback_probe_timeout),
            cache,
            config: config.clone(),
        }
    }

    /// Walks the acquisition ladder and returns the first live base URL
    ///
    /// Order: cached URL, well-known hostnames, resolved hostname IPs, a
    /// short discovery probe, then the subnet sweep plus static fallback
    /// URLs. A winning URL is cached before returning. Exhausting every
    /// rung yields [`DiscoveryError::NoInstanceAvailable`].
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> DiscoveryResult<String> {
        if let Some(cached) = self.cache.get().await {
            if self.verify(&cached).await {
                info!(url = %cached, "Using cached server URL");
                return Ok(cached);
            }
            warn!(url = %cached, "Cached server URL is no longer live, clearing");
            if let Err(e) = self.cache.clear().await {
                warn!(error = %e, "Failed to clear stale cache entry");
            }
        }

        for host in &self.config.well_known_hosts {
            let url = format!("http://{}:{}", host, self.config.fallback_port);
            debug!(url = %url, "Trying well-known hostname");
            if self.verify(&url).await {
                return self.accept(url).await;
            }
        }

        for host in &self.config.well_known_hosts {
            match tokio::net::lookup_host((host.as_str(), self.config.fallback_port)).await {
                Ok(addrs) => {
                    for addr in addrs.filter(|addr| addr.is_ipv4()) {
                        let url = format!("http://{}:{}", addr.ip(), self.config.fallback_port);
                        debug!(host = %host, url = %url, "Trying resolved address");
                        if self.verify(&url).await {
                            return self.accept(url).await;
                        }
                    }
                }
                Err(e) => debug!(host = %host, error = %e, "Hostname resolution failed"),
            }
        }

        match self
            .transport
            .discover(self.config.fallback_discovery_timeout)
            .await
        {
            Ok(advertisements) => {
                for advertisement in advertisements {
                    let url = advertisement.base_url();
                    debug!(url = %url, "Trying discovered advertisement");
                    if self.verify(&url).await {
                        return self.accept(url).await;
                    }
                }
            }
            Err(e) => warn!(error = %e, "Short discovery probe failed"),
        }

        let mut candidates: Vec<String> = Vec::new();
        match local_ipv4().await {
            Some(local) => {
                candidates.extend(subnet_candidates(local, self.config.fallback_port));
            }
            None => debug!("No local address available, skipping subnet sweep"),
        }
        candidates.extend(self.config.fallback_urls.iter().cloned());

        let mut seen = HashSet::new();
        candidates.retain(|url| seen.insert(url.clone()));

        info!(
            candidate_count = candidates.len(),
            "Sweeping fallback candidates"
        );

        // Probes overlap, but results arrive in candidate order so the
        // first live URL is still deterministic.
        let mut probes = stream::iter(candidates.into_iter().map(|url| async move {
            let live = self.verify(&url).await;
            (url, live)
        }))
        .buffered(SWEEP_CONCURRENCY);

        while let Some((url, live)) = probes.next().await {
            if live {
                drop(probes);
                return self.accept(url).await;
            }
        }

        Err(DiscoveryError::no_instance_available(
            "every acquisition source was exhausted without finding a live server",
        ))
    }

    /// Probes a candidate and reports whether it is serving
    async fn verify(&self, base_url: &str) -> bool {
        match self.checker.check_url(base_url).await {
            Ok(result) if result.is_healthy() => true,
            Ok(result) => {
                debug!(
                    url = %base_url,
                    reason = result.error_message().unwrap_or("not healthy"),
                    "Candidate failed verification"
                );
                false
            }
            Err(e) => {
                debug!(url = %base_url, error = %e, "Candidate probe error");
                false
            }
        }
    }

    /// Records a verified winner in the cache and returns it
    async fn accept(&self, url: String) -> DiscoveryResult<String> {
        info!(url = %url, "Acquired live server URL");
        if let Err(e) = self.cache.set(&url).await {
            warn!(error = %e, "Failed to cache acquired URL");
        }
        Ok(url)
    }
}

impl std::fmt::Debug for UrlAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlAcquirer")
            .field("transport", &self.transport.name())
            .field("cache", &self.cache)
            .finish()
    }
}
