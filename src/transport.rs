//! Discovery transports
//!
//! A transport turns "listen on the network for a while" into a list of
//! validated [`Advertisement`]s. The default transport listens for JSON
//! beacons on a UDP multicast group; a static transport serves
//! config-driven deployments and tests.

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::types::Advertisement;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Trait for discovery transport implementations
///
/// Implementations collect the full advertisement set visible during one
/// bounded listen window. Returning an empty set is a valid answer, not
/// an error.
#[async_trait]
pub trait DiscoveryTransport: Send + Sync {
    /// Collects advertisements until `timeout` elapses
    ///
    /// # Arguments
    ///
    /// * `timeout` - Upper bound on how long the transport may listen
    ///
    /// # Returns
    ///
    /// Returns the de-duplicated advertisements observed in the window.
    async fn discover(&self, timeout: Duration) -> DiscoveryResult<Vec<Advertisement>>;

    /// Returns the name of this transport implementation
    fn name(&self) -> &'static str;
}

/// Wire format of a service announcement beacon
///
/// Instances broadcast these as JSON datagrams. `host` is optional: when
/// absent, the datagram's source address is used, which is the common
/// case for servers that do not know their own externally visible
/// address.
///
/// # Examples
///
/// ```rust
/// use lantern::transport::BeaconMessage;
///
/// let json = r#"{"service":"lantern","name":"attendance-server","port":8080}"#;
/// let beacon: BeaconMessage = serde_json::from_str(json).unwrap();
/// assert_eq!(beacon.service, "lantern");
/// assert_eq!(beacon.host, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconMessage {
    /// Deployment label; beacons with a foreign label are ignored
    pub service: String,
    /// Human-readable instance name
    pub name: String,
    /// TCP port the instance serves on
    pub port: u16,
    /// Host override; defaults to the datagram source address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// UDP multicast beacon transport
///
/// Joins a multicast group and collects beacons for the duration of each
/// discovery window. When the group join fails (some VPNs and container
/// networks refuse membership) the socket still listens for plain UDP
/// datagrams on the same port, so directed announcements keep working.
pub struct MulticastDiscovery {
    group: Ipv4Addr,
    port: u16,
    service_label: String,
}

impl MulticastDiscovery {
    /// Creates a transport for the given group, port, and service label
    pub fn new(group: Ipv4Addr, port: u16, service_label: impl Into<String>) -> Self {
        Self {
            group,
            port,
            service_label: service_label.into(),
        }
    }

    /// Creates a transport from the discovery configuration
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(
            config.multicast_group,
            config.multicast_port,
            config.service_label.clone(),
        )
    }

    /// Broadcasts one announcement beacon for this service label
    ///
    /// Used by server-side embedders to make an instance discoverable,
    /// and by tests to inject announcements.
    ///
    /// # Arguments
    ///
    /// * `name` - Human-readable instance name
    /// * `port` - TCP port the instance serves on
    /// * `host` - Optional host override for multi-homed servers
    pub async fn announce(
        &self,
        name: &str,
        port: u16,
        host: Option<&str>,
    ) -> DiscoveryResult<()> {
        let beacon = BeaconMessage {
            service: self.service_label.clone(),
            name: name.to_string(),
            port,
            host: host.map(str::to_string),
        };
        let payload = serde_json::to_vec(&beacon)?;

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| {
                DiscoveryError::transport("0.0.0.0:0", "Failed to bind announce socket", Some(Box::new(e)))
            })?;
        // Listeners on this host must receive the beacon too.
        let _ = socket.set_multicast_loop_v4(true);

        let target = SocketAddr::from((self.group, self.port));
        socket.send_to(&payload, target).await.map_err(|e| {
            DiscoveryError::transport(
                target.to_string(),
                "Failed to send announcement beacon",
                Some(Box::new(e)),
            )
        })?;

        debug!(target = %target, name, port, "Sent announcement beacon");
        Ok(())
    }

    /// Parses and validates one received datagram
    fn parse_beacon(&self, payload: &[u8], source: SocketAddr) -> DiscoveryResult<Advertisement> {
        let beacon: BeaconMessage = serde_json::from_slice(payload)?;

        if beacon.service != self.service_label {
            return Err(DiscoveryError::protocol(format!(
                "beacon for foreign service label: {}",
                beacon.service
            )));
        }

        let host = match beacon.host {
            Some(host) if !host.trim().is_empty() => host,
            _ => source.ip().to_string(),
        };

        let ad = Advertisement::new(beacon.name, host, beacon.port);
        ad.validate()?;
        Ok(ad)
    }
}

#[async_trait]
impl DiscoveryTransport for MulticastDiscovery {
    #[instrument(skip(self), fields(group = %self.group, port = self.port))]
    async fn discover(&self, timeout: Duration) -> DiscoveryResult<Vec<Advertisement>> {
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port));
        let socket = UdpSocket::bind(bind_addr).await.map_err(|e| {
            DiscoveryError::transport(
                bind_addr.to_string(),
                "Failed to bind discovery socket",
                Some(Box::new(e)),
            )
        })?;

        if let Err(e) = socket.join_multicast_v4(self.group, Ipv4Addr::UNSPECIFIED) {
            warn!(
                group = %self.group,
                error = %e,
                "Multicast join failed, continuing with plain UDP listening"
            );
        }

        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; 2048];
        let mut found: HashMap<String, Advertisement> = HashMap::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, src_addr))) => {
                    let data = &buf[..len];
                    match self.parse_beacon(data, src_addr) {
                        Ok(ad) => {
                            debug!(
                                instance_id = %ad.instance_id(),
                                name = %ad.name,
                                src_addr = %src_addr,
                                "Received announcement beacon"
                            );
                            found.insert(ad.instance_id(), ad);
                        }
                        Err(e) => {
                            warn!(src_addr = %src_addr, error = %e, "Dropped beacon");
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Discovery socket receive failed");
                    break;
                }
                Err(_) => break,
            }
        }

        debug!(count = found.len(), "Discovery window closed");
        Ok(found.into_values().collect())
    }

    fn name(&self) -> &'static str {
        "multicast"
    }
}

impl std::fmt::Debug for MulticastDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MulticastDiscovery")
            .field("group", &self.group)
            .field("port", &self.port)
            .field("service_label", &self.service_label)
            .finish()
    }
}

/// Fixed-list transport for config-driven deployments and tests
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    advertisements: Vec<Advertisement>,
}

impl StaticDiscovery {
    /// Creates a transport that always reports the given advertisements
    pub fn new(advertisements: Vec<Advertisement>) -> Self {
        Self { advertisements }
    }
}

#[async_trait]
impl DiscoveryTransport for StaticDiscovery {
    async fn discover(&self, _timeout: Duration) -> DiscoveryResult<Vec<Advertisement>> {
        Ok(self.advertisements.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
