//! Shared CLI options for the lantern daemon and embedding binaries
//!
//! Provides the common logging flags and the discovery option group
//! that maps command-line arguments and environment variables onto a
//! [`DiscoveryConfig`].

use crate::config::DiscoveryConfig;
use clap::Args;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Common logging options
#[derive(Args, Debug, Clone)]
pub struct LoggingOptions {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "LANTERN_LOG_LEVEL")]
    pub log_level: String,
}

impl LoggingOptions {
    /// Initialize logging with the configured level
    pub fn init_logging(&self) {
        let level = self.parse_log_level();

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set logging subscriber");
    }

    /// Parse the log level string into a tracing Level
    pub fn parse_log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::INFO,
        }
    }
}

/// Discovery options shared by the daemon and embedding binaries
#[derive(Args, Debug, Clone)]
pub struct DiscoveryOptions {
    /// Service label announced and accepted on the multicast group
    #[arg(long, default_value = "lantern", env = "LANTERN_SERVICE_LABEL")]
    pub service_label: String,

    /// Multicast group address for discovery beacons
    #[arg(long, default_value = "239.255.42.42", env = "LANTERN_MULTICAST_GROUP")]
    pub multicast_group: Ipv4Addr,

    /// UDP port for discovery beacons
    #[arg(long, default_value_t = 9999, env = "LANTERN_MULTICAST_PORT")]
    pub multicast_port: u16,

    /// Seconds between discovery cycles
    #[arg(long, default_value_t = 60, env = "LANTERN_DISCOVERY_INTERVAL_SECS")]
    pub discovery_interval_secs: u64,

    /// Seconds to listen for beacons within one discovery cycle
    #[arg(long, default_value_t = 10, env = "LANTERN_DISCOVERY_TIMEOUT_SECS")]
    pub discovery_timeout_secs: u64,

    /// Seconds between health probe cycles
    #[arg(long, default_value_t = 30, env = "LANTERN_PROBE_INTERVAL_SECS")]
    pub probe_interval_secs: u64,

    /// Seconds before an individual health probe is abandoned
    #[arg(long, default_value_t = 5, env = "LANTERN_PROBE_TIMEOUT_SECS")]
    pub probe_timeout_secs: u64,

    /// Health check endpoint path
    #[arg(long, default_value = "/health", env = "LANTERN_HEALTH_PATH")]
    pub health_path: String,

    /// Comma-separated list of well-known hostnames tried during acquisition
    #[arg(long, env = "LANTERN_WELL_KNOWN_HOSTS")]
    pub well_known_hosts: Option<String>,

    /// Comma-separated list of static fallback URLs tried last
    #[arg(long, env = "LANTERN_FALLBACK_URLS")]
    pub fallback_urls: Option<String>,

    /// Path for the last-known-good URL cache file
    #[arg(long, env = "LANTERN_CACHE_PATH")]
    pub cache_path: Option<PathBuf>,
}

impl DiscoveryOptions {
    /// Builds a [`DiscoveryConfig`] from these options
    ///
    /// Unset options keep the library defaults. The result is not yet
    /// validated; construction of the discovery system validates it.
    pub fn to_config(&self) -> DiscoveryConfig {
        let mut config = DiscoveryConfig {
            service_label: self.service_label.clone(),
            multicast_group: self.multicast_group,
            multicast_port: self.multicast_port,
            discovery_interval: Duration::from_secs(self.discovery_interval_secs),
            discovery_timeout: Duration::from_secs(self.discovery_timeout_secs),
            probe_interval: Duration::from_secs(self.probe_interval_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            health_path: self.health_path.clone(),
            cache_path: self.cache_path.clone(),
            ..Default::default()
        };

        if let Some(hosts) = &self.well_known_hosts {
            config.well_known_hosts = parse_string_list(hosts);
        }
        if let Some(urls) = &self.fallback_urls {
            config.fallback_urls = parse_string_list(urls);
        }

        config
    }
}

/// Utility function to parse comma-separated strings
pub fn parse_string_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
