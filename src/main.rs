//! # Lantern Daemon - Main Entry Point
//!
//! Long-running LAN service discovery daemon. Listens for multicast
//! service beacons, keeps a health-checked instance registry, and logs
//! roster changes as they happen. With `--acquire` it instead walks the
//! cold-start acquisition ladder once, prints the first live base URL
//! to stdout, and exits.
//!
//! ## Usage
//!
//! ```bash
//! # Run the discovery and health loops with default configuration
//! lantern
//!
//! # Resolve one live server URL and exit (for shell scripts)
//! lantern --acquire
//!
//! # Custom configuration via flags or environment variables
//! LANTERN_SERVICE_LABEL=kitchen \
//! LANTERN_MULTICAST_GROUP=239.255.42.43 \
//! LANTERN_LOG_LEVEL=debug \
//! lantern
//!
//! # Static fallback candidates for networks that drop multicast
//! lantern --acquire --fallback-urls "http://192.168.1.50:8080,http://192.168.1.51:8080"
//! ```
//!
//! ## Exit Codes
//!
//! - `1` - invalid configuration
//! - `2` - acquisition ladder exhausted without finding a live server
//! - `3` - runtime error in the discovery loops

use clap::Parser;
use lantern::{
    DiscoveryEvent, DiscoveryOptions, DiscoveryResult, LoggingOptions, ServiceDiscovery,
};
use std::process;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// Command-line interface for the lantern daemon
#[derive(Parser, Debug)]
#[command(name = "lantern", version, about = "Adaptive LAN service discovery")]
struct Cli {
    #[command(flatten)]
    logging: LoggingOptions,

    #[command(flatten)]
    discovery: DiscoveryOptions,

    /// Resolve one live base URL through the acquisition ladder, print it, and exit
    #[arg(long)]
    acquire: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    cli.logging.init_logging();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting lantern service discovery"
    );

    let config = cli.discovery.to_config();
    let discovery = match ServiceDiscovery::with_config(config) {
        Ok(discovery) => discovery,
        Err(e) => {
            error!(error = %e, "Failed to initialize service discovery");
            eprintln!("Configuration Error: {}", e);
            process::exit(1);
        }
    };

    info!(
        service_label = %discovery.config().service_label,
        multicast_group = %discovery.config().multicast_group,
        multicast_port = discovery.config().multicast_port,
        discovery_interval_secs = discovery.config().discovery_interval.as_secs(),
        probe_interval_secs = discovery.config().probe_interval.as_secs(),
        "Configuration loaded successfully"
    );

    if cli.acquire {
        match discovery.acquire_base_url().await {
            Ok(url) => println!("{}", url),
            Err(e) => {
                error!(error = %e, "Acquisition failed");
                eprintln!("Acquisition Error: {}", e);
                process::exit(2);
            }
        }
        return;
    }

    if let Err(e) = run_daemon(&discovery).await {
        error!(error = %e, "Service discovery encountered an error");
        eprintln!("Runtime Error: {}", e);
        process::exit(3);
    }
}

/// Runs both background loops until Ctrl+C, logging events as they arrive
async fn run_daemon(discovery: &ServiceDiscovery) -> DiscoveryResult<()> {
    let mut events = discovery.subscribe();
    discovery.start().await?;

    info!("Service discovery running, press Ctrl+C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for shutdown signal");
                }
                break;
            }
            event = events.recv() => match event {
                Ok(DiscoveryEvent::HealthUpdate(instance)) => {
                    info!(
                        instance_id = %instance.id,
                        healthy = instance.is_healthy,
                        circuit_state = %instance.circuit_state,
                        weight = instance.weight,
                        response_time_ms = instance.response_time_ms,
                        "Instance health updated"
                    );
                }
                Ok(DiscoveryEvent::HealthyInstances(instances)) => {
                    info!(healthy_count = instances.len(), "Healthy roster updated");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagged, some updates were dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("Shutting down");
    discovery.stop().await?;
    info!("Service discovery shut down normally");
    Ok(())
}
