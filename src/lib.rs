//! # Lantern
//!
//! Adaptive LAN service discovery with health-aware instance selection.
//! Lantern listens for multicast service beacons, reconciles them into a
//! shared registry, probes every instance on a fixed cadence, and hands
//! callers a weighted-random pick from the currently healthy set.
//!
//! ## Features
//!
//! - **Multicast Discovery**: UDP beacon listener with full-set
//!   reconciliation each cycle
//! - **Health Monitoring**: Concurrent HTTP liveness probes with a
//!   payload marker check
//! - **Circuit Breaking**: Per-instance breaker with timed probation and
//!   automatic recovery
//! - **Weighted Selection**: Latency-adapted weights drive stochastic
//!   instance selection
//! - **Cold-Start Acquisition**: Cached URL, well-known hosts, and a
//!   subnet sweep answer before the first full cycle completes
//!
//! ## Design Principles
//!
//! - **Degrade, Never Delete**: Health failures exclude an instance from
//!   selection; only discovery retraction removes it
//! - **Probe Unlocked**: Network I/O never happens while the registry
//!   lock is held
//! - **Verified Answers**: Every URL handed to a caller passed a live
//!   probe first
//!
//! ## Quick Start
//!
//! ```rust
//! use lantern::{DiscoveryConfig, ServiceDiscovery};
//!
//! # async fn example() -> Result<(), lantern::DiscoveryError> {
//! let discovery = ServiceDiscovery::with_config(DiscoveryConfig::default())?;
//! discovery.start().await?;
//!
//! if let Some(instance) = discovery.pick_instance().await {
//!     println!("Routing to {}", instance.base_url);
//! }
//! # Ok(())
//! # }
//! ```

mod breaker;
pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fallback;
pub mod health;
pub mod monitor;
pub mod registry;
pub mod selector;
pub mod service;
pub mod transport;
pub mod types;

// Re-export commonly used types for convenience
pub use cache::{default_cache_path, UrlCache};
pub use cli::{DiscoveryOptions, LoggingOptions};
pub use config::DiscoveryConfig;
pub use engine::DiscoveryEngine;
pub use error::{DiscoveryError, DiscoveryResult};
pub use events::{DiscoveryEvent, EventBus};
pub use fallback::UrlAcquirer;
pub use health::{
    HealthCheckResult, HealthChecker, HttpHealthChecker, ProbeOutcome, HEALTH_MARKER,
};
pub use monitor::{HealthCycleSummary, HealthMonitor};
pub use registry::{ReconcileSummary, ServiceRegistry};
pub use selector::{select_weighted, InstanceSelector};
pub use service::ServiceDiscovery;
pub use transport::{BeaconMessage, DiscoveryTransport, MulticastDiscovery, StaticDiscovery};
pub use types::{Advertisement, CircuitState, ServiceInstance, ServiceStats};
