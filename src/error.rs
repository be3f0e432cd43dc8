//! # Error Handling
//!
//! Error types for the discovery subsystem with classification helpers
//! used by the retry and circuit-breaker paths.
//!
//! ## Error Categories
//!
//! - **Configuration Errors**: Invalid subsystem configuration
//! - **Transport Errors**: Discovery or probe network failures, timeouts,
//!   DNS issues
//! - **Protocol Errors**: Malformed advertisements, unexpected health
//!   payloads
//! - **Storage Errors**: Cache file read/write failures
//! - **Unavailability**: No selectable instance and no fallback answer
//!
//! Transport and protocol errors are always recoverable: they feed failure
//! accounting and never terminate a discovery or health loop. Only
//! unavailability and `force_refresh()` failures surface to callers.

use thiserror::Error;

/// Result type alias for discovery operations
///
/// This is the standard Result type used throughout the crate. It provides
/// a consistent interface for error handling and makes error propagation
/// more ergonomic.
pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;

/// Error type covering every failure the discovery subsystem can produce
///
/// Each variant includes the context needed to act on the failure. Loop
/// drivers catch these at the cycle boundary and retry; they are never
/// allowed to kill a background task.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Configuration validation errors
    ///
    /// Raised during construction when the provided configuration is
    /// inconsistent (for example a probe timeout longer than the probe
    /// interval). These indicate caller mistakes that must be corrected
    /// before the subsystem can start.
    ///
    /// **Recovery Strategy**: Fix configuration and reconstruct
    #[error("Configuration error: {message}")]
    Configuration {
        /// Human-readable description of the configuration issue
        message: String,
        /// Optional source error for additional context
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Network-level failures against a discovery or health target
    ///
    /// Covers connection refusals, resets, DNS resolution failures, and
    /// socket errors while talking to an instance or listening for
    /// advertisements.
    ///
    /// **Recovery Strategy**: Retry on the loop's backoff schedule, count
    /// toward the instance's circuit breaker
    #[error("Transport error for {target}: {message}")]
    Transport {
        /// Target address or endpoint that failed
        target: String,
        /// Descriptive error message
        message: String,
        /// Underlying network error for debugging
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation exceeded its configured deadline
    ///
    /// **Recovery Strategy**: Retry on the loop's backoff schedule; treated
    /// like any other transport failure for circuit-breaker accounting
    #[error("Operation timed out after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
        /// Description of the operation that timed out
        operation: String,
    },

    /// Malformed or unexpected data from a peer
    ///
    /// Covers advertisements that fail validation and health responses
    /// without the expected liveness marker. Treated identically to
    /// transport errors for failure accounting.
    ///
    /// **Recovery Strategy**: Drop the offending datum, keep the loop alive
    #[error("Protocol error: {reason}")]
    Protocol {
        /// Reason the data was rejected
        reason: String,
    },

    /// Cache storage failures
    ///
    /// Raised when the last-known-good URL file cannot be written or
    /// removed. A missing or unreadable cache on the read path is not an
    /// error (it simply yields no cached value).
    ///
    /// **Recovery Strategy**: Log and continue; the cache is an optimization
    #[error("Cache storage error at {path}: {message}")]
    Storage {
        /// Cache file path involved
        path: String,
        /// Descriptive error message
        message: String,
        /// Underlying I/O error for debugging
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No selectable instance exists
    ///
    /// Returned by the fallback ladder when every rung fails, and used by
    /// callers to give `pick_instance() == None` a typed shape. The caller
    /// decides whether to retry, use a last-resort address, or fail the
    /// user-visible operation.
    ///
    /// **Recovery Strategy**: Retry after the next discovery cycle
    #[error("No service instance available: {reason}")]
    NoInstanceAvailable {
        /// Why no instance could be produced
        reason: String,
    },
}

impl DiscoveryError {
    /// Creates a configuration error with context
    ///
    /// # Arguments
    ///
    /// * `message` - Human-readable error description
    /// * `source` - Optional underlying error cause
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lantern::error::DiscoveryError;
    ///
    /// let error = DiscoveryError::configuration("failure threshold must be > 0", None);
    /// ```
    pub fn configuration(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Configuration {
            message: message.into(),
            source,
        }
    }

    /// Creates a transport error with target and context
    ///
    /// # Arguments
    ///
    /// * `target` - Target address that failed
    /// * `message` - Error description
    /// * `source` - Optional underlying network error
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lantern::error::DiscoveryError;
    ///
    /// let error = DiscoveryError::transport("192.168.1.40:8080", "connection refused", None);
    /// ```
    pub fn transport(
        target: impl Into<String>,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Transport {
            target: target.into(),
            message: message.into(),
            source,
        }
    }

    /// Creates a timeout error with operation context
    ///
    /// # Arguments
    ///
    /// * `timeout` - Timeout duration that was exceeded
    /// * `operation` - Description of the operation that timed out
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lantern::error::DiscoveryError;
    /// use std::time::Duration;
    ///
    /// let error = DiscoveryError::timeout(Duration::from_secs(10), "discovery cycle");
    /// ```
    pub fn timeout(timeout: std::time::Duration, operation: impl Into<String>) -> Self {
        Self::Timeout {
            timeout_ms: timeout.as_millis() as u64,
            operation: operation.into(),
        }
    }

    /// Creates a protocol error for rejected peer data
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lantern::error::DiscoveryError;
    ///
    /// let error = DiscoveryError::protocol("advertisement with empty host");
    /// ```
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Creates a cache storage error
    ///
    /// # Arguments
    ///
    /// * `path` - Cache file path involved
    /// * `message` - Error description
    /// * `source` - Optional underlying I/O error
    pub fn storage(
        path: impl Into<String>,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Creates the typed "no instance available" error
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lantern::error::DiscoveryError;
    ///
    /// let error = DiscoveryError::no_instance_available("fallback ladder exhausted");
    /// assert!(!error.is_retryable());
    /// ```
    pub fn no_instance_available(reason: impl Into<String>) -> Self {
        Self::NoInstanceAvailable {
            reason: reason.into(),
        }
    }

    /// Checks whether this error represents a condition worth retrying
    ///
    /// Transport, timeout, and protocol failures are transient: the loops
    /// retry them on their backoff schedule. Configuration errors are
    /// permanent. Unavailability is a state rather than a fault; the
    /// caller chooses when to ask again.
    ///
    /// # Returns
    ///
    /// Returns `true` if the error condition is likely temporary.
    pub fn is_retryable(&self) -> bool {
        match self {
            DiscoveryError::Configuration { .. } => false,
            DiscoveryError::Transport { .. } => true,
            DiscoveryError::Timeout { .. } => true,
            DiscoveryError::Protocol { .. } => true,
            DiscoveryError::Storage { .. } => true,
            DiscoveryError::NoInstanceAvailable { .. } => false,
        }
    }

    /// Returns a static category label for metrics and structured logs
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lantern::error::DiscoveryError;
    /// use std::time::Duration;
    ///
    /// let error = DiscoveryError::timeout(Duration::from_secs(5), "health probe");
    /// assert_eq!(error.category(), "timeout");
    /// ```
    pub fn category(&self) -> &'static str {
        match self {
            DiscoveryError::Configuration { .. } => "configuration",
            DiscoveryError::Transport { .. } => "transport",
            DiscoveryError::Timeout { .. } => "timeout",
            DiscoveryError::Protocol { .. } => "protocol",
            DiscoveryError::Storage { .. } => "storage",
            DiscoveryError::NoInstanceAvailable { .. } => "unavailable",
        }
    }
}

/// Conversion from I/O errors
///
/// Maps common I/O error kinds to the matching discovery error types so
/// socket and file operations can use `?` directly.
impl From<std::io::Error> for DiscoveryError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => {
                DiscoveryError::timeout(std::time::Duration::from_secs(0), "I/O operation")
            }
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::NotFound
            | std::io::ErrorKind::AddrNotAvailable => {
                DiscoveryError::transport("unknown", "I/O failure", Some(Box::new(err)))
            }
            _ => DiscoveryError::transport("unknown", "I/O error", Some(Box::new(err))),
        }
    }
}

/// Conversion from JSON errors
///
/// Beacon payloads and the cache file are JSON; a parse failure is peer
/// data we reject, not a crash.
impl From<serde_json::Error> for DiscoveryError {
    fn from(err: serde_json::Error) -> Self {
        DiscoveryError::protocol(format!("invalid JSON payload: {}", err))
    }
}
