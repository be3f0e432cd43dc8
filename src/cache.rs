//! Last-known-good URL cache
//!
//! Persists the most recently verified base URL so the next process
//! start can try it first instead of waiting out a full discovery
//! window. The cache is a single-value JSON file; a missing or
//! unreadable file simply means no cached answer.
//!
//! Callers own the verification contract: a cached URL must be probed
//! before use, and cleared when the probe fails.

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, DiscoveryResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Cache directory name relative to user home
const CACHE_DIR_NAME: &str = ".cache/lantern";

/// File holding the cached server record
const CACHE_FILE_NAME: &str = "last_known_server.json";

/// On-disk record for the cached server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CachedServer {
    /// Verified base URL
    base_url: String,
    /// When the URL was cached
    #[serde(with = "crate::types::system_time_serde")]
    saved_at: SystemTime,
}

/// Get the user's home directory
///
/// Falls back to current directory if HOME cannot be determined.
fn get_home_dir() -> PathBuf {
    if let Ok(home) = env::var("HOME") {
        PathBuf::from(home)
    } else if let Some(home_dir) = dirs::home_dir() {
        home_dir
    } else {
        PathBuf::from(".")
    }
}

/// Default cache file location under the user's home
///
/// Returns `$HOME/.cache/lantern/last_known_server.json` on Unix
/// systems, or equivalent on other platforms.
pub fn default_cache_path() -> PathBuf {
    get_home_dir().join(CACHE_DIR_NAME).join(CACHE_FILE_NAME)
}

/// Durable single-value store for the last known-good base URL
///
/// # Examples
///
/// ```rust
/// use lantern::UrlCache;
///
/// # async fn example() -> Result<(), lantern::DiscoveryError> {
/// let cache = UrlCache::new("/tmp/lantern-cache.json");
/// cache.set("http://192.168.1.42:8080").await?;
/// assert_eq!(cache.get().await.as_deref(), Some("http://192.168.1.42:8080"));
/// cache.clear().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct UrlCache {
    path: PathBuf,
}

impl UrlCache {
    /// Creates a cache backed by the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a cache at the configured path, or the default location
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        let path = config.cache_path.clone().unwrap_or_else(default_cache_path);
        Self { path }
    }

    /// Returns the backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cached base URL, if any
    ///
    /// Returns `None` for a missing, unreadable, or corrupt cache file;
    /// reading never returns an error.
    pub async fn get(&self) -> Option<String> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "No cached server URL");
                return None;
            }
        };

        match serde_json::from_slice::<CachedServer>(&bytes) {
            Ok(record) => {
                debug!(url = %record.base_url, "Loaded cached server URL");
                Some(record.base_url)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt cache file");
                None
            }
        }
    }

    /// Stores a verified base URL
    pub async fn set(&self, base_url: &str) -> DiscoveryResult<()> {
        let record = CachedServer {
            base_url: base_url.to_string(),
            saved_at: SystemTime::now(),
        };
        let payload = serde_json::to_vec_pretty(&record).map_err(|e| {
            DiscoveryError::storage(
                self.path.display().to_string(),
                "Failed to encode cache record",
                Some(Box::new(e)),
            )
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DiscoveryError::storage(
                    self.path.display().to_string(),
                    "Failed to create cache directory",
                    Some(Box::new(e)),
                )
            })?;
        }

        tokio::fs::write(&self.path, payload).await.map_err(|e| {
            DiscoveryError::storage(
                self.path.display().to_string(),
                "Failed to write cache file",
                Some(Box::new(e)),
            )
        })?;

        info!(url = %base_url, "Cached last known-good server URL");
        Ok(())
    }

    /// Removes the cached value
    ///
    /// Clearing an already-empty cache is not an error.
    pub async fn clear(&self) -> DiscoveryResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Cleared cached server URL");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DiscoveryError::storage(
                self.path.display().to_string(),
                "Failed to remove cache file",
                Some(Box::new(e)),
            )),
        }
    }
}
