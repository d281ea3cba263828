//! Cache configuration.
//!
//! Controls the entry-list cache and its background refreshes via
//! `scriptorium.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_CAPACITY: usize = 512;
const DEFAULT_REFRESH_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

/// Cache configuration from `scriptorium.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entry lists held before least-recently-used eviction.
    pub capacity: usize,
    /// Upper bound (ms) on a single background refresh.
    pub refresh_timeout_ms: u64,
    /// Time (ms) granted to in-flight refreshes on shutdown.
    pub shutdown_grace_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            refresh_timeout_ms: DEFAULT_REFRESH_TIMEOUT_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            capacity: settings.capacity.get(),
            refresh_timeout_ms: settings.refresh_timeout.as_millis() as u64,
            shutdown_grace_ms: settings.shutdown_grace.as_millis() as u64,
        }
    }
}

impl CacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
