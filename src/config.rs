//! Monitor configuration.
//!
//! All durations are stored as integer milliseconds so the configuration
//! hashes deterministically with [`canonical_hash_hex`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::canonical::canonical_hash_hex;
use crate::DEFAULT_CONFIG_VERSION;

/// Error type for invalid configurations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// View radius below one.
    #[error("View radius k must be >= 1, got {0}")]
    InvalidRadius(usize),
    /// Zero beacon interval.
    #[error("Beacon interval must be positive")]
    ZeroBeaconInterval,
    /// Jitter would allow non-positive beacon delays.
    #[error("Beacon jitter {jitter_ms}ms must be smaller than the interval {interval_ms}ms")]
    JitterTooLarge {
        /// Configured jitter.
        jitter_ms: u64,
        /// Configured interval.
        interval_ms: u64,
    },
    /// Operations could never leave the originating node.
    #[error("Operation hops must be >= 1")]
    ZeroOperationHops,
    /// Periodic collector with a zero period.
    #[error("Collector interval must be positive")]
    ZeroCollectorInterval,
}

/// When the staleness collector runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CollectorSchedule {
    /// Never scheduled; eviction happens only through explicit
    /// `collect_stale` calls.
    Disabled,
    /// Run every `interval_ms`.
    Periodic {
        /// Period in milliseconds.
        interval_ms: u64,
    },
}

impl CollectorSchedule {
    /// Collection period, if scheduled.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Self::Disabled => None,
            Self::Periodic { interval_ms } => Some(Duration::from_millis(*interval_ms)),
        }
    }
}

impl Default for CollectorSchedule {
    fn default() -> Self {
        Self::Periodic { interval_ms: 1_000 }
    }
}

/// Configuration of one node's topology monitor.
///
/// ## Parameters
///
/// - `k`: radius of the local view (a 2-local view holds 1- and 2-hop neighbors)
/// - `beacon_interval_ms`: mean time between beacons
/// - `beacon_jitter_ms`: beacons fire uniformly within ±jitter of the interval
/// - `operation_hops`: initial hops-to-live of originated edge operations
/// - `collector`: staleness collector schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Config version identifier.
    pub version: String,
    /// View radius K.
    pub k: usize,
    /// Mean beacon interval in milliseconds.
    pub beacon_interval_ms: u64,
    /// Beacon jitter in milliseconds.
    pub beacon_jitter_ms: u64,
    /// Initial hops-to-live for edge operations.
    pub operation_hops: u32,
    /// Staleness collector schedule.
    pub collector: CollectorSchedule,
}

impl MonitorConfig {
    /// Create a configuration with the given radius and beacon interval,
    /// other parameters at their defaults.
    pub fn new(k: usize, beacon_interval: Duration) -> Self {
        Self {
            k,
            beacon_interval_ms: u64::try_from(beacon_interval.as_millis()).unwrap_or(u64::MAX),
            ..Self::default()
        }
    }

    /// Set the collector schedule.
    pub fn with_collector(mut self, collector: CollectorSchedule) -> Self {
        self.collector = collector;
        self
    }

    /// Set the beacon jitter.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.beacon_jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the initial hops-to-live of edge operations.
    pub fn with_operation_hops(mut self, hops: u32) -> Self {
        self.operation_hops = hops;
        self
    }

    /// Check the parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k < 1 {
            return Err(ConfigError::InvalidRadius(self.k));
        }
        if self.beacon_interval_ms == 0 {
            return Err(ConfigError::ZeroBeaconInterval);
        }
        if self.beacon_jitter_ms >= self.beacon_interval_ms {
            return Err(ConfigError::JitterTooLarge {
                jitter_ms: self.beacon_jitter_ms,
                interval_ms: self.beacon_interval_ms,
            });
        }
        if self.operation_hops == 0 {
            return Err(ConfigError::ZeroOperationHops);
        }
        if self.collector == (CollectorSchedule::Periodic { interval_ms: 0 }) {
            return Err(ConfigError::ZeroCollectorInterval);
        }
        Ok(())
    }

    /// Mean beacon interval.
    pub fn beacon_interval(&self) -> Duration {
        Duration::from_millis(self.beacon_interval_ms)
    }

    /// Beacon jitter.
    pub fn beacon_jitter(&self) -> Duration {
        Duration::from_millis(self.beacon_jitter_ms)
    }

    /// Radius of the view carried by beacons. Receivers extend it by one
    /// hop, so the effective radius stabilizes at `k`.
    pub fn beacon_radius(&self) -> usize {
        self.k.saturating_sub(1)
    }

    /// Entries older than this are no longer fresh: `(k + 1) × interval`.
    pub fn eviction_horizon(&self) -> Duration {
        let hops = u32::try_from(self.k + 1).unwrap_or(u32::MAX);
        self.beacon_interval().saturating_mul(hops)
    }

    /// Compute a hash of the configuration parameters.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(self)
    }

    /// Small, fast configuration for tests: K=2, 5s ± 2s beacons,
    /// collector disabled.
    pub fn minimal() -> Self {
        Self {
            collector: CollectorSchedule::Disabled,
            ..Self::default()
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_CONFIG_VERSION.to_string(),
            k: 2,
            beacon_interval_ms: 5_000,
            beacon_jitter_ms: 2_000,
            operation_hops: 2,
            collector: CollectorSchedule::default(),
        }
    }
}
