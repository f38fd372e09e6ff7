//! Eviction of entries that stopped being refreshed.
//!
//! An entry still present one full horizon after its last refresh is
//! presumed gone. The local node never ages. Tombstones age on their stored
//! stamp whoever owns the edge, so a node's own tombstones live only as long
//! as something keeps re-stamping them.

use std::time::Duration;

use crate::config::MonitorConfig;
use crate::store::{GraphStore, TombstoneStore};
use crate::types::Timestamp;

/// What a collection pass evicted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectReport {
    /// Graph elements removed.
    pub evicted_elements: usize,
    /// Tombstones removed.
    pub evicted_tombstones: usize,
}

impl CollectReport {
    /// Whether observers must be told about a topology change.
    pub fn changed(&self) -> bool {
        self.evicted_elements > 0 || self.evicted_tombstones > 0
    }

    /// Total number of evicted entries.
    pub fn total(&self) -> usize {
        self.evicted_elements + self.evicted_tombstones
    }
}

/// Removes stale graph elements and tombstones.
#[derive(Debug, Clone, Copy)]
pub struct StalenessCollector {
    /// Entries at least this old are evicted.
    horizon: Duration,
}

impl StalenessCollector {
    /// Create a collector with an explicit horizon.
    pub fn new(horizon: Duration) -> Self {
        Self { horizon }
    }

    /// Create a collector for a monitor configuration.
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.eviction_horizon())
    }

    /// Eviction horizon.
    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// Evict every entry whose age at `now` is at least the horizon.
    pub fn collect(
        &self,
        graph: &mut GraphStore,
        tombstones: &mut TombstoneStore,
        now: Timestamp,
    ) -> CollectReport {
        let mut report = CollectReport::default();

        for key in graph.stale_keys(now, self.horizon) {
            if graph.remove(&key).is_some() {
                tracing::trace!(element = %key, "Evicted stale element");
                report.evicted_elements += 1;
            }
        }
        for edge in tombstones.stale_edges(now, self.horizon) {
            if tombstones.lift(&edge) {
                tracing::trace!(edge = %edge, "Evicted stale tombstone");
                report.evicted_tombstones += 1;
            }
        }

        if report.changed() {
            tracing::debug!(
                node = %graph.local_node(),
                evicted_elements = report.evicted_elements,
                evicted_tombstones = report.evicted_tombstones,
                "Collected stale entries"
            );
        }
        report
    }
}
