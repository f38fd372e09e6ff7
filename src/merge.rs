//! Last-writer-wins merge of peer snapshots.
//!
//! ## Algorithm
//!
//! 1. Synthesize the implicit edge `sender -> self`, stamped `now`: receiving
//!    any message is evidence of current connectivity
//! 2. For every incoming `(element, ts)`:
//!    - absent locally: insert only if `ts` is still fresh (age < horizon)
//!    - present: replace value and timestamp only if `ts` is strictly newer
//! 3. Same procedure for `(tombstone, ts)` against the tombstone store
//! 4. Report whether the topology (elements, their values, tombstones) changed
//!
//! Every step is a per-key LWW write, so merging is idempotent and
//! commutative: the same message twice, or two messages in either order,
//! leave the stores in the same state.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::MonitorConfig;
use crate::store::{GraphStore, TombstoneStore};
use crate::types::{ElementKey, GraphElement, NodeId, Timestamp, Upsert, ViewMessage, WireError};

/// What a merge did to the stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Elements that were absent and got inserted.
    pub inserted: usize,
    /// Elements replaced with a different value (e.g. new edge weight).
    pub updated: usize,
    /// Elements whose timestamp moved forward with an unchanged value.
    pub refreshed: usize,
    /// Absent elements not inserted because they were already stale.
    pub skipped_stale: usize,
    /// Tombstones that were absent and got inserted.
    pub tombstones_inserted: usize,
    /// Tombstones whose timestamp moved forward.
    pub tombstones_refreshed: usize,
    /// Absent tombstones not inserted because they were already stale.
    pub tombstones_skipped_stale: usize,
}

impl MergeReport {
    /// Whether observers must be told about a topology change.
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.updated > 0 || self.tombstones_inserted > 0
    }
}

/// Applies peer snapshots to the local stores.
#[derive(Debug, Clone, Copy)]
pub struct MergeEngine {
    /// Entries at least this old are not fresh.
    horizon: Duration,
}

impl MergeEngine {
    /// Create an engine with an explicit freshness horizon.
    pub fn new(horizon: Duration) -> Self {
        Self { horizon }
    }

    /// Create an engine for a monitor configuration.
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.eviction_horizon())
    }

    /// Freshness horizon.
    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// Whether an observation stamped `ts` is still fresh at `now`.
    pub fn is_fresh(&self, ts: Timestamp, now: Timestamp) -> bool {
        ts.age_at(now) < self.horizon
    }

    /// Merge a view received from `sender`, measured at `distance`.
    ///
    /// Malformed messages are rejected before any store is touched.
    pub fn merge(
        &self,
        graph: &mut GraphStore,
        tombstones: &mut TombstoneStore,
        message: &ViewMessage,
        sender: NodeId,
        distance: f64,
        now: Timestamp,
    ) -> Result<MergeReport, WireError> {
        message.validate()?;

        let local = graph.local_node();
        let mut incoming: BTreeMap<ElementKey, (GraphElement, Timestamp)> = message
            .elements()
            .map(|(element, ts)| (element.key(), (element, ts)))
            .collect();
        if sender != local {
            let implicit = GraphElement::edge(sender, local, distance);
            incoming.insert(implicit.key(), (implicit, now));
        }

        let mut report = MergeReport::default();

        for (key, (element, ts)) in incoming {
            if !graph.contains(&key) && !self.is_fresh(ts, now) {
                tracing::trace!(element = %key, ts = %ts, "Skipping stale element");
                report.skipped_stale += 1;
                continue;
            }
            match graph.upsert(element, ts) {
                Upsert::Inserted => report.inserted += 1,
                Upsert::Replaced { value_changed: true } => report.updated += 1,
                Upsert::Replaced { value_changed: false } => report.refreshed += 1,
                Upsert::Kept => {}
            }
        }

        for (edge, ts) in message.tombstones() {
            if !tombstones.contains(&edge) && !self.is_fresh(ts, now) {
                tracing::trace!(edge = %edge, ts = %ts, "Skipping stale tombstone");
                report.tombstones_skipped_stale += 1;
                continue;
            }
            match tombstones.insert(edge, ts) {
                Upsert::Inserted => report.tombstones_inserted += 1,
                Upsert::Replaced { .. } => report.tombstones_refreshed += 1,
                Upsert::Kept => {}
            }
        }

        tracing::debug!(
            node = %local,
            sender = %sender,
            inserted = report.inserted,
            updated = report.updated,
            refreshed = report.refreshed,
            tombstones_inserted = report.tombstones_inserted,
            changed = report.changed(),
            "Merged view message"
        );

        Ok(report)
    }
}
