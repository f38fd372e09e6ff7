//! Periodic anti-entropy beacons.
//!
//! A beacon carries the sender's (K-1)-local view, not its K-local view:
//! every receiver extends what it hears by one hop (the implicit
//! `sender -> receiver` edge), so the effective radius stabilizes at K.

use std::time::Duration;

use crate::collaborators::RandomSource;
use crate::config::MonitorConfig;
use crate::store::{Direction, GraphStore, TombstoneStore};
use crate::types::{GraphElement, Timestamp, ViewMessage};

/// Builds beacon snapshots and draws beacon delays.
#[derive(Debug, Clone, Copy)]
pub struct BeaconEngine {
    /// Radius of the transmitted view (K-1).
    radius: usize,
    /// Mean interval.
    interval: Duration,
    /// Uniform jitter around the interval.
    jitter: Duration,
}

impl BeaconEngine {
    /// Create an engine for a monitor configuration.
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            radius: config.beacon_radius(),
            interval: config.beacon_interval(),
            jitter: config.beacon_jitter(),
        }
    }

    /// Radius of the transmitted view.
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Snapshot of the local node's (K-1)-local view with element timestamps,
    /// plus the tombstones on edges of that subgraph.
    pub fn build(
        &self,
        graph: &GraphStore,
        tombstones: &TombstoneStore,
        now: Timestamp,
    ) -> ViewMessage {
        let local = graph.local_node();
        let view = graph.bounded_view(local, self.radius, Direction::Both);
        let mut message = ViewMessage::new();

        for node in &view.nodes {
            let element = GraphElement::node(*node);
            if let Some(ts) = graph.timestamp(&element.key(), now) {
                message.push_element(element, ts);
            }
        }
        for edge in view.edges() {
            let element = GraphElement::from(*edge);
            if let Some(ts) = graph.timestamp(&element.key(), now) {
                message.push_element(element, ts);
            }
        }
        for (edge, ts) in tombstones.restricted_to(&view, now) {
            message.push_tombstone(edge, ts);
        }

        message
    }

    /// Delay until the next beacon, uniform in `[interval - jitter,
    /// interval + jitter]`.
    pub fn next_delay(&self, rng: &mut dyn RandomSource) -> Duration {
        let interval = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX);
        let jitter = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let low = interval.saturating_sub(jitter).max(1);
        let high = interval.saturating_add(jitter);
        Duration::from_millis(rng.uniform_millis(low, high))
    }
}
