//! Tokio driver for monitors.
//!
//! Each node runs as one task owning its [`TopologyMonitor`]. The task
//! serializes the beacon timer, the collector timer, inbound frames and
//! consumer commands, so the monitor never needs a lock.
//!
//! [`InMemoryNetwork`] connects such tasks for simulations and tests.
//!
//! [`TopologyMonitor`]: crate::monitor::TopologyMonitor

pub mod network;
pub mod node;

use tokio::time::Instant;

use crate::collaborators::Clock;
use crate::types::Timestamp;

pub use network::{Delivery, InMemoryNetwork, NetworkPort};
pub use node::{spawn_node, NodeHandle, RuntimeError};

/// [`Clock`] on tokio's clock, so paused test time drives the monitor.
///
/// Nodes compare each other's timestamps, so every node of a network must
/// share one clock.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    start: Instant,
}

impl TokioClock {
    /// Start a new clock at zero.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.start.elapsed().as_millis();
        Timestamp::from_millis(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }
}
