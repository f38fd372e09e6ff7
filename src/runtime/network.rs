//! In-memory broadcast network.
//!
//! Links are symmetric and carry a distance that receivers use as the weight
//! of the implicit `sender -> receiver` edge. Frames are JSON-encoded on
//! broadcast and decoded by the receiving monitor, as on a real radio.
//!
//! The network also plays the physical link layer: disabling a link marks it
//! logically disabled without stopping delivery, so the underlay keeps
//! observing it.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::collaborators::{LinkError, PhysicalLink, RandomSource, Transport, TransportError};
use crate::config::MonitorConfig;
use crate::metrics::MonitorMetrics;
use crate::monitor::{Collaborators, MonitorError, TopologyMonitor};
use crate::types::{NodeId, WireMessage};

use super::node::{spawn_node, NodeHandle};
use super::TokioClock;

/// A frame delivered to one node.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Broadcasting node.
    pub sender: NodeId,
    /// Distance of the link the frame travelled.
    pub distance: f64,
    /// Encoded [`WireMessage`].
    pub frame: Vec<u8>,
}

#[derive(Debug, Default)]
struct NetworkState {
    inboxes: BTreeMap<NodeId, mpsc::UnboundedSender<Delivery>>,
    links: BTreeMap<NodeId, BTreeMap<NodeId, f64>>,
    disabled: BTreeSet<(NodeId, NodeId)>,
}

/// Shared broadcast hub.
#[derive(Debug, Clone)]
pub struct InMemoryNetwork {
    state: Arc<RwLock<NetworkState>>,
    clock: TokioClock,
}

impl InMemoryNetwork {
    /// Create an empty network with a fresh shared clock.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(NetworkState::default())),
            clock: TokioClock::new(),
        }
    }

    /// Clock shared by every node of this network.
    pub fn clock(&self) -> TokioClock {
        self.clock
    }

    /// Attach a node. Returns its port and the receiving end of its inbox.
    pub fn register(&self, node: NodeId) -> (NetworkPort, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.write().inboxes.insert(node, tx);
        let port = NetworkPort {
            node,
            network: self.clone(),
        };
        (port, rx)
    }

    /// Connect two nodes in both directions.
    pub fn connect(&self, a: NodeId, b: NodeId, distance: f64) {
        let mut state = self.state.write();
        state.links.entry(a).or_default().insert(b, distance);
        state.links.entry(b).or_default().insert(a, distance);
    }

    /// Cut the radio link between two nodes.
    pub fn disconnect(&self, a: NodeId, b: NodeId) {
        let mut state = self.state.write();
        if let Some(peers) = state.links.get_mut(&a) {
            peers.remove(&b);
        }
        if let Some(peers) = state.links.get_mut(&b) {
            peers.remove(&a);
        }
    }

    /// Radio neighbors of `node` with their distances.
    pub fn peers(&self, node: NodeId) -> Vec<(NodeId, f64)> {
        self.state
            .read()
            .links
            .get(&node)
            .map(|peers| peers.iter().map(|(peer, d)| (*peer, *d)).collect())
            .unwrap_or_default()
    }

    /// Whether `from` has not logically disabled its link to `to`.
    pub fn is_link_enabled(&self, from: NodeId, to: NodeId) -> bool {
        !self.state.read().disabled.contains(&(from, to))
    }

    /// Register `local`, build its monitor on this network and spawn it.
    pub fn spawn_node(
        &self,
        local: NodeId,
        config: MonitorConfig,
        random: impl RandomSource + 'static,
        metrics: Arc<dyn MonitorMetrics>,
    ) -> Result<NodeHandle, MonitorError> {
        let (port, inbox) = self.register(local);
        let port = Arc::new(port);
        let collaborators = Collaborators::new(Arc::new(self.clock), port.clone())
            .with_link(port)
            .with_random(random)
            .with_metrics(metrics);
        let monitor = TopologyMonitor::initialize(local, config, collaborators)?;
        Ok(spawn_node(monitor, inbox))
    }

    fn send(&self, from: NodeId, frame: Vec<u8>) -> Result<(), TransportError> {
        let state = self.state.read();
        if !state.inboxes.contains_key(&from) {
            return Err(TransportError::Closed);
        }
        let Some(peers) = state.links.get(&from) else {
            return Ok(());
        };
        for (peer, distance) in peers {
            let Some(inbox) = state.inboxes.get(peer) else {
                continue;
            };
            let delivery = Delivery {
                sender: from,
                distance: *distance,
                frame: frame.clone(),
            };
            // Lossy: a stopped receiver just misses the frame
            if inbox.send(delivery).is_err() {
                tracing::trace!(from = %from, to = %peer, "Receiver gone, frame lost");
            }
        }
        Ok(())
    }
}

impl Default for InMemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// One node's attachment to an [`InMemoryNetwork`].
#[derive(Debug, Clone)]
pub struct NetworkPort {
    node: NodeId,
    network: InMemoryNetwork,
}

impl NetworkPort {
    /// Node owning this port.
    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl Transport for NetworkPort {
    fn broadcast(&self, message: &WireMessage) -> Result<(), TransportError> {
        let frame = message
            .encode()
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        self.network.send(self.node, frame)
    }
}

impl PhysicalLink for NetworkPort {
    fn enable(&self, neighbor: NodeId) -> Result<(), LinkError> {
        self.network.state.write().disabled.remove(&(self.node, neighbor));
        Ok(())
    }

    fn disable(&self, neighbor: NodeId) -> Result<(), LinkError> {
        if neighbor == self.node {
            return Err(LinkError::Rejected(neighbor));
        }
        self.network.state.write().disabled.insert((self.node, neighbor));
        Ok(())
    }
}
