//! Read-only queries over the stores.
//!
//! The underlay view is the bounded graph as observed. The logical view is
//! the same subgraph with every tombstoned edge removed at query time, so
//! it reflects the tombstone store exactly.

use std::collections::BTreeSet;

use crate::config::MonitorConfig;
use crate::store::{Direction, GraphStore, TombstoneStore};
use crate::types::{Edge, EdgeId, LocalView, NodeId, OperationalEdge, TopologyKind};

/// Derives views, neighbor sets and candidate operations.
#[derive(Debug, Clone, Copy)]
pub struct ViewQuery {
    /// View radius K.
    k: usize,
}

impl ViewQuery {
    /// Create a query helper with radius `k`.
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    /// Create a query helper for a monitor configuration.
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.k)
    }

    /// K-local view of the local node in the requested topology.
    pub fn local_view(
        &self,
        graph: &GraphStore,
        tombstones: &TombstoneStore,
        kind: TopologyKind,
    ) -> LocalView {
        let mut view = graph.bounded_view(graph.local_node(), self.k, Direction::Both);
        if kind == TopologyKind::Logical {
            for edge in tombstones.edges() {
                view.remove_edge(edge);
            }
        }
        view
    }

    /// Outgoing edges of the local node in the requested topology.
    pub fn neighbors(
        &self,
        graph: &GraphStore,
        tombstones: &TombstoneStore,
        kind: TopologyKind,
    ) -> BTreeSet<Edge> {
        self.local_view(graph, tombstones, kind)
            .outgoing_edges(graph.local_node())
    }

    /// Successor nodes of the local node in the requested topology.
    pub fn neighbor_nodes(
        &self,
        graph: &GraphStore,
        tombstones: &TombstoneStore,
        kind: TopologyKind,
    ) -> BTreeSet<NodeId> {
        self.local_view(graph, tombstones, kind)
            .successors(graph.local_node())
    }

    /// Operations that make sense around the local node.
    ///
    /// Candidates are the underlay edges between the local node and its
    /// one-hop neighbors (either direction). Tombstoned edges are offered as
    /// `Add`, live ones as `Remove`.
    pub fn possible_edge_operations(
        &self,
        graph: &GraphStore,
        tombstones: &TombstoneStore,
    ) -> Vec<OperationalEdge> {
        let local = graph.local_node();
        let around = graph.bounded_view(local, 1, Direction::Both);
        around
            .edges
            .keys()
            .map(|edge: &EdgeId| {
                if tombstones.contains(edge) {
                    OperationalEdge::add(*edge)
                } else {
                    OperationalEdge::remove(*edge)
                }
            })
            .collect()
    }
}
