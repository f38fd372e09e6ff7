//! Bounded-radius views handed to consumers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::canonical::{canonical_hash_hex, quantize_float};
use super::edge::{Edge, EdgeId};
use super::node::NodeId;

/// Subgraph reachable from an origin within a fixed number of hops.
///
/// Contains every stored edge whose both endpoints are in `nodes`.
/// Iteration order is canonical (by identifier).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalView {
    /// Node the view was computed from.
    pub origin: NodeId,
    /// Hop radius.
    pub radius: usize,
    /// Nodes within the radius.
    pub nodes: BTreeSet<NodeId>,
    /// Edges between those nodes.
    pub edges: BTreeMap<EdgeId, Edge>,
}

/// Quantized, hash-stable form of a view.
#[derive(Serialize)]
struct CanonicalView<'a> {
    nodes: Vec<&'a NodeId>,
    edges: Vec<(&'a EdgeId, i64)>,
}

impl LocalView {
    /// Empty view around `origin`.
    pub fn empty(origin: NodeId, radius: usize) -> Self {
        Self {
            origin,
            radius,
            nodes: BTreeSet::new(),
            edges: BTreeMap::new(),
        }
    }

    /// Whether the node is part of the view.
    pub fn contains_node(&self, node: &NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// Whether the edge is part of the view.
    pub fn contains_edge(&self, edge: &EdgeId) -> bool {
        self.edges.contains_key(edge)
    }

    /// Weight of an edge in the view.
    pub fn weight(&self, edge: &EdgeId) -> Option<f64> {
        self.edges.get(edge).map(|e| e.weight)
    }

    /// Edges in canonical order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Edges leaving `node`.
    pub fn outgoing_edges(&self, node: NodeId) -> BTreeSet<Edge> {
        self.edges
            .values()
            .filter(|e| e.from() == node)
            .copied()
            .collect()
    }

    /// Successors of `node` within the view.
    pub fn successors(&self, node: NodeId) -> BTreeSet<NodeId> {
        self.edges
            .values()
            .filter(|e| e.from() == node)
            .map(|e| e.to())
            .collect()
    }

    /// Nodes adjacent to `node` in either direction.
    pub fn adjacent_nodes(&self, node: NodeId) -> BTreeSet<NodeId> {
        self.edges
            .keys()
            .filter_map(|id| id.other_end(node))
            .filter(|other| *other != node)
            .collect()
    }

    /// Drop an edge from the view. Returns true if it was present.
    pub fn remove_edge(&mut self, edge: &EdgeId) -> bool {
        self.edges.remove(edge).is_some()
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Deterministic fingerprint of the view's contents.
    ///
    /// Independent of `origin` and `radius`: two nodes holding the same
    /// subgraph report the same fingerprint. Weights are quantized.
    pub fn fingerprint(&self) -> String {
        let canonical = CanonicalView {
            nodes: self.nodes.iter().collect(),
            edges: self
                .edges
                .iter()
                .map(|(id, e)| (id, quantize_float(e.weight)))
                .collect(),
        };
        canonical_hash_hex(&canonical)
    }
}
