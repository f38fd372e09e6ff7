//! Graph elements: the unit of gossip.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use super::edge::{Edge, EdgeId};
use super::node::NodeId;

/// Identifier of a graph element, used as the store key.
///
/// Nodes order before edges; within a kind, identifiers order naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKey {
    /// A node.
    Node(NodeId),
    /// A directed edge.
    Edge(EdgeId),
}

impl std::fmt::Display for ElementKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node(id) => write!(f, "node:{}", id),
            Self::Edge(id) => write!(f, "edge:{}", id),
        }
    }
}

/// A node or a weighted edge.
///
/// Equality, ordering and hashing follow [`ElementKey`], so two observations
/// of the same edge with different weights are the same element.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphElement {
    /// Node reference.
    Node {
        /// Node identifier.
        id: NodeId,
    },
    /// Edge reference with its weight.
    Edge {
        /// Edge identifier.
        id: EdgeId,
        /// Link weight.
        weight: f64,
    },
}

impl GraphElement {
    /// Node element.
    pub fn node(id: NodeId) -> Self {
        Self::Node { id }
    }

    /// Edge element.
    pub fn edge(from: NodeId, to: NodeId, weight: f64) -> Self {
        Self::Edge {
            id: EdgeId::new(from, to),
            weight,
        }
    }

    /// Store key of this element.
    pub fn key(&self) -> ElementKey {
        match self {
            Self::Node { id } => ElementKey::Node(*id),
            Self::Edge { id, .. } => ElementKey::Edge(*id),
        }
    }

    /// The edge, if this element is one.
    pub fn as_edge(&self) -> Option<Edge> {
        match self {
            Self::Edge { id, weight } => Some(Edge { id: *id, weight: *weight }),
            Self::Node { .. } => None,
        }
    }

    /// Whether both elements carry identical attributes (not just identity).
    pub fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Node { id: a }, Self::Node { id: b }) => a == b,
            (Self::Edge { id: a, weight: wa }, Self::Edge { id: b, weight: wb }) => {
                a == b && wa.to_bits() == wb.to_bits()
            }
            _ => false,
        }
    }
}

impl From<Edge> for GraphElement {
    fn from(edge: Edge) -> Self {
        Self::Edge {
            id: edge.id,
            weight: edge.weight,
        }
    }
}

impl PartialEq for GraphElement {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for GraphElement {}

impl Hash for GraphElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for GraphElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GraphElement {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}
