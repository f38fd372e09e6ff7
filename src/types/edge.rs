//! Edge types for the topology view.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use super::node::NodeId;

/// Directed edge identifier: `(from, to)`.
///
/// Implements `Ord` for deterministic ordering: (from, to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId {
    /// Start node of the link.
    pub from: NodeId,
    /// End node of the link.
    pub to: NodeId,
}

impl EdgeId {
    /// Create a new edge identifier.
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self { from, to }
    }

    /// The same link in the opposite direction.
    pub fn reversed(&self) -> Self {
        Self::new(self.to, self.from)
    }

    /// Whether `node` is one of the two endpoints.
    pub fn is_incident_to(&self, node: NodeId) -> bool {
        self.from == node || self.to == node
    }

    /// The endpoint opposite to `node`, if `node` is an endpoint.
    pub fn other_end(&self, node: NodeId) -> Option<NodeId> {
        if self.from == node {
            Some(self.to)
        } else if self.to == node {
            Some(self.from)
        } else {
            None
        }
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

/// Weighted directed edge.
///
/// Equality, ordering and hashing consider only the identifier; the weight is
/// an attribute that LWW merges may refresh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Edge {
    /// Edge identifier.
    pub id: EdgeId,
    /// Link weight (distance reported by the transport).
    pub weight: f64,
}

impl Edge {
    /// Create a new weighted edge.
    pub fn new(from: NodeId, to: NodeId, weight: f64) -> Self {
        Self {
            id: EdgeId::new(from, to),
            weight,
        }
    }

    /// Start node.
    pub fn from(&self) -> NodeId {
        self.id.from
    }

    /// End node.
    pub fn to(&self) -> NodeId {
        self.id.to
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Edge {}

impl Hash for Edge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Edge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Edge {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_ordering() {
        let id1 = NodeId::from_u128(1);
        let id2 = NodeId::from_u128(2);
        let id3 = NodeId::from_u128(3);

        let e1 = EdgeId::new(id1, id2);
        let e2 = EdgeId::new(id1, id3);
        let e3 = EdgeId::new(id2, id3);

        // Same start, different end
        assert!(e1 < e2);
        // Different start
        assert!(e1 < e3);
        assert!(e2 < e3);
    }

    #[test]
    fn test_edge_equality_ignores_weight() {
        let a = NodeId::from_u128(1);
        let b = NodeId::from_u128(2);

        assert_eq!(Edge::new(a, b, 1.0), Edge::new(a, b, 7.5));
        assert_ne!(Edge::new(a, b, 1.0), Edge::new(b, a, 1.0));
    }

    #[test]
    fn test_other_end() {
        let a = NodeId::from_u128(1);
        let b = NodeId::from_u128(2);
        let c = NodeId::from_u128(3);
        let edge = EdgeId::new(a, b);

        assert_eq!(edge.other_end(a), Some(b));
        assert_eq!(edge.other_end(b), Some(a));
        assert_eq!(edge.other_end(c), None);
        assert_eq!(edge.reversed(), EdgeId::new(b, a));
    }
}
