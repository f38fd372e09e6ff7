//! Wire messages exchanged between nodes.
//!
//! Two message kinds travel over the broadcast transport:
//!
//! | Message | Sent by | Purpose |
//! |---------|---------|---------|
//! | [`ViewMessage`] | beacon | anti-entropy snapshot of the (K-1)-local view |
//! | [`EdgeOperationMessage`] | flooder | TTL-bounded add/remove commands |
//!
//! Both are wrapped in [`WireMessage`] and encoded as JSON. Maps keyed by
//! structured identifiers are encoded as ordered `[key, value]` pair lists.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::edge::EdgeId;
use super::element::{ElementKey, GraphElement};
use super::time::Timestamp;

/// Error type for decoding and validating wire messages.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Bytes could not be decoded.
    #[error("Undecodable frame: {0}")]
    Decode(#[from] serde_json::Error),
    /// A subgraph element arrived without a freshness timestamp.
    #[error("Element without timestamp: {0}")]
    MissingElementTimestamp(ElementKey),
    /// A tombstoned edge arrived without a timestamp.
    #[error("Tombstone without timestamp: {0}")]
    MissingTombstoneTimestamp(EdgeId),
    /// An operation message arrived with no hops left.
    #[error("Edge operation message arrived with hops_to_live = 0")]
    DeadOperationMessage,
}

impl WireError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::MissingElementTimestamp(_) => "missing_element_timestamp",
            Self::MissingTombstoneTimestamp(_) => "missing_tombstone_timestamp",
            Self::DeadOperationMessage => "dead_operation_message",
        }
    }
}

mod pairs {
    //! Serialize a `BTreeMap` as a sequence of `[key, value]` pairs.

    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let pairs: Vec<(K, V)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

/// Anti-entropy snapshot broadcast by the beacon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewMessage {
    /// Nodes and edges of the sender's (K-1)-local view.
    pub subgraph: BTreeSet<GraphElement>,
    /// Freshness of each subgraph element.
    #[serde(with = "pairs")]
    pub element_timestamps: BTreeMap<ElementKey, Timestamp>,
    /// Tombstoned edges restricted to the subgraph.
    pub tombstone_edges: BTreeSet<EdgeId>,
    /// Freshness of each tombstone.
    #[serde(with = "pairs")]
    pub tombstone_timestamps: BTreeMap<EdgeId, Timestamp>,
}

impl ViewMessage {
    /// Empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element observed at `ts`.
    pub fn push_element(&mut self, element: GraphElement, ts: Timestamp) {
        self.element_timestamps.insert(element.key(), ts);
        self.subgraph.replace(element);
    }

    /// Add a tombstone observed at `ts`.
    pub fn push_tombstone(&mut self, edge: EdgeId, ts: Timestamp) {
        self.tombstone_edges.insert(edge);
        self.tombstone_timestamps.insert(edge, ts);
    }

    /// Check that every element and tombstone carries a timestamp.
    pub fn validate(&self) -> Result<(), WireError> {
        for element in &self.subgraph {
            if !self.element_timestamps.contains_key(&element.key()) {
                return Err(WireError::MissingElementTimestamp(element.key()));
            }
        }
        for edge in &self.tombstone_edges {
            if !self.tombstone_timestamps.contains_key(edge) {
                return Err(WireError::MissingTombstoneTimestamp(*edge));
            }
        }
        Ok(())
    }

    /// Elements paired with their timestamps. Elements without a timestamp
    /// are skipped; call [`validate`](Self::validate) first.
    pub fn elements(&self) -> impl Iterator<Item = (GraphElement, Timestamp)> + '_ {
        self.subgraph.iter().filter_map(|element| {
            self.element_timestamps
                .get(&element.key())
                .map(|ts| (*element, *ts))
        })
    }

    /// Tombstones paired with their timestamps.
    pub fn tombstones(&self) -> impl Iterator<Item = (EdgeId, Timestamp)> + '_ {
        self.tombstone_edges.iter().filter_map(|edge| {
            self.tombstone_timestamps.get(edge).map(|ts| (*edge, *ts))
        })
    }
}

/// Requested change to a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeOperation {
    /// Enable the link (lift its tombstone).
    Add,
    /// Disable the link (tombstone it).
    Remove,
}

impl std::fmt::Display for EdgeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// An edge together with the operation to perform on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationalEdge {
    /// Target link.
    pub edge: EdgeId,
    /// Operation.
    pub op: EdgeOperation,
}

impl OperationalEdge {
    /// Create a new operational edge.
    pub fn new(edge: EdgeId, op: EdgeOperation) -> Self {
        Self { edge, op }
    }

    /// Add operation on `edge`.
    pub fn add(edge: EdgeId) -> Self {
        Self::new(edge, EdgeOperation::Add)
    }

    /// Remove operation on `edge`.
    pub fn remove(edge: EdgeId) -> Self {
        Self::new(edge, EdgeOperation::Remove)
    }
}

/// Flooded batch of edge operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeOperationMessage {
    /// Operations carried by this message.
    pub operations: BTreeSet<OperationalEdge>,
    /// Remaining re-broadcasts.
    pub hops_to_live: u32,
}

impl EdgeOperationMessage {
    /// Wrap a single operation.
    pub fn single(operation: OperationalEdge, hops_to_live: u32) -> Self {
        Self {
            operations: BTreeSet::from([operation]),
            hops_to_live,
        }
    }

    /// Copy of this message with one hop consumed.
    ///
    /// Fails for a message that should never have been sent (no hops left).
    pub fn decremented(&self) -> Result<Self, WireError> {
        let hops_to_live = self
            .hops_to_live
            .checked_sub(1)
            .ok_or(WireError::DeadOperationMessage)?;
        Ok(Self {
            operations: self.operations.clone(),
            hops_to_live,
        })
    }

    /// Whether this message may still be re-broadcast.
    pub fn is_alive(&self) -> bool {
        self.hops_to_live >= 1
    }
}

/// Envelope for everything sent over the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum WireMessage {
    /// Beacon snapshot.
    View(ViewMessage),
    /// Flooded edge operations.
    EdgeOperation(EdgeOperationMessage),
}

impl WireMessage {
    /// Encode as JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from JSON bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::View(_) => "view",
            Self::EdgeOperation(_) => "edge_operation",
        }
    }
}

impl From<ViewMessage> for WireMessage {
    fn from(message: ViewMessage) -> Self {
        Self::View(message)
    }
}

impl From<EdgeOperationMessage> for WireMessage {
    fn from(message: EdgeOperationMessage) -> Self {
        Self::EdgeOperation(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    fn sample_view() -> ViewMessage {
        let a = NodeId::from_u128(1);
        let b = NodeId::from_u128(2);
        let mut message = ViewMessage::new();
        message.push_element(GraphElement::node(a), Timestamp::from_millis(10));
        message.push_element(GraphElement::node(b), Timestamp::from_millis(11));
        message.push_element(GraphElement::edge(a, b, 4.25), Timestamp::from_millis(12));
        message.push_tombstone(EdgeId::new(a, b), Timestamp::from_millis(13));
        message
    }

    #[test]
    fn test_view_message_wire_format() {
        let message = WireMessage::View(sample_view());
        let bytes = message.encode().unwrap();
        let decoded = WireMessage::decode(&bytes).unwrap();

        let WireMessage::View(view) = decoded else {
            panic!("expected a view message");
        };
        assert!(view.validate().is_ok());
        let edge = view
            .elements()
            .find_map(|(element, _)| element.as_edge())
            .unwrap();
        assert_eq!(edge.weight, 4.25);
        assert_eq!(view.tombstones().count(), 1);
    }

    #[test]
    fn test_validate_missing_element_timestamp() {
        let mut message = sample_view();
        let a = NodeId::from_u128(1);
        message.element_timestamps.remove(&ElementKey::Node(a));

        assert!(matches!(
            message.validate(),
            Err(WireError::MissingElementTimestamp(ElementKey::Node(id))) if id == a
        ));
    }

    #[test]
    fn test_validate_missing_tombstone_timestamp() {
        let mut message = sample_view();
        message.tombstone_timestamps.clear();

        assert!(matches!(
            message.validate(),
            Err(WireError::MissingTombstoneTimestamp(_))
        ));
    }

    #[test]
    fn test_decrement_stops_at_zero() {
        let edge = EdgeId::new(NodeId::from_u128(1), NodeId::from_u128(2));
        let message = EdgeOperationMessage::single(OperationalEdge::remove(edge), 1);

        let once = message.decremented().unwrap();
        assert_eq!(once.hops_to_live, 0);
        assert!(!once.is_alive());
        assert!(matches!(once.decremented(), Err(WireError::DeadOperationMessage)));
    }

    #[test]
    fn test_decode_garbage() {
        let err = WireMessage::decode(b"{not json").unwrap_err();
        assert_eq!(err.reason(), "decode");
    }
}
