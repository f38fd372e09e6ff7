//! TTL-bounded flooding of edge operations.
//!
//! ## State table
//!
//! | op | edge starts at self | action |
//! |----|---------------------|--------|
//! | Remove | yes | disable the physical link |
//! | Remove | no | tombstone the edge, stamped now |
//! | Add | yes | enable the physical link |
//! | Add | no | lift the tombstone |
//!
//! ## Termination
//!
//! Every reception decrements `hops_to_live` and only re-broadcasts while the
//! decremented value is at least one. The counter is never reset, so a
//! message originated with `h` hops is forwarded at most `h` times along any
//! path regardless of cycles. A message arriving with no hops left is still
//! applied; its counter stays at zero and it goes no further.

use crate::config::MonitorConfig;
use crate::types::{EdgeId, EdgeOperation, EdgeOperationMessage, NodeId, OperationalEdge};

/// Local effect of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeAction {
    /// Disable the local node's link to the neighbor.
    DisableLink(NodeId),
    /// Tombstone a remote edge.
    Tombstone(EdgeId),
    /// Enable the local node's link to the neighbor.
    EnableLink(NodeId),
    /// Lift the tombstone of a remote edge.
    Lift(EdgeId),
}

impl EdgeAction {
    /// Action for `operation` as seen by `local`.
    pub fn for_operation(operation: &OperationalEdge, local: NodeId) -> Self {
        let own = operation.edge.from == local;
        match (operation.op, own) {
            (EdgeOperation::Remove, true) => Self::DisableLink(operation.edge.to),
            (EdgeOperation::Remove, false) => Self::Tombstone(operation.edge),
            (EdgeOperation::Add, true) => Self::EnableLink(operation.edge.to),
            (EdgeOperation::Add, false) => Self::Lift(operation.edge),
        }
    }

    /// Whether the physical link layer must act.
    pub fn needs_link(&self) -> bool {
        matches!(self, Self::DisableLink(_) | Self::EnableLink(_))
    }
}

/// Result of receiving an operation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reception {
    /// Operations to apply locally, in canonical order.
    pub operations: Vec<OperationalEdge>,
    /// Decremented message to re-broadcast, if it still has hops left.
    pub forward: Option<EdgeOperationMessage>,
}

/// Originates and relays edge operation messages.
#[derive(Debug, Clone, Copy)]
pub struct EdgeOpFlooder {
    /// Hops-to-live of originated messages.
    initial_hops: u32,
}

impl EdgeOpFlooder {
    /// Create a flooder with the given initial hops-to-live.
    pub fn new(initial_hops: u32) -> Self {
        Self { initial_hops }
    }

    /// Create a flooder for a monitor configuration.
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.operation_hops)
    }

    /// Initial hops-to-live.
    pub fn initial_hops(&self) -> u32 {
        self.initial_hops
    }

    /// Wrap a locally requested operation for broadcast.
    pub fn originate(&self, operation: OperationalEdge) -> EdgeOperationMessage {
        EdgeOperationMessage::single(operation, self.initial_hops)
    }

    /// Consume one hop of a received message.
    pub fn receive(&self, message: &EdgeOperationMessage) -> Reception {
        let operations = message.operations.iter().copied().collect();
        let forward = message
            .decremented()
            .ok()
            .filter(EdgeOperationMessage::is_alive);
        Reception { operations, forward }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u128) -> NodeId {
        NodeId::from_u128(n)
    }

    #[test]
    fn test_state_table() {
        let local = id(1);
        let own = EdgeId::new(id(1), id(2));
        let remote = EdgeId::new(id(2), id(3));
        // An edge ending at self is not self-originated
        let incoming = EdgeId::new(id(2), id(1));

        assert_eq!(
            EdgeAction::for_operation(&OperationalEdge::remove(own), local),
            EdgeAction::DisableLink(id(2))
        );
        assert_eq!(
            EdgeAction::for_operation(&OperationalEdge::remove(remote), local),
            EdgeAction::Tombstone(remote)
        );
        assert_eq!(
            EdgeAction::for_operation(&OperationalEdge::add(own), local),
            EdgeAction::EnableLink(id(2))
        );
        assert_eq!(
            EdgeAction::for_operation(&OperationalEdge::add(remote), local),
            EdgeAction::Lift(remote)
        );
        assert_eq!(
            EdgeAction::for_operation(&OperationalEdge::remove(incoming), local),
            EdgeAction::Tombstone(incoming)
        );
    }

    #[test]
    fn test_originate_uses_initial_hops() {
        let flooder = EdgeOpFlooder::from_config(&MonitorConfig::default());
        let message = flooder.originate(OperationalEdge::remove(EdgeId::new(id(1), id(2))));
        assert_eq!(message.hops_to_live, 2);
        assert_eq!(message.operations.len(), 1);
    }

    #[test]
    fn test_flood_terminates() {
        let flooder = EdgeOpFlooder::new(2);
        let message = flooder.originate(OperationalEdge::remove(EdgeId::new(id(1), id(2))));

        // First relay: 2 -> 1, forwarded
        let first = flooder.receive(&message);
        assert_eq!(first.operations.len(), 1);
        let forwarded = first.forward.unwrap();
        assert_eq!(forwarded.hops_to_live, 1);

        // Second relay: 1 -> 0, applied but not forwarded
        let second = flooder.receive(&forwarded);
        assert_eq!(second.operations.len(), 1);
        assert!(second.forward.is_none());
    }

    #[test]
    fn test_forward_count_bounded_by_initial_hops() {
        for hops in 1..=6 {
            let flooder = EdgeOpFlooder::new(hops);
            let mut message = Some(flooder.originate(OperationalEdge::add(EdgeId::new(id(1), id(2)))));
            let mut forwards = 0;
            while let Some(current) = message {
                let reception = flooder.receive(&current);
                if reception.forward.is_some() {
                    forwards += 1;
                }
                message = reception.forward;
            }
            assert!(forwards < hops);
        }
    }

    #[test]
    fn test_exhausted_message_applied_not_forwarded() {
        let flooder = EdgeOpFlooder::new(2);
        let operation = OperationalEdge::add(EdgeId::new(id(1), id(2)));
        let mut message = flooder.originate(operation);
        message.hops_to_live = 0;

        let reception = flooder.receive(&message);
        assert_eq!(reception.operations, vec![operation]);
        assert!(reception.forward.is_none());
    }
}
