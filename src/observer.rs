//! Topology change notifications.
//!
//! Dispatch iterates over a snapshot of the subscriber list, so observers
//! added or removed while a notification is in flight only affect the next
//! one.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::types::NodeId;

/// What caused a topology change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeCause {
    /// A peer view was merged.
    Merge,
    /// An edge operation was applied.
    Operation,
    /// Neighbor reconciliation tombstoned a local link.
    Reconciliation,
    /// The collector evicted stale entries.
    Eviction,
}

impl fmt::Display for ChangeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Merge => "merge",
            Self::Operation => "operation",
            Self::Reconciliation => "reconciliation",
            Self::Eviction => "eviction",
        };
        f.write_str(label)
    }
}

/// A topology change on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyChange {
    /// Node whose view changed.
    pub node: NodeId,
    /// What caused it.
    pub cause: ChangeCause,
}

/// Receives topology change notifications.
pub trait TopologyObserver: Send + Sync {
    /// Called once per change.
    fn topology_changed(&self, change: &TopologyChange);
}

impl<F> TopologyObserver for F
where
    F: Fn(&TopologyChange) + Send + Sync,
{
    fn topology_changed(&self, change: &TopologyChange) {
        self(change)
    }
}

/// Handle returned by [`ObserverRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionHandle(u64);

/// Registered observers.
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: u64,
    observers: BTreeMap<u64, Arc<dyn TopologyObserver>>,
}

impl ObserverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer.
    pub fn subscribe(&mut self, observer: Arc<dyn TopologyObserver>) -> SubscriptionHandle {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.observers.insert(id, observer);
        SubscriptionHandle(id)
    }

    /// Remove an observer. Returns true if it was registered.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        self.observers.remove(&handle.0).is_some()
    }

    /// Notify every registered observer, in subscription order.
    pub fn notify(&self, change: TopologyChange) {
        let snapshot: Vec<Arc<dyn TopologyObserver>> = self.observers.values().cloned().collect();
        tracing::trace!(
            node = %change.node,
            cause = %change.cause,
            observers = snapshot.len(),
            "Dispatching topology change"
        );
        for observer in snapshot {
            observer.topology_changed(&change);
        }
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("next_id", &self.next_id)
            .field("observers", &self.observers.len())
            .finish()
    }
}
