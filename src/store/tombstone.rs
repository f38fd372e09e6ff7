//! Logically deleted edges.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::types::{EdgeId, LocalView, NodeId, Timestamp, TimestampedEntry, Upsert};

/// Set of tombstoned edges with their own LWW timestamps.
///
/// A tombstone hides an edge from the logical view without touching the
/// underlying observation in the graph store. The start node of an edge is
/// authoritative for it, so tombstones of edges leaving the local node are
/// stamped `now` when read for gossip. Eviction always ages the stored stamp.
#[derive(Debug, Clone)]
pub struct TombstoneStore {
    /// The node owning this store.
    local: NodeId,
    /// Tombstones by edge.
    entries: BTreeMap<EdgeId, TimestampedEntry<()>>,
}

impl TombstoneStore {
    /// Create an empty store.
    pub fn new(local: NodeId) -> Self {
        Self {
            local,
            entries: BTreeMap::new(),
        }
    }

    fn is_authoritative(&self, edge: &EdgeId) -> bool {
        edge.from == self.local
    }

    /// Whether the edge is tombstoned.
    pub fn contains(&self, edge: &EdgeId) -> bool {
        self.entries.contains_key(edge)
    }

    /// Stamp to gossip for the tombstone. Tombstones on the local node's own
    /// outgoing edges read as `now`.
    pub fn timestamp(&self, edge: &EdgeId, now: Timestamp) -> Option<Timestamp> {
        let entry = self.entries.get(edge)?;
        if self.is_authoritative(edge) {
            Some(now)
        } else {
            Some(entry.last_seen)
        }
    }

    /// Stamp recorded by the last insert, own tombstones included.
    pub fn last_seen(&self, edge: &EdgeId) -> Option<Timestamp> {
        self.entries.get(edge).map(|entry| entry.last_seen)
    }

    /// Age of the stored stamp at `now`.
    pub fn age(&self, edge: &EdgeId, now: Timestamp) -> Option<Duration> {
        self.last_seen(edge).map(|ts| ts.age_at(now))
    }

    /// Tombstone an edge with LWW semantics.
    pub fn insert(&mut self, edge: EdgeId, ts: Timestamp) -> Upsert {
        match self.entries.get_mut(&edge) {
            None => {
                self.entries.insert(edge, TimestampedEntry::new((), ts));
                Upsert::Inserted
            }
            Some(entry) if ts > entry.last_seen => {
                entry.last_seen = ts;
                Upsert::Replaced { value_changed: false }
            }
            Some(_) => Upsert::Kept,
        }
    }

    /// Lift a tombstone. Returns true if one was present.
    ///
    /// Lifting does not record a timestamp: a peer that still carries a
    /// fresh copy of the tombstone can reinstate it on its next beacon.
    pub fn lift(&mut self, edge: &EdgeId) -> bool {
        self.entries.remove(edge).is_some()
    }

    /// Tombstones on edges of `view`, with their timestamps at `now`.
    pub fn restricted_to(&self, view: &LocalView, now: Timestamp) -> Vec<(EdgeId, Timestamp)> {
        view.edges
            .keys()
            .filter_map(|edge| self.timestamp(edge, now).map(|ts| (*edge, ts)))
            .collect()
    }

    /// Nodes at the other end of tombstoned edges touching the local node.
    pub fn incident_neighbors(&self) -> BTreeSet<NodeId> {
        self.entries
            .keys()
            .filter_map(|edge| edge.other_end(self.local))
            .filter(|node| *node != self.local)
            .collect()
    }

    /// Edges whose stored stamp is at least `horizon` old at `now`.
    pub fn stale_edges(&self, now: Timestamp, horizon: Duration) -> Vec<EdgeId> {
        self.entries
            .keys()
            .filter(|edge| self.age(edge, now).is_some_and(|age| age >= horizon))
            .copied()
            .collect()
    }

    /// All tombstoned edges.
    pub fn edges(&self) -> impl Iterator<Item = &EdgeId> {
        self.entries.keys()
    }

    /// Number of tombstones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no tombstones.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
