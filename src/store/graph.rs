//! In-memory bounded-radius graph with per-element LWW timestamps.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::types::{
    Edge, EdgeId, ElementKey, GraphElement, LocalView, NodeId, Timestamp, TimestampedEntry,
    Upsert,
};

/// Which edges a breadth-first expansion may follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Follow edges from start to end.
    Outgoing,
    /// Follow edges from end to start.
    Incoming,
    /// Follow edges either way.
    #[default]
    Both,
}

/// Graph of observed nodes and edges, keyed by [`ElementKey`].
///
/// The store is a flat per-key map: an edge may be present while one of its
/// endpoints is not, in which case it is invisible to views until the
/// endpoint arrives (or is evicted on its own timer). The local node is always
/// present and always fresh.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order.
#[derive(Debug, Clone)]
pub struct GraphStore {
    /// The node owning this store.
    local: NodeId,
    /// Elements by key.
    entries: BTreeMap<ElementKey, TimestampedEntry<GraphElement>>,
    /// Start -> ends of stored edges.
    successors: BTreeMap<NodeId, BTreeSet<NodeId>>,
    /// End -> starts of stored edges.
    predecessors: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl GraphStore {
    /// Create a store containing only the local node.
    pub fn new(local: NodeId) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            ElementKey::Node(local),
            TimestampedEntry::new(GraphElement::node(local), Timestamp::ZERO),
        );
        Self {
            local,
            entries,
            successors: BTreeMap::new(),
            predecessors: BTreeMap::new(),
        }
    }

    /// The node owning this store.
    pub fn local_node(&self) -> NodeId {
        self.local
    }

    fn is_local(&self, key: &ElementKey) -> bool {
        *key == ElementKey::Node(self.local)
    }

    /// Whether the element is stored.
    pub fn contains(&self, key: &ElementKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether the node is stored.
    pub fn contains_node(&self, node: &NodeId) -> bool {
        self.entries.contains_key(&ElementKey::Node(*node))
    }

    /// Stored value of an element.
    pub fn get(&self, key: &ElementKey) -> Option<&GraphElement> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Stored edge.
    pub fn edge(&self, id: &EdgeId) -> Option<Edge> {
        self.get(&ElementKey::Edge(*id)).and_then(GraphElement::as_edge)
    }

    /// Last time the element was seen. The local node reads as `now`.
    pub fn timestamp(&self, key: &ElementKey, now: Timestamp) -> Option<Timestamp> {
        if self.is_local(key) {
            return Some(now);
        }
        self.entries.get(key).map(|entry| entry.last_seen)
    }

    /// Age of the element at `now`. The local node's age is always zero.
    pub fn age(&self, key: &ElementKey, now: Timestamp) -> Option<Duration> {
        self.timestamp(key, now).map(|ts| ts.age_at(now))
    }

    /// Write an observation with LWW semantics.
    ///
    /// An absent element is inserted. A present element is replaced only if
    /// `ts` is strictly newer than the stored timestamp; ties keep the stored
    /// copy. Writes to the local node are ignored.
    pub fn upsert(&mut self, element: GraphElement, ts: Timestamp) -> Upsert {
        let key = element.key();
        if self.is_local(&key) {
            return Upsert::Kept;
        }

        match self.entries.get_mut(&key) {
            None => {
                self.entries.insert(key, TimestampedEntry::new(element, ts));
                if let ElementKey::Edge(id) = key {
                    self.index_edge(id);
                }
                Upsert::Inserted
            }
            Some(entry) if ts > entry.last_seen => {
                let value_changed = !entry.value.same_value(&element);
                entry.value = element;
                entry.last_seen = ts;
                Upsert::Replaced { value_changed }
            }
            Some(_) => Upsert::Kept,
        }
    }

    /// Remove an element. The local node cannot be removed.
    pub fn remove(&mut self, key: &ElementKey) -> Option<GraphElement> {
        if self.is_local(key) {
            return None;
        }
        let removed = self.entries.remove(key)?;
        if let ElementKey::Edge(id) = key {
            self.unindex_edge(id);
        }
        Some(removed.value)
    }

    fn index_edge(&mut self, id: EdgeId) {
        self.successors.entry(id.from).or_default().insert(id.to);
        self.predecessors.entry(id.to).or_default().insert(id.from);
    }

    fn unindex_edge(&mut self, id: &EdgeId) {
        if let Some(ends) = self.successors.get_mut(&id.from) {
            ends.remove(&id.to);
            if ends.is_empty() {
                self.successors.remove(&id.from);
            }
        }
        if let Some(starts) = self.predecessors.get_mut(&id.to) {
            starts.remove(&id.from);
            if starts.is_empty() {
                self.predecessors.remove(&id.to);
            }
        }
    }

    fn adjacent(&self, node: &NodeId, direction: Direction) -> Vec<NodeId> {
        let mut adjacent = Vec::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            if let Some(ends) = self.successors.get(node) {
                adjacent.extend(ends.iter().copied());
            }
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            if let Some(starts) = self.predecessors.get(node) {
                adjacent.extend(starts.iter().copied());
            }
        }
        adjacent
    }

    /// Subgraph reachable from `origin` within `radius` hops.
    ///
    /// Breadth-first over edges allowed by `direction`, visiting only stored
    /// nodes. The result holds every stored edge whose endpoints were both
    /// reached. Pure and deterministic for fixed store contents.
    pub fn bounded_view(&self, origin: NodeId, radius: usize, direction: Direction) -> LocalView {
        let mut view = LocalView::empty(origin, radius);
        if !self.contains_node(&origin) {
            return view;
        }

        view.nodes.insert(origin);
        let mut frontier = vec![origin];
        for _ in 0..radius {
            let mut next = Vec::new();
            for node in &frontier {
                for neighbor in self.adjacent(node, direction) {
                    if self.contains_node(&neighbor) && view.nodes.insert(neighbor) {
                        next.push(neighbor);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        for node in &view.nodes {
            let Some(ends) = self.successors.get(node) else {
                continue;
            };
            for end in ends {
                if !view.nodes.contains(end) {
                    continue;
                }
                let id = EdgeId::new(*node, *end);
                if let Some(edge) = self.edge(&id) {
                    view.edges.insert(id, edge);
                }
            }
        }

        view
    }

    /// Keys whose age at `now` is at least `horizon`. Never includes the
    /// local node.
    pub fn stale_keys(&self, now: Timestamp, horizon: Duration) -> Vec<ElementKey> {
        self.entries
            .iter()
            .filter(|(key, entry)| !self.is_local(key) && entry.age(now) >= horizon)
            .map(|(key, _)| *key)
            .collect()
    }

    /// All stored nodes.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.keys().filter_map(|key| match key {
            ElementKey::Node(id) => Some(*id),
            ElementKey::Edge(_) => None,
        })
    }

    /// All stored edges.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.entries.values().filter_map(|entry| entry.value.as_edge())
    }

    /// All entries with their raw timestamps (the local node's raw stamp is
    /// not meaningful; use [`timestamp`](Self::timestamp)).
    pub fn entries(&self) -> impl Iterator<Item = (&ElementKey, &TimestampedEntry<GraphElement>)> {
        self.entries.iter()
    }

    /// Number of stored elements, including the local node.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether only the local node is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }
}
