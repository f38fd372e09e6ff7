//! Per-node topology monitor.
//!
//! ## Lifecycle
//!
//! ```text
//! initialize ──► beacon / handle_message / collect_stale / queries ──► shutdown
//! ```
//!
//! All handling is serialized through `&mut self`. A driver (the tokio
//! runtime, a simulator or a test) calls [`TopologyMonitor::beacon`] on the
//! delays it returns, [`TopologyMonitor::collect_stale`] on the collector
//! schedule, and [`TopologyMonitor::handle_message`] for every inbound frame.
//!
//! ## Inbound handling
//!
//! 1. Merge the view, or apply the edge operations and forward
//! 2. Reconcile neighbors: every tombstoned edge touching the local node
//!    disables the link to the other end and tombstones `self -> other`
//! 3. Notify observers once if anything changed

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::beacon::BeaconEngine;
use crate::collaborators::{Clock, LinkError, PhysicalLink, RandomSource, StdRandom, Transport};
use crate::collector::{CollectReport, StalenessCollector};
use crate::config::{ConfigError, MonitorConfig};
use crate::flood::{EdgeAction, EdgeOpFlooder};
use crate::merge::MergeEngine;
use crate::metrics::{Metric, MonitorMetrics, NoOpMetrics};
use crate::observer::{ChangeCause, ObserverRegistry, SubscriptionHandle, TopologyChange, TopologyObserver};
use crate::query::ViewQuery;
use crate::store::{GraphStore, TombstoneStore};
use crate::types::{
    Edge, EdgeId, EdgeOperationMessage, LocalView, NodeId, OperationalEdge, Timestamp,
    TopologyKind, UnknownTopology, ViewMessage, WireError, WireMessage,
};

/// Error type for monitor operations.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Unrecognized topology identifier.
    #[error(transparent)]
    UnknownTopology(#[from] UnknownTopology),
    /// Adaptation requested on a topology that cannot be adapted.
    #[error("Topology {0} is not adaptable")]
    NotAdaptable(TopologyKind),
    /// No physical link collaborator is available for an authoritative action.
    #[error("No physical link available to act on neighbor {0}")]
    LinkUnavailable(NodeId),
    /// The physical link rejected an action.
    #[error("Link action failed: {0}")]
    Link(#[from] LinkError),
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// Malformed inbound message.
    #[error("Dropped message: {0}")]
    Wire(#[from] WireError),
}

/// Collaborators injected into a monitor.
pub struct Collaborators {
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Beacon jitter source.
    pub random: Box<dyn RandomSource>,
    /// One-hop broadcast.
    pub transport: Arc<dyn Transport>,
    /// Physical link layer, if this node can adapt its links.
    pub link: Option<Arc<dyn PhysicalLink>>,
    /// Metrics sink.
    pub metrics: Arc<dyn MonitorMetrics>,
}

impl Collaborators {
    /// Collaborators with an entropy-seeded random source, no physical link
    /// and no-op metrics.
    pub fn new(clock: Arc<dyn Clock>, transport: Arc<dyn Transport>) -> Self {
        Self {
            clock,
            random: Box::new(StdRandom::from_entropy()),
            transport,
            link: None,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Replace the random source.
    pub fn with_random(mut self, random: impl RandomSource + 'static) -> Self {
        self.random = Box::new(random);
        self
    }

    /// Attach a physical link layer.
    pub fn with_link(mut self, link: Arc<dyn PhysicalLink>) -> Self {
        self.link = Some(link);
        self
    }

    /// Replace the metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn MonitorMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("has_link", &self.link.is_some())
            .finish_non_exhaustive()
    }
}

/// Distributed topology monitor of one node.
pub struct TopologyMonitor {
    local: NodeId,
    config: MonitorConfig,
    graph: GraphStore,
    tombstones: TombstoneStore,
    merge: MergeEngine,
    beacon: BeaconEngine,
    flooder: EdgeOpFlooder,
    collector: StalenessCollector,
    query: ViewQuery,
    observers: ObserverRegistry,
    collaborators: Collaborators,
    running: bool,
}

impl TopologyMonitor {
    /// Create a running monitor whose graph holds only the local node.
    pub fn initialize(
        local: NodeId,
        config: MonitorConfig,
        collaborators: Collaborators,
    ) -> Result<Self, MonitorError> {
        config.validate()?;

        tracing::info!(
            node = %local,
            k = config.k,
            beacon_interval_ms = config.beacon_interval_ms,
            horizon_ms = config.eviction_horizon().as_millis() as u64,
            params_hash = %config.params_hash(),
            "Topology monitor initialized"
        );

        Ok(Self {
            local,
            graph: GraphStore::new(local),
            tombstones: TombstoneStore::new(local),
            merge: MergeEngine::from_config(&config),
            beacon: BeaconEngine::from_config(&config),
            flooder: EdgeOpFlooder::from_config(&config),
            collector: StalenessCollector::from_config(&config),
            query: ViewQuery::from_config(&config),
            observers: ObserverRegistry::new(),
            collaborators,
            config,
            running: true,
        })
    }

    /// Stop beaconing and ignore further inbound messages.
    pub fn shutdown(&mut self) {
        if self.running {
            self.running = false;
            tracing::info!(node = %self.local, "Topology monitor shut down");
        }
    }

    /// Whether the monitor has not been shut down.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The local node.
    pub fn local_node(&self) -> NodeId {
        self.local
    }

    /// Topologies served by this monitor.
    pub fn topology_kinds(&self) -> &'static [TopologyKind] {
        &TopologyKind::ALL
    }

    /// Parse a topology identifier.
    pub fn topology(&self, identifier: &str) -> Result<TopologyKind, MonitorError> {
        Ok(identifier.parse::<TopologyKind>()?)
    }

    /// Configuration in use.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Observed graph.
    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    /// Tombstoned edges.
    pub fn tombstones(&self) -> &TombstoneStore {
        &self.tombstones
    }

    /// Current time on the injected clock.
    pub fn now(&self) -> Timestamp {
        self.collaborators.clock.now()
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Register an observer for topology changes.
    pub fn add_topology_observer(&mut self, observer: Arc<dyn TopologyObserver>) -> SubscriptionHandle {
        self.observers.subscribe(observer)
    }

    /// Unregister an observer. Returns true if it was registered.
    pub fn remove_topology_observer(&mut self, handle: SubscriptionHandle) -> bool {
        self.observers.unsubscribe(handle)
    }

    fn notify(&self, cause: ChangeCause) {
        self.observers.notify(TopologyChange {
            node: self.local,
            cause,
        });
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// K-local view in the requested topology.
    pub fn local_view(&self, kind: TopologyKind) -> LocalView {
        self.query.local_view(&self.graph, &self.tombstones, kind)
    }

    /// Outgoing edges of the local node in the requested topology.
    pub fn neighbors(&self, kind: TopologyKind) -> BTreeSet<Edge> {
        self.query.neighbors(&self.graph, &self.tombstones, kind)
    }

    /// Successor nodes of the local node in the requested topology.
    pub fn neighbor_nodes(&self, kind: TopologyKind) -> BTreeSet<NodeId> {
        self.query.neighbor_nodes(&self.graph, &self.tombstones, kind)
    }

    /// Operations the local node may perform around itself.
    pub fn possible_edge_operations(&self, kind: TopologyKind) -> Result<Vec<OperationalEdge>, MonitorError> {
        Self::require_adaptable(kind)?;
        Ok(self.query.possible_edge_operations(&self.graph, &self.tombstones))
    }

    // ------------------------------------------------------------------
    // Adaptation
    // ------------------------------------------------------------------

    fn require_adaptable(kind: TopologyKind) -> Result<(), MonitorError> {
        if kind.is_adaptable() {
            Ok(())
        } else {
            Err(MonitorError::NotAdaptable(kind))
        }
    }

    fn require_link(&self, neighbor: NodeId) -> Result<Arc<dyn PhysicalLink>, MonitorError> {
        self.collaborators.link.clone().ok_or_else(|| {
            tracing::warn!(node = %self.local, neighbor = %neighbor, "No physical link available");
            self.collaborators
                .metrics
                .record(Metric::LinkActionsFailed, &[("action", "unavailable")]);
            MonitorError::LinkUnavailable(neighbor)
        })
    }

    fn link_failed(&self, error: &LinkError, action: &'static str) {
        tracing::warn!(node = %self.local, error = %error, action, "Physical link action failed");
        self.collaborators
            .metrics
            .record(Metric::LinkActionsFailed, &[("action", action)]);
    }

    /// Apply one action locally. Returns whether the topology changed.
    fn apply(&mut self, action: EdgeAction, now: Timestamp) -> Result<bool, MonitorError> {
        let changed = match action {
            EdgeAction::DisableLink(neighbor) => {
                let link = self.require_link(neighbor)?;
                link.disable(neighbor).map_err(|e| {
                    self.link_failed(&e, "disable");
                    e
                })?;
                self.tombstones
                    .insert(EdgeId::new(self.local, neighbor), now)
                    .changed_topology()
            }
            EdgeAction::EnableLink(neighbor) => {
                let link = self.require_link(neighbor)?;
                link.enable(neighbor).map_err(|e| {
                    self.link_failed(&e, "enable");
                    e
                })?;
                self.tombstones.lift(&EdgeId::new(self.local, neighbor))
            }
            EdgeAction::Tombstone(edge) => self.tombstones.insert(edge, now).changed_topology(),
            EdgeAction::Lift(edge) => self.tombstones.lift(&edge),
        };
        tracing::debug!(node = %self.local, action = ?action, changed, "Applied edge action");
        Ok(changed)
    }

    /// Disable the local link to `neighbor` and tombstone it. Local only.
    pub fn remove_neighbor(&mut self, kind: TopologyKind, neighbor: NodeId) -> Result<(), MonitorError> {
        Self::require_adaptable(kind)?;
        let now = self.now();
        if self.apply(EdgeAction::DisableLink(neighbor), now)? {
            self.notify(ChangeCause::Operation);
        }
        Ok(())
    }

    /// Enable the local link to `neighbor` and lift its tombstone. Local only.
    pub fn add_neighbor(&mut self, kind: TopologyKind, neighbor: NodeId) -> Result<(), MonitorError> {
        Self::require_adaptable(kind)?;
        let now = self.now();
        if self.apply(EdgeAction::EnableLink(neighbor), now)? {
            self.notify(ChangeCause::Operation);
        }
        Ok(())
    }

    /// Apply an edge operation locally and flood it.
    ///
    /// Operations on the local node's own links go through the physical
    /// link; if that fails nothing is broadcast.
    pub fn perform_operation(&mut self, kind: TopologyKind, operation: OperationalEdge) -> Result<(), MonitorError> {
        Self::require_adaptable(kind)?;
        let now = self.now();

        let action = EdgeAction::for_operation(&operation, self.local);
        if self.apply(action, now)? {
            self.notify(ChangeCause::Operation);
        }

        tracing::info!(
            node = %self.local,
            edge = %operation.edge,
            op = %operation.op,
            hops = self.flooder.initial_hops(),
            "Originating edge operation"
        );
        let message = self.flooder.originate(operation);
        self.send_operation(message, "local");
        Ok(())
    }

    fn send_operation(&self, message: EdgeOperationMessage, origin: &'static str) {
        if self.broadcast(&WireMessage::EdgeOperation(message)) {
            self.collaborators
                .metrics
                .record(Metric::OperationalMessagesSent, &[("origin", origin)]);
        }
    }

    fn broadcast(&self, message: &WireMessage) -> bool {
        match self.collaborators.transport.broadcast(message) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(node = %self.local, kind = message.kind(), error = %e, "Broadcast failed");
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Schedules
    // ------------------------------------------------------------------

    /// Broadcast a beacon and return the delay until the next one.
    ///
    /// Returns `None` once the monitor is shut down.
    pub fn beacon(&mut self) -> Option<Duration> {
        if !self.running {
            return None;
        }
        let now = self.now();
        let message = self.beacon.build(&self.graph, &self.tombstones, now);
        let elements = message.subgraph.len();
        let tombstones = message.tombstone_edges.len();

        if self.broadcast(&WireMessage::View(message)) {
            self.collaborators.metrics.record(Metric::BeaconsSent, &[]);
            tracing::debug!(node = %self.local, elements, tombstones, "Beacon sent");
        }
        Some(self.beacon.next_delay(self.collaborators.random.as_mut()))
    }

    /// Evict stale entries now.
    pub fn collect_stale(&mut self) -> CollectReport {
        let now = self.now();
        let report = self.collector.collect(&mut self.graph, &mut self.tombstones, now);
        let metrics = &self.collaborators.metrics;
        if report.evicted_elements > 0 {
            metrics.increment_by(
                Metric::EntriesEvicted.metric_name(),
                &[("store", "graph")],
                report.evicted_elements as u64,
            );
        }
        if report.evicted_tombstones > 0 {
            metrics.increment_by(
                Metric::EntriesEvicted.metric_name(),
                &[("store", "tombstones")],
                report.evicted_tombstones as u64,
            );
        }
        if report.changed() {
            self.notify(ChangeCause::Eviction);
        }
        report
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Decode and handle a raw frame. Undecodable frames are dropped.
    pub fn handle_frame(&mut self, sender: NodeId, distance: f64, frame: &[u8]) -> Result<(), MonitorError> {
        match WireMessage::decode(frame) {
            Ok(message) => self.handle_message(sender, distance, message),
            Err(e) => Err(self.dropped(sender, e)),
        }
    }

    /// Handle a message received from `sender` at `distance`.
    pub fn handle_message(&mut self, sender: NodeId, distance: f64, message: WireMessage) -> Result<(), MonitorError> {
        if !self.running {
            tracing::debug!(node = %self.local, sender = %sender, "Ignoring message after shutdown");
            return Ok(());
        }
        let now = self.now();

        let cause = match message {
            WireMessage::View(view) => self.handle_view(sender, distance, &view, now)?,
            WireMessage::EdgeOperation(ops) => self.handle_operations(sender, &ops, now),
        };
        let reconciled = self.reconcile(now);

        match (cause, reconciled) {
            (Some(cause), _) => self.notify(cause),
            (None, true) => self.notify(ChangeCause::Reconciliation),
            (None, false) => {}
        }
        Ok(())
    }

    fn dropped(&self, sender: NodeId, error: WireError) -> MonitorError {
        tracing::warn!(
            node = %self.local,
            sender = %sender,
            reason = error.reason(),
            error = %error,
            "Dropping malformed message"
        );
        self.collaborators
            .metrics
            .record(Metric::MessagesDropped, &[("reason", error.reason())]);
        MonitorError::Wire(error)
    }

    fn handle_view(
        &mut self,
        sender: NodeId,
        distance: f64,
        view: &ViewMessage,
        now: Timestamp,
    ) -> Result<Option<ChangeCause>, MonitorError> {
        let report = self
            .merge
            .merge(&mut self.graph, &mut self.tombstones, view, sender, distance, now)
            .map_err(|e| self.dropped(sender, e))?;

        let changed = report.changed();
        self.collaborators.metrics.record(
            Metric::ViewsMerged,
            &[("changed", if changed { "true" } else { "false" })],
        );
        Ok(changed.then_some(ChangeCause::Merge))
    }

    fn handle_operations(
        &mut self,
        sender: NodeId,
        message: &EdgeOperationMessage,
        now: Timestamp,
    ) -> Option<ChangeCause> {
        let reception = self.flooder.receive(message);

        let mut changed = false;
        for operation in &reception.operations {
            let action = EdgeAction::for_operation(operation, self.local);
            match self.apply(action, now) {
                Ok(applied) => changed |= applied,
                Err(e) => tracing::warn!(
                    node = %self.local,
                    sender = %sender,
                    edge = %operation.edge,
                    error = %e,
                    "Skipping edge operation"
                ),
            }
        }

        if let Some(forward) = reception.forward {
            tracing::debug!(node = %self.local, hops = forward.hops_to_live, "Forwarding edge operations");
            self.send_operation(forward, "forward");
        }
        changed.then_some(ChangeCause::Operation)
    }

    /// Disable links to every node sharing a tombstoned edge with the local
    /// node and tombstone `self -> node`.
    fn reconcile(&mut self, now: Timestamp) -> bool {
        let mut changed = false;
        for neighbor in self.tombstones.incident_neighbors() {
            let Some(link) = self.collaborators.link.clone() else {
                tracing::warn!(node = %self.local, neighbor = %neighbor, "Cannot reconcile without a physical link");
                continue;
            };
            if let Err(e) = link.disable(neighbor) {
                self.link_failed(&e, "disable");
                continue;
            }
            changed |= self
                .tombstones
                .insert(EdgeId::new(self.local, neighbor), now)
                .changed_topology();
        }
        changed
    }
}

impl fmt::Debug for TopologyMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopologyMonitor")
            .field("local", &self.local)
            .field("config", &self.config)
            .field("elements", &self.graph.len())
            .field("tombstones", &self.tombstones.len())
            .field("observers", &self.observers.len())
            .field("running", &self.running)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{LinkAction, ManualClock, RecordingLink, RecordingTransport};
    use crate::metrics::TestMetrics;
    use crate::types::{EdgeOperation, GraphElement};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn id(n: u128) -> NodeId {
        NodeId::from_u128(n)
    }

    struct Harness {
        monitor: TopologyMonitor,
        clock: Arc<ManualClock>,
        transport: Arc<RecordingTransport>,
        link: Arc<RecordingLink>,
        metrics: Arc<TestMetrics>,
    }

    fn harness(local: u128) -> Harness {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
        let transport = Arc::new(RecordingTransport::new());
        let link = Arc::new(RecordingLink::new());
        let metrics = Arc::new(TestMetrics::default());
        let collaborators = Collaborators::new(clock.clone(), transport.clone())
            .with_random(StdRandom::seeded(local as u64))
            .with_link(link.clone())
            .with_metrics(metrics.clone());
        let monitor = TopologyMonitor::initialize(id(local), MonitorConfig::minimal(), collaborators).unwrap();
        Harness {
            monitor,
            clock,
            transport,
            link,
            metrics,
        }
    }

    fn counting_observer(monitor: &mut TopologyMonitor) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        monitor.add_topology_observer(Arc::new(move |_: &TopologyChange| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        calls
    }

    /// Deliver everything `from` broadcast so far to `to`.
    fn deliver(from: &Harness, to: &mut Harness) {
        let sender = from.monitor.local_node();
        for message in from.transport.drain() {
            let _ = to.monitor.handle_message(sender, 1.0, message);
        }
    }

    #[test]
    fn test_initialize_rejects_invalid_config() {
        let clock = Arc::new(ManualClock::default());
        let transport = Arc::new(RecordingTransport::new());
        let config = MonitorConfig::new(0, Duration::from_secs(5));
        let result = TopologyMonitor::initialize(id(1), config, Collaborators::new(clock, transport));
        assert!(matches!(result, Err(MonitorError::Config(ConfigError::InvalidRadius(0)))));
    }

    #[test]
    fn test_initial_view_is_local_node_only() {
        let h = harness(1);
        let view = h.monitor.local_view(TopologyKind::Logical);
        assert_eq!(view.nodes, BTreeSet::from([id(1)]));
        assert!(h.monitor.neighbors(TopologyKind::Underlay).is_empty());
        assert_eq!(h.monitor.topology_kinds().len(), 2);
    }

    #[test]
    fn test_unknown_topology_identifier() {
        let h = harness(1);
        assert!(matches!(h.monitor.topology("wifi"), Err(MonitorError::UnknownTopology(_))));
        assert_eq!(h.monitor.topology("Logical").unwrap(), TopologyKind::Logical);
    }

    #[test]
    fn test_beacon_and_merge_between_two_nodes() {
        let mut a = harness(1);
        let mut b = harness(2);
        let calls = counting_observer(&mut b.monitor);

        let delay = a.monitor.beacon().unwrap();
        assert!(delay >= Duration::from_secs(3) && delay <= Duration::from_secs(7));
        deliver(&a, &mut b);

        assert_eq!(b.monitor.neighbor_nodes(TopologyKind::Underlay), BTreeSet::new());
        assert!(b.monitor.local_view(TopologyKind::Underlay).contains_edge(&EdgeId::new(id(1), id(2))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.metrics.get_count(Metric::BeaconsSent), 1);
        assert_eq!(b.metrics.get_count(Metric::ViewsMerged), 1);

        // Same beacon again is a no-op for observers
        a.monitor.beacon();
        deliver(&a, &mut b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        b.monitor.beacon();
        deliver(&b, &mut a);
        assert_eq!(a.monitor.neighbor_nodes(TopologyKind::Logical), BTreeSet::from([id(2)]));
    }

    #[test]
    fn test_underlay_rejects_adaptation() {
        let mut h = harness(1);
        let op = OperationalEdge::remove(EdgeId::new(id(1), id(2)));

        assert!(matches!(
            h.monitor.perform_operation(TopologyKind::Underlay, op),
            Err(MonitorError::NotAdaptable(TopologyKind::Underlay))
        ));
        assert!(matches!(
            h.monitor.remove_neighbor(TopologyKind::Underlay, id(2)),
            Err(MonitorError::NotAdaptable(_))
        ));
        assert!(matches!(
            h.monitor.possible_edge_operations(TopologyKind::Underlay),
            Err(MonitorError::NotAdaptable(_))
        ));
        assert!(h.transport.is_empty());
        assert!(h.monitor.tombstones().is_empty());
    }

    #[test]
    fn test_perform_remote_operation_tombstones_and_floods() {
        let mut h = harness(1);
        let calls = counting_observer(&mut h.monitor);
        let edge = EdgeId::new(id(2), id(3));

        h.monitor
            .perform_operation(TopologyKind::Logical, OperationalEdge::remove(edge))
            .unwrap();
        assert!(h.monitor.tombstones().contains(&edge));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let sent = h.transport.drain();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            WireMessage::EdgeOperation(message) => assert_eq!(message.hops_to_live, 2),
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(h.metrics.get_count(Metric::OperationalMessagesSent), 1);

        // Add on the same remote edge lifts the tombstone
        h.monitor
            .perform_operation(TopologyKind::Logical, OperationalEdge::add(edge))
            .unwrap();
        assert!(!h.monitor.tombstones().contains(&edge));
    }

    #[test]
    fn test_own_link_operations_use_physical_link() {
        let mut h = harness(1);
        h.monitor.remove_neighbor(TopologyKind::Logical, id(2)).unwrap();
        assert!(h.link.is_disabled(id(2)));
        assert!(h.monitor.tombstones().contains(&EdgeId::new(id(1), id(2))));
        // Local only
        assert!(h.transport.is_empty());

        h.monitor.add_neighbor(TopologyKind::Logical, id(2)).unwrap();
        assert!(!h.link.is_disabled(id(2)));
        assert!(h.monitor.tombstones().is_empty());
    }

    #[test]
    fn test_missing_link_fails_single_operation() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(10)));
        let transport = Arc::new(RecordingTransport::new());
        let mut monitor = TopologyMonitor::initialize(
            id(1),
            MonitorConfig::minimal(),
            Collaborators::new(clock, transport.clone()),
        )
        .unwrap();

        let result = monitor.perform_operation(
            TopologyKind::Logical,
            OperationalEdge::remove(EdgeId::new(id(1), id(2))),
        );
        assert!(matches!(result, Err(MonitorError::LinkUnavailable(n)) if n == id(2)));
        assert!(monitor.tombstones().is_empty());
        assert!(transport.is_empty());

        // Remote edges need no link
        monitor
            .perform_operation(TopologyKind::Logical, OperationalEdge::remove(EdgeId::new(id(3), id(4))))
            .unwrap();
        assert_eq!(transport.len(), 1);
    }

    #[test]
    fn test_received_operation_is_forwarded_once() {
        let mut h = harness(3);
        let message = EdgeOperationMessage::single(OperationalEdge::remove(EdgeId::new(id(1), id(2))), 2);

        h.monitor
            .handle_message(id(2), 1.0, WireMessage::EdgeOperation(message))
            .unwrap();
        assert!(h.monitor.tombstones().contains(&EdgeId::new(id(1), id(2))));

        let sent = h.transport.drain();
        assert_eq!(sent.len(), 1);
        let WireMessage::EdgeOperation(forward) = &sent[0] else {
            panic!("expected an edge operation");
        };
        assert_eq!(forward.hops_to_live, 1);

        // The forwarded copy is applied but not forwarded again
        let mut other = harness(4);
        other
            .monitor
            .handle_message(id(3), 1.0, sent[0].clone())
            .unwrap();
        assert!(other.transport.is_empty());
    }

    #[test]
    fn test_exhausted_operation_applied_not_forwarded() {
        let mut h = harness(3);
        let edge = EdgeId::new(id(1), id(2));
        let message = EdgeOperationMessage::single(OperationalEdge::remove(edge), 0);

        h.monitor
            .handle_message(id(2), 1.0, WireMessage::EdgeOperation(message))
            .unwrap();

        assert!(h.monitor.tombstones().contains(&edge));
        assert!(h.transport.is_empty());
        assert_eq!(h.metrics.get_count(Metric::MessagesDropped), 0);
    }

    #[test]
    fn test_reconciliation_disables_incident_links() {
        let mut h = harness(2);
        let calls = counting_observer(&mut h.monitor);
        let message = EdgeOperationMessage::single(OperationalEdge::remove(EdgeId::new(id(1), id(2))), 1);

        h.monitor
            .handle_message(id(1), 1.0, WireMessage::EdgeOperation(message))
            .unwrap();

        assert!(h.link.actions().contains(&LinkAction::Disabled(id(1))));
        assert!(h.monitor.tombstones().contains(&EdgeId::new(id(2), id(1))));
        // Operation and reconciliation together notify once
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_malformed_frames_dropped() {
        let mut h = harness(1);
        let calls = counting_observer(&mut h.monitor);

        let result = h.monitor.handle_frame(id(2), 1.0, b"not json");
        assert!(matches!(result, Err(MonitorError::Wire(WireError::Decode(_)))));

        let mut view = ViewMessage::new();
        view.push_element(GraphElement::node(id(3)), Timestamp::from_millis(1_000));
        view.element_timestamps.clear();
        let frame = WireMessage::View(view).encode().unwrap();
        assert!(h.monitor.handle_frame(id(2), 1.0, &frame).is_err());

        assert_eq!(h.metrics.get_count(Metric::MessagesDropped), 2);
        assert_eq!(h.metrics.get_labeled_count(Metric::MessagesDropped, "reason", "decode"), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.monitor.graph().len(), 1);
    }

    #[test]
    fn test_collect_stale_evicts_and_notifies() {
        let mut h = harness(1);
        let mut view = ViewMessage::new();
        view.push_element(GraphElement::node(id(2)), Timestamp::from_millis(1_000));
        h.monitor.handle_message(id(2), 1.0, WireMessage::View(view)).unwrap();
        assert!(h.monitor.graph().contains_node(&id(2)));

        let calls = counting_observer(&mut h.monitor);
        h.clock.advance(Duration::from_secs(15));
        let report = h.monitor.collect_stale();

        assert_eq!(report.evicted_elements, 2);
        assert!(!h.monitor.graph().contains_node(&id(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.metrics.get_count(Metric::EntriesEvicted), 2);
    }

    #[test]
    fn test_own_tombstone_evicted_after_horizon() {
        let mut h = harness(1);
        h.monitor.remove_neighbor(TopologyKind::Logical, id(2)).unwrap();
        assert_eq!(h.monitor.tombstones().len(), 1);

        h.clock.advance(h.monitor.config().eviction_horizon());
        let report = h.monitor.collect_stale();
        assert_eq!(report.evicted_tombstones, 1);
        assert!(h.monitor.tombstones().is_empty());
        assert_eq!(h.metrics.get_labeled_count(Metric::EntriesEvicted, "store", "tombstones"), 1);

        // Nothing left to reconcile: inbound traffic no longer touches the link
        let disables = h.link.actions().len();
        h.monitor
            .handle_message(id(3), 1.0, WireMessage::View(ViewMessage::new()))
            .unwrap();
        assert_eq!(h.link.actions().len(), disables);
        assert!(h.monitor.tombstones().is_empty());
    }

    #[test]
    fn test_possible_operations_offer_add_for_tombstoned() {
        let mut a = harness(1);
        let mut b = harness(2);
        b.monitor.beacon();
        deliver(&b, &mut a);
        a.monitor.beacon();
        deliver(&a, &mut b);
        b.monitor.beacon();
        deliver(&b, &mut a);

        let ops = a.monitor.possible_edge_operations(TopologyKind::Logical).unwrap();
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| op.op == EdgeOperation::Remove));

        a.monitor.remove_neighbor(TopologyKind::Logical, id(2)).unwrap();
        let ops = a.monitor.possible_edge_operations(TopologyKind::Logical).unwrap();
        assert!(ops.contains(&OperationalEdge::add(EdgeId::new(id(1), id(2)))));
    }

    #[test]
    fn test_shutdown_stops_beacons_and_inbound() {
        let mut h = harness(1);
        h.monitor.shutdown();
        assert!(!h.monitor.is_running());
        assert!(h.monitor.beacon().is_none());
        assert!(h.transport.is_empty());

        let mut view = ViewMessage::new();
        view.push_element(GraphElement::node(id(2)), Timestamp::from_millis(1_000));
        h.monitor.handle_message(id(2), 1.0, WireMessage::View(view)).unwrap();
        assert!(!h.monitor.graph().contains_node(&id(2)));
    }

    #[test]
    fn test_unsubscribed_observer_not_called() {
        let mut h = harness(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = h.monitor.add_topology_observer(Arc::new(move |_: &TopologyChange| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(h.monitor.remove_topology_observer(handle));

        h.monitor
            .perform_operation(TopologyKind::Logical, OperationalEdge::remove(EdgeId::new(id(2), id(3))))
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
