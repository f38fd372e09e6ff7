//! Monitors driven by tokio tasks over the in-memory network.
//!
//! Time is paused, so timers fire in simulated time and the runs are fast.

#![cfg(feature = "runtime")]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use topology_view_kernel::runtime::{InMemoryNetwork, NodeHandle, RuntimeError};
use topology_view_kernel::{
    EdgeId, Metric, MonitorConfig, MonitorError, NodeId, NoOpMetrics, OperationalEdge, StdRandom, TestMetrics,
    TopologyChange, TopologyKind,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn id(n: u128) -> NodeId {
    NodeId::from_u128(n)
}

fn line(network: &InMemoryNetwork, n: u128, config: &MonitorConfig) -> Vec<NodeHandle> {
    let handles = (1..=n)
        .map(|i| {
            network
                .spawn_node(id(i), config.clone(), StdRandom::seeded(i as u64), Arc::new(NoOpMetrics))
                .unwrap()
        })
        .collect();
    for i in 1..n {
        network.connect(id(i), id(i + 1), 1.0);
    }
    handles
}

async fn shutdown_all(handles: Vec<NodeHandle>) {
    for handle in handles {
        handle.shutdown().await.unwrap();
    }
}

async fn logical_successors(handle: &NodeHandle) -> Vec<NodeId> {
    handle
        .neighbors(TopologyKind::Logical)
        .await
        .unwrap()
        .iter()
        .map(|edge| edge.id.to)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Convergence
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_two_nodes_become_logical_neighbors() {
    let network = InMemoryNetwork::new();
    let handles = line(&network, 2, &MonitorConfig::default());

    // Two beacon intervals
    let config = MonitorConfig::default();
    tokio::time::sleep(config.beacon_interval() * 2).await;

    assert_eq!(logical_successors(&handles[0]).await, vec![id(2)]);
    assert_eq!(logical_successors(&handles[1]).await, vec![id(1)]);

    // Both hold the same bounded view: two nodes, both directions
    let a = handles[0].local_view(TopologyKind::Logical).await.unwrap();
    let b = handles[1].local_view(TopologyKind::Logical).await.unwrap();
    assert_eq!(a.nodes, b.nodes);
    assert_eq!(a.num_edges(), 2);
    assert_eq!(a.fingerprint(), b.fingerprint());

    shutdown_all(handles).await;
}

#[tokio::test(start_paused = true)]
async fn test_line_views_agree_in_the_middle() {
    let network = InMemoryNetwork::new();
    // Two-hop entries can outlive the horizon in transit under full
    // jitter, so nothing is evicted here
    let handles = line(&network, 3, &MonitorConfig::minimal());
    tokio::time::sleep(Duration::from_secs(30)).await;

    // K = 2 on a 3-line: everyone sees everything
    let mut fingerprints = Vec::new();
    for handle in &handles {
        let view = handle.local_view(TopologyKind::Logical).await.unwrap();
        assert_eq!(view.num_nodes(), 3);
        assert_eq!(view.num_edges(), 4);
        fingerprints.push(view.fingerprint());
    }
    fingerprints.dedup();
    assert_eq!(fingerprints.len(), 1);

    shutdown_all(handles).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Operations and observers
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_remove_disables_links_on_both_ends() {
    let network = InMemoryNetwork::new();
    let handles = line(&network, 3, &MonitorConfig::default());
    tokio::time::sleep(Duration::from_secs(15)).await;

    let operations = handles[0]
        .possible_edge_operations(TopologyKind::Logical)
        .await
        .unwrap();
    let remove = OperationalEdge::remove(EdgeId::new(id(1), id(2)));
    assert!(operations.contains(&remove));

    handles[0]
        .perform_operation(TopologyKind::Logical, remove)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!network.is_link_enabled(id(1), id(2)));
    assert!(!network.is_link_enabled(id(2), id(1)));
    assert!(network.is_link_enabled(id(2), id(3)));
    assert!(logical_successors(&handles[0]).await.is_empty());
    assert_eq!(logical_successors(&handles[1]).await, vec![id(3)]);

    // The underlay still sees the radio link
    let underlay = handles[0].neighbors(TopologyKind::Underlay).await.unwrap();
    assert_eq!(underlay.len(), 1);

    shutdown_all(handles).await;
}

#[tokio::test(start_paused = true)]
async fn test_local_neighbor_requests_through_handle() {
    let network = InMemoryNetwork::new();
    let handles = line(&network, 2, &MonitorConfig::default());
    tokio::time::sleep(Duration::from_secs(10)).await;
    let a = &handles[0];
    assert_eq!(a.neighbor_nodes(TopologyKind::Logical).await.unwrap(), BTreeSet::from([id(2)]));

    let rejected = a.remove_neighbor(TopologyKind::Underlay, id(2)).await;
    assert!(matches!(rejected, Err(RuntimeError::Monitor(MonitorError::NotAdaptable(_)))));

    a.remove_neighbor(TopologyKind::Logical, id(2)).await.unwrap();
    assert!(!network.is_link_enabled(id(1), id(2)));
    assert!(a.neighbor_nodes(TopologyKind::Logical).await.unwrap().is_empty());
    assert_eq!(a.neighbor_nodes(TopologyKind::Underlay).await.unwrap(), BTreeSet::from([id(2)]));

    a.add_neighbor(TopologyKind::Logical, id(2)).await.unwrap();
    assert!(network.is_link_enabled(id(1), id(2)));
    assert_eq!(a.neighbor_nodes(TopologyKind::Logical).await.unwrap(), BTreeSet::from([id(2)]));

    shutdown_all(handles).await;
}

#[tokio::test(start_paused = true)]
async fn test_observer_notified_until_removed() {
    let network = InMemoryNetwork::new();
    let handles = line(&network, 2, &MonitorConfig::default());

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let subscription = handles[0]
        .add_topology_observer(Arc::new(move |_: &TopologyChange| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(seen.load(Ordering::SeqCst) > 0);

    assert!(handles[0].remove_topology_observer(subscription).await.unwrap());
    let before = seen.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(seen.load(Ordering::SeqCst), before);

    shutdown_all(handles).await;
}

#[tokio::test(start_paused = true)]
async fn test_shared_metrics_count_beacons() {
    let network = InMemoryNetwork::new();
    let metrics = Arc::new(TestMetrics::default());
    let handle = network
        .spawn_node(id(1), MonitorConfig::default(), StdRandom::seeded(7), metrics.clone())
        .unwrap();

    // Immediate beacon, then one every 3s to 7s
    tokio::time::sleep(Duration::from_secs(20)).await;
    let beacons = metrics.get_count(Metric::BeaconsSent);
    assert!((3..=7).contains(&beacons), "beacons sent: {beacons}");

    let monitor = handle.shutdown().await.unwrap();
    assert!(!monitor.is_running());
}
