//! Topology Simulation Binary
//!
//! Runs a line of nodes over the in-memory network, removes the first link
//! halfway through the run and logs every node's views at the end.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `NODES`: Number of nodes in the line (default: 5)
//! - `K`: View radius (default: 2)
//! - `BEACON_INTERVAL_MS`: Mean beacon interval (default: 500)
//! - `RUN_SECS`: Simulated run length in seconds (default: 10)
//! - `SEED`: Base seed for beacon jitter (default: 42)
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: pretty)
//!
//! ## Usage
//!
//! ```bash
//! NODES=8 K=3 LOG_FORMAT=json cargo run --bin topology_sim
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use topology_view_kernel::runtime::InMemoryNetwork;
use topology_view_kernel::{
    EdgeId, MonitorConfig, MonitorMetrics, NoOpMetrics, NodeId, OperationalEdge, StdRandom, TopologyKind,
};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "topology_sim=info,topology_view_kernel=info".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).flatten_event(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "Unparseable value, using default");
            default
        }),
        Err(_) => default,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let nodes: usize = env_or("NODES", 5);
    let k: usize = env_or("K", 2);
    let interval_ms: u64 = env_or("BEACON_INTERVAL_MS", 500);
    let run_secs: u64 = env_or("RUN_SECS", 10);
    let seed: u64 = env_or("SEED", 42);

    let config = MonitorConfig::new(k, Duration::from_millis(interval_ms))
        .with_jitter(Duration::from_millis(interval_ms * 2 / 5));
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        nodes,
        k,
        interval_ms,
        run_secs,
        params_hash = %config.params_hash(),
        "Starting topology simulation"
    );

    let network = InMemoryNetwork::new();
    let ids: Vec<NodeId> = (1..=nodes as u128).map(NodeId::from_u128).collect();
    let metrics: Arc<dyn MonitorMetrics> = Arc::new(NoOpMetrics);

    let mut handles = Vec::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        let random = StdRandom::seeded(seed.wrapping_add(i as u64));
        handles.push(network.spawn_node(*id, config.clone(), random, metrics.clone())?);
    }
    for pair in ids.windows(2) {
        network.connect(pair[0], pair[1], 1.0);
    }

    let half = Duration::from_secs(run_secs) / 2;
    tokio::time::sleep(half).await;

    if let (Some(first), Some(second)) = (ids.first(), ids.get(1)) {
        let operation = OperationalEdge::remove(EdgeId::new(*first, *second));
        info!(edge = %operation.edge, "Removing first link");
        handles[0]
            .perform_operation(TopologyKind::Logical, operation)
            .await?;
    }

    tokio::time::sleep(half).await;

    for handle in &handles {
        let underlay = handle.local_view(TopologyKind::Underlay).await?;
        let logical = handle.local_view(TopologyKind::Logical).await?;
        let neighbors: Vec<String> = logical
            .successors(handle.node())
            .iter()
            .map(ToString::to_string)
            .collect();
        info!(
            node = %handle.node(),
            underlay_nodes = underlay.num_nodes(),
            underlay_edges = underlay.num_edges(),
            logical_edges = logical.num_edges(),
            logical_fingerprint = %logical.fingerprint(),
            neighbors = ?neighbors,
            "Final view"
        );
    }

    for handle in handles {
        handle.shutdown().await?;
    }

    info!("Topology simulation complete");
    Ok(())
}
