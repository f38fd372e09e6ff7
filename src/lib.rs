//! # topology-view-kernel
//!
//! Gossip-maintained, bounded-radius topology views for ad-hoc networks.
//!
//! Every node answers one question:
//!
//! > Which nodes and links lie within K hops of me, and which of those links
//! > have been administratively removed?
//!
//! ## Core Contract
//!
//! 1. Periodically beacon a snapshot of the (K-1)-local view to one-hop peers
//! 2. Merge received snapshots with per-element last-writer-wins timestamps
//! 3. Hide tombstoned links from the logical view, keep them in the underlay
//! 4. Flood add/remove link operations with a bounded hop count
//! 5. Evict everything not refreshed within `(K+1) × beacon_interval`
//!
//! ## Architecture
//!
//! ```text
//! BeaconEngine → Transport → peer MergeEngine → GraphStore / TombstoneStore → observers
//! EdgeOpFlooder → Transport → peer EdgeOpFlooder → stores / PhysicalLink → re-broadcast
//! StalenessCollector → stores
//! ```
//!
//! [`TopologyMonitor`] owns one node's stores and engines. The optional
//! `runtime` feature drives monitors on tokio.
//!
//! ## Determinism Guarantees
//!
//! - Merging is idempotent and commutative
//! - Views iterate in identifier order
//! - Same graph contents → identical view fingerprint

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod store;
pub mod canonical;
pub mod config;
pub mod collaborators;
pub mod merge;
pub mod beacon;
pub mod flood;
pub mod collector;
pub mod query;
pub mod observer;
pub mod metrics;
pub mod monitor;

#[cfg(feature = "runtime")]
pub mod runtime;

// Re-exports
pub use types::{
    NodeId, Edge, EdgeId, ElementKey, GraphElement, Timestamp, TimestampedEntry, Upsert,
    TopologyKind, UnknownTopology, LocalView,
    ViewMessage, EdgeOperation, OperationalEdge, EdgeOperationMessage, WireMessage, WireError,
};
pub use store::{Direction, GraphStore, TombstoneStore};
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};
pub use config::{MonitorConfig, CollectorSchedule, ConfigError};
pub use collaborators::{
    Clock, MonotonicClock, ManualClock, RandomSource, StdRandom,
    Transport, TransportError, RecordingTransport,
    PhysicalLink, LinkError, LinkAction, RecordingLink,
};
pub use merge::{MergeEngine, MergeReport};
pub use beacon::BeaconEngine;
pub use flood::{EdgeAction, EdgeOpFlooder, Reception};
pub use collector::{CollectReport, StalenessCollector};
pub use query::ViewQuery;
pub use observer::{ChangeCause, ObserverRegistry, SubscriptionHandle, TopologyChange, TopologyObserver};
pub use metrics::{Metric, MonitorMetrics, NoOpMetrics, TestMetrics};
pub use monitor::{Collaborators, MonitorError, TopologyMonitor};

/// Default configuration version identifier.
pub const DEFAULT_CONFIG_VERSION: &str = "topology_monitor_v1";
