//! Core types for the topology view.

pub mod node;
pub mod edge;
pub mod element;
pub mod time;
pub mod topology;
pub mod view;
pub mod message;

pub use node::NodeId;
pub use edge::{Edge, EdgeId};
pub use element::{ElementKey, GraphElement};
pub use time::{Timestamp, TimestampedEntry, Upsert};
pub use topology::{TopologyKind, UnknownTopology};
pub use view::LocalView;
pub use message::{
    ViewMessage, EdgeOperation, OperationalEdge, EdgeOperationMessage,
    WireMessage, WireError,
};
