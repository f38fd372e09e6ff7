//! Per-node stores: observed graph and tombstone overlay.

pub mod graph;
pub mod tombstone;

pub use graph::{Direction, GraphStore};
pub use tombstone::TombstoneStore;
