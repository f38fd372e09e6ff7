//! External collaborators of a node.
//!
//! The monitor never reaches for process-wide time, randomness, radio or
//! link state. Each is a trait injected at construction:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`Clock`] | monotonic time source |
//! | [`RandomSource`] | beacon jitter |
//! | [`Transport`] | lossy broadcast to one-hop peers |
//! | [`PhysicalLink`] | actually enables/disables a link |
//!
//! In-memory implementations for tests and simulations live here too.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::types::{NodeId, Timestamp, WireMessage};

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// Clock backed by [`std::time::Instant`], counting from its creation.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    /// Start a new clock at zero.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.start.elapsed().as_millis();
        Timestamp::from_millis(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Clock reading `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicU64::new(start.as_millis()),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    /// Set the clock. Callers must not move it backwards.
    pub fn set(&self, to: Timestamp) {
        self.millis.store(to.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Source of uniformly distributed delays.
pub trait RandomSource: Send {
    /// Uniform draw from `[low, high]`, in milliseconds.
    fn uniform_millis(&mut self, low: u64, high: u64) -> u64;
}

/// [`RandomSource`] backed by a seedable [`StdRng`].
#[derive(Debug, Clone)]
pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    /// Deterministic source for tests and reproducible simulations.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Source seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl RandomSource for StdRandom {
    fn uniform_millis(&mut self, low: u64, high: u64) -> u64 {
        if low >= high {
            return low;
        }
        self.rng.gen_range(low..=high)
    }
}

/// Error raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The transport is shut down.
    #[error("Transport closed")]
    Closed,
    /// The message could not be encoded.
    #[error("Encoding failed: {0}")]
    Encode(String),
}

/// Lossy one-hop broadcast.
///
/// Delivery is unordered, may drop and may duplicate. Broadcasting never
/// waits for acknowledgement.
pub trait Transport: Send + Sync {
    /// Broadcast a message to every one-hop peer.
    fn broadcast(&self, message: &WireMessage) -> Result<(), TransportError>;
}

/// Transport that records every broadcast.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<WireMessage>>,
}

impl RecordingTransport {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything broadcast so far.
    pub fn drain(&self) -> Vec<WireMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Number of messages broadcast so far (not drained).
    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl Transport for RecordingTransport {
    fn broadcast(&self, message: &WireMessage) -> Result<(), TransportError> {
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

/// Error raised by the physical link layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// The link layer cannot act on this neighbor.
    #[error("Link to {0} cannot be changed")]
    Rejected(NodeId),
}

/// Mechanism that actually enables or disables a link.
///
/// Both calls must be idempotent: reconciliation re-disables links on every
/// inbound message.
pub trait PhysicalLink: Send + Sync {
    /// Enable the link from the local node to `neighbor`.
    fn enable(&self, neighbor: NodeId) -> Result<(), LinkError>;

    /// Disable the link from the local node to `neighbor`.
    fn disable(&self, neighbor: NodeId) -> Result<(), LinkError>;
}

/// A link action observed by [`RecordingLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// `enable(neighbor)` was called.
    Enabled(NodeId),
    /// `disable(neighbor)` was called.
    Disabled(NodeId),
}

/// Physical link that records every call.
#[derive(Debug, Default)]
pub struct RecordingLink {
    actions: Mutex<Vec<LinkAction>>,
}

impl RecordingLink {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls so far, in order.
    pub fn actions(&self) -> Vec<LinkAction> {
        self.actions.lock().clone()
    }

    /// Whether the most recent call for `neighbor` disabled it.
    pub fn is_disabled(&self, neighbor: NodeId) -> bool {
        self.actions
            .lock()
            .iter()
            .rev()
            .find_map(|action| match action {
                LinkAction::Disabled(n) if *n == neighbor => Some(true),
                LinkAction::Enabled(n) if *n == neighbor => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }
}

impl PhysicalLink for RecordingLink {
    fn enable(&self, neighbor: NodeId) -> Result<(), LinkError> {
        self.actions.lock().push(LinkAction::Enabled(neighbor));
        Ok(())
    }

    fn disable(&self, neighbor: NodeId) -> Result<(), LinkError> {
        self.actions.lock().push(LinkAction::Disabled(neighbor));
        Ok(())
    }
}
