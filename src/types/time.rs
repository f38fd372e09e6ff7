//! Freshness timestamps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::time::Duration;

/// Point on a node's monotonic clock, in milliseconds.
///
/// Only the relative order of two timestamps and their difference are
/// meaningful; the epoch belongs to the injected clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The clock's epoch.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Create a timestamp from milliseconds since the clock's epoch.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the clock's epoch.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Age of this timestamp as seen at `now`.
    ///
    /// Saturates at zero for timestamps ahead of `now`.
    pub fn age_at(&self, now: Timestamp) -> Duration {
        Duration::from_millis(now.0.saturating_sub(self.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        let millis = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A value together with the time it was last observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedEntry<T> {
    /// The observed value.
    pub value: T,
    /// When the value was last observed.
    pub last_seen: Timestamp,
}

impl<T> TimestampedEntry<T> {
    /// Create a new entry.
    pub fn new(value: T, last_seen: Timestamp) -> Self {
        Self { value, last_seen }
    }

    /// Age of the entry at `now`.
    pub fn age(&self, now: Timestamp) -> Duration {
        self.last_seen.age_at(now)
    }
}

/// Result of a last-writer-wins write against a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The key was absent and is now present.
    Inserted,
    /// The incoming timestamp was strictly newer; value and timestamp replaced.
    Replaced {
        /// Whether the stored value differs from the previous one
        /// (e.g. a refreshed edge weight).
        value_changed: bool,
    },
    /// The stored copy was at least as new; nothing changed.
    Kept,
}

impl Upsert {
    /// Whether this write changed the observable topology.
    pub fn changed_topology(&self) -> bool {
        matches!(self, Self::Inserted | Self::Replaced { value_changed: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_saturates() {
        let earlier = Timestamp::from_millis(1_000);
        let later = Timestamp::from_millis(4_500);

        assert_eq!(earlier.age_at(later), Duration::from_millis(3_500));
        assert_eq!(later.age_at(earlier), Duration::ZERO);
    }

    #[test]
    fn test_add_duration() {
        let t = Timestamp::from_millis(250) + Duration::from_secs(2);
        assert_eq!(t.as_millis(), 2_250);
    }

    #[test]
    fn test_upsert_topology_change() {
        assert!(Upsert::Inserted.changed_topology());
        assert!(Upsert::Replaced { value_changed: true }.changed_topology());
        assert!(!Upsert::Replaced { value_changed: false }.changed_topology());
        assert!(!Upsert::Kept.changed_topology());
    }
}
