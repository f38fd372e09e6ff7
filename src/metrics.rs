//! Counters emitted by the monitor.
//!
//! ## Counters
//!
//! | Metric | Labels | Incremented when |
//! |--------|--------|------------------|
//! | `topology_monitor_beacons_sent_total` | | a beacon is broadcast |
//! | `topology_monitor_views_merged_total` | `changed` | a view message is merged |
//! | `topology_monitor_operational_messages_sent_total` | `origin` | an edge operation message is originated or forwarded |
//! | `topology_monitor_messages_dropped_total` | `reason` | an inbound message is rejected |
//! | `topology_monitor_entries_evicted_total` | `store` | the collector removes entries |
//! | `topology_monitor_link_actions_failed_total` | `action` | the physical link rejects or is missing |
//!
//! The [`MonitorMetrics`] trait is the seam for an observability backend.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Counter identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Beacons broadcast.
    BeaconsSent,
    /// View messages merged.
    ViewsMerged,
    /// Edge operation messages originated or forwarded.
    OperationalMessagesSent,
    /// Inbound messages rejected.
    MessagesDropped,
    /// Entries removed by the collector.
    EntriesEvicted,
    /// Physical link actions that failed.
    LinkActionsFailed,
}

impl Metric {
    /// Prometheus-style counter name.
    pub fn metric_name(&self) -> &'static str {
        match self {
            Self::BeaconsSent => "topology_monitor_beacons_sent_total",
            Self::ViewsMerged => "topology_monitor_views_merged_total",
            Self::OperationalMessagesSent => "topology_monitor_operational_messages_sent_total",
            Self::MessagesDropped => "topology_monitor_messages_dropped_total",
            Self::EntriesEvicted => "topology_monitor_entries_evicted_total",
            Self::LinkActionsFailed => "topology_monitor_link_actions_failed_total",
        }
    }
}

/// Metrics sink.
pub trait MonitorMetrics: Send + Sync {
    /// Increment a counter by 1.
    fn increment(&self, metric_name: &str, labels: &[(&str, &str)]);

    /// Increment a counter by `by`.
    fn increment_by(&self, metric_name: &str, labels: &[(&str, &str)], by: u64) {
        for _ in 0..by {
            self.increment(metric_name, labels);
        }
    }

    /// Record one occurrence of `metric`.
    fn record(&self, metric: Metric, labels: &[(&str, &str)]) {
        self.increment(metric.metric_name(), labels);
    }
}

/// No-op metrics implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMetrics;

impl MonitorMetrics for NoOpMetrics {
    fn increment(&self, _metric_name: &str, _labels: &[(&str, &str)]) {
        // No-op
    }

    fn increment_by(&self, _metric_name: &str, _labels: &[(&str, &str)], _by: u64) {}
}

/// In-memory metrics for testing.
#[derive(Debug, Default)]
pub struct TestMetrics {
    /// Counter values keyed by `name:labels`.
    pub counters: Mutex<HashMap<String, u64>>,
}

impl MonitorMetrics for TestMetrics {
    fn increment(&self, metric_name: &str, labels: &[(&str, &str)]) {
        self.increment_by(metric_name, labels, 1);
    }

    fn increment_by(&self, metric_name: &str, labels: &[(&str, &str)], by: u64) {
        let key = format!("{}:{:?}", metric_name, labels);
        *self.counters.lock().entry(key).or_insert(0) += by;
    }
}

impl TestMetrics {
    /// Get the count for a metric, summed over all label sets.
    pub fn get_count(&self, metric: Metric) -> u64 {
        self.counters
            .lock()
            .iter()
            .filter(|(k, _)| k.split_once(':').map(|(name, _)| name) == Some(metric.metric_name()))
            .map(|(_, v)| v)
            .sum()
    }

    /// Get the count for a metric restricted to label sets containing
    /// `label = value`.
    pub fn get_labeled_count(&self, metric: Metric, label: &str, value: &str) -> u64 {
        let needle = format!("({:?}, {:?})", label, value);
        self.counters
            .lock()
            .iter()
            .filter(|(k, _)| {
                k.split_once(':')
                    .is_some_and(|(name, labels)| name == metric.metric_name() && labels.contains(&needle))
            })
            .map(|(_, v)| v)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_metrics() {
        let metrics = TestMetrics::default();

        metrics.record(Metric::MessagesDropped, &[("reason", "decode")]);
        metrics.record(Metric::MessagesDropped, &[("reason", "decode")]);
        metrics.record(Metric::MessagesDropped, &[("reason", "dead_operation_message")]);
        metrics.record(Metric::BeaconsSent, &[]);

        assert_eq!(metrics.get_count(Metric::MessagesDropped), 3);
        assert_eq!(metrics.get_labeled_count(Metric::MessagesDropped, "reason", "decode"), 2);
        assert_eq!(metrics.get_count(Metric::BeaconsSent), 1);
        assert_eq!(metrics.get_count(Metric::ViewsMerged), 0);
    }

    #[test]
    fn test_increment_by() {
        let metrics = TestMetrics::default();
        metrics.increment_by(Metric::EntriesEvicted.metric_name(), &[("store", "graph")], 4);
        assert_eq!(metrics.get_count(Metric::EntriesEvicted), 4);
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(
            Metric::OperationalMessagesSent.metric_name(),
            "topology_monitor_operational_messages_sent_total"
        );
        assert_eq!(Metric::BeaconsSent.metric_name(), "topology_monitor_beacons_sent_total");
    }
}
