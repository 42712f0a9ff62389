//! Counters for the directory's asynchronous paths
//!
//! Failures on the event pipeline and node cleanup are never returned to a
//! caller; these counters are where they show up.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of directory counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryStats {
    /// Mutation events received from the store for this directory's cache
    pub events_received: u64,
    /// Mutation events dropped because they belong to another cache
    pub events_ignored: u64,
    /// Registration updates pushed to the node selector
    pub notifications_delivered: u64,
    /// Re-queries whose result was discarded because the directory shut down
    pub notifications_suppressed: u64,
    /// Event-triggered re-queries that failed
    pub requery_failures: u64,
    /// Node cleanup runs started
    pub cleanup_runs: u64,
    /// Node cleanup runs that hit a store failure
    pub cleanup_failures: u64,
    /// Entries removed by node cleanup
    pub entries_cleaned: u64,
}

impl DirectoryStats {
    /// Re-queries that finished, whatever their outcome
    pub fn requeries_finished(&self) -> u64 {
        self.notifications_delivered + self.notifications_suppressed + self.requery_failures
    }
}

/// Live counters, updated from any thread
#[derive(Debug, Default)]
pub(crate) struct DirectoryMetrics {
    events_received: AtomicU64,
    events_ignored: AtomicU64,
    notifications_delivered: AtomicU64,
    notifications_suppressed: AtomicU64,
    requery_failures: AtomicU64,
    cleanup_runs: AtomicU64,
    cleanup_failures: AtomicU64,
    entries_cleaned: AtomicU64,
}

impl DirectoryMetrics {
    pub(crate) fn event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn event_ignored(&self) {
        self.events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn notification_delivered(&self) {
        self.notifications_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn notification_suppressed(&self) {
        self.notifications_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn requery_failed(&self) {
        self.requery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cleanup_started(&self) {
        self.cleanup_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cleanup_failed(&self) {
        self.cleanup_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn entries_cleaned(&self, count: usize) {
        self.entries_cleaned
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DirectoryStats {
        DirectoryStats {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            notifications_delivered: self.notifications_delivered.load(Ordering::Relaxed),
            notifications_suppressed: self.notifications_suppressed.load(Ordering::Relaxed),
            requery_failures: self.requery_failures.load(Ordering::Relaxed),
            cleanup_runs: self.cleanup_runs.load(Ordering::Relaxed),
            cleanup_failures: self.cleanup_failures.load(Ordering::Relaxed),
            entries_cleaned: self.entries_cleaned.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_are_zero() {
        let metrics = DirectoryMetrics::default();
        assert_eq!(metrics.snapshot(), DirectoryStats::default());
    }

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = DirectoryMetrics::default();
        metrics.event_received();
        metrics.event_received();
        metrics.event_ignored();
        metrics.notification_delivered();
        metrics.notification_suppressed();
        metrics.requery_failed();
        metrics.cleanup_started();
        metrics.cleanup_failed();
        metrics.entries_cleaned(3);

        let stats = metrics.snapshot();
        assert_eq!(stats.events_received, 2);
        assert_eq!(stats.events_ignored, 1);
        assert_eq!(stats.cleanup_runs, 1);
        assert_eq!(stats.cleanup_failures, 1);
        assert_eq!(stats.entries_cleaned, 3);
        assert_eq!(stats.requeries_finished(), 3);
    }
}
