//! Per-request diagnostics counters.

use std::sync::atomic::{AtomicU64, Ordering};
use tiercache_core::Diagnostic;

/// Counters for `respond` outcomes and write-backs.
#[derive(Debug, Default)]
pub struct RespondMetrics {
    /// Fresh cache hits
    pub hits: AtomicU64,

    /// Served from the network
    pub misses: AtomicU64,

    /// Served from cache during a network outage
    pub degraded: AtomicU64,

    /// Placeholder or unavailable results
    pub failures: AtomicU64,

    /// Requests rejected before routing
    pub unclassified: AtomicU64,

    /// Records written back into the partition store
    pub writebacks: AtomicU64,

    /// Write-backs dropped (partition gone or storage fault)
    pub writebacks_skipped: AtomicU64,
}

impl RespondMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, diagnostic: Diagnostic) {
        let counter = match diagnostic {
            Diagnostic::Hit => &self.hits,
            Diagnostic::Miss => &self.misses,
            Diagnostic::Degraded => &self.degraded,
            Diagnostic::Failure => &self.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> RespondMetricsSnapshot {
        RespondMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            unclassified: self.unclassified.load(Ordering::Relaxed),
            writebacks: self.writebacks.load(Ordering::Relaxed),
            writebacks_skipped: self.writebacks_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of respond metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RespondMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub degraded: u64,
    pub failures: u64,
    pub unclassified: u64,
    pub writebacks: u64,
    pub writebacks_skipped: u64,
}

impl RespondMetricsSnapshot {
    /// Total resolved requests, including rejected ones.
    pub fn total(&self) -> u64 {
        self.hits + self.misses + self.degraded + self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let metrics = RespondMetrics::new();
        metrics.record(Diagnostic::Hit);
        metrics.record(Diagnostic::Hit);
        metrics.record(Diagnostic::Degraded);
        metrics.record(Diagnostic::Failure);
        metrics.unclassified.fetch_add(1, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 0);
        assert_eq!(snapshot.degraded, 1);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.unclassified, 1);
        assert_eq!(snapshot.total(), 4);
    }
}
