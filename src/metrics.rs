//! Metrics collection for the cache manager
//!
//! Thread-safe counters using atomic operations. They track writes, range
//! merges, notification throttling, eviction and imports.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for the cache manager
#[derive(Debug, Default)]
pub struct CacheMetrics {
    // Write statistics
    bytes_written: AtomicU64,
    ranges_merged: AtomicU64,

    // Notification statistics
    updates_emitted: AtomicU64,
    updates_suppressed: AtomicU64,
    finished_events: AtomicU64,

    // Eviction statistics
    eviction_runs: AtomicU64,
    units_evicted: AtomicU64,
    bytes_evicted: AtomicU64,
    eviction_errors: AtomicU64,

    // Other
    imports: AtomicU64,
    sidecar_load_failures: AtomicU64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub bytes_written: u64,
    pub ranges_merged: u64,
    pub updates_emitted: u64,
    pub updates_suppressed: u64,
    pub finished_events: u64,
    pub eviction_runs: u64,
    pub units_evicted: u64,
    pub bytes_evicted: u64,
    pub eviction_errors: u64,
    pub imports: u64,
    pub sidecar_load_failures: u64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record bytes written by a download session and whether they extended
    /// the cached range set
    pub fn record_write(&self, bytes: u64, merged: bool) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        if merged {
            self.ranges_merged.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_update(&self, emitted: bool) {
        if emitted {
            self.updates_emitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.updates_suppressed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_finished(&self) {
        self.finished_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self, units: u64, bytes: u64, errors: u64) {
        self.eviction_runs.fetch_add(1, Ordering::Relaxed);
        self.units_evicted.fetch_add(units, Ordering::Relaxed);
        self.bytes_evicted.fetch_add(bytes, Ordering::Relaxed);
        self.eviction_errors.fetch_add(errors, Ordering::Relaxed);
    }

    pub fn record_import(&self) {
        self.imports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sidecar_failure(&self) {
        self.sidecar_load_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            ranges_merged: self.ranges_merged.load(Ordering::Relaxed),
            updates_emitted: self.updates_emitted.load(Ordering::Relaxed),
            updates_suppressed: self.updates_suppressed.load(Ordering::Relaxed),
            finished_events: self.finished_events.load(Ordering::Relaxed),
            eviction_runs: self.eviction_runs.load(Ordering::Relaxed),
            units_evicted: self.units_evicted.load(Ordering::Relaxed),
            bytes_evicted: self.bytes_evicted.load(Ordering::Relaxed),
            eviction_errors: self.eviction_errors.load(Ordering::Relaxed),
            imports: self.imports.load(Ordering::Relaxed),
            sidecar_load_failures: self.sidecar_load_failures.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        for counter in [
            &self.bytes_written,
            &self.ranges_merged,
            &self.updates_emitted,
            &self.updates_suppressed,
            &self.finished_events,
            &self.eviction_runs,
            &self.units_evicted,
            &self.bytes_evicted,
            &self.eviction_errors,
            &self.imports,
            &self.sidecar_load_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl MetricsSnapshot {
    /// Fraction of update attempts that were dropped by the throttle
    pub fn update_suppression_rate(&self) -> f64 {
        let total = self.updates_emitted + self.updates_suppressed;
        if total == 0 {
            0.0
        } else {
            self.updates_suppressed as f64 / total as f64
        }
    }
}
