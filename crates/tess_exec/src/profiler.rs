//! Lock-free counters for one speculation phase.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters for one speculation phase. All fields are relaxed atomics so the
/// dispatcher thread can write while a monitoring thread snapshots.
#[derive(Debug, Default)]
pub struct SpecProfiler {
    calls: AtomicU64,
    comparisons: AtomicU64,
    queue_size_sum: AtomicU64,
    queue_size_max: AtomicU64,
    success: AtomicU64,
    compute_ns_total: AtomicU64,
    compute_ns_max: AtomicU64,
    total_ns_total: AtomicU64,
    total_ns_max: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecProfilerSnapshot {
    pub calls: u64,
    pub comparisons: u64,
    pub queue_size_sum: u64,
    pub queue_size_max: u64,
    pub success: u64,
    pub compute_ns_total: u64,
    pub compute_ns_max: u64,
    pub total_ns_total: u64,
    pub total_ns_max: u64,
}

impl SpecProfiler {
    pub fn record_queue_size(&self, size: usize) {
        let size = size as u64;
        self.queue_size_sum.fetch_add(size, Ordering::Relaxed);
        self.queue_size_max.fetch_max(size, Ordering::Relaxed);
    }

    pub fn record_comparisons(&self, count: u64) {
        self.comparisons.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compute(&self, elapsed: Duration) {
        let ns = duration_ns(elapsed);
        self.compute_ns_total.fetch_add(ns, Ordering::Relaxed);
        self.compute_ns_max.fetch_max(ns, Ordering::Relaxed);
    }

    pub fn record_total(&self, elapsed: Duration) {
        let ns = duration_ns(elapsed);
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.total_ns_total.fetch_add(ns, Ordering::Relaxed);
        self.total_ns_max.fetch_max(ns, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SpecProfilerSnapshot {
        SpecProfilerSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            comparisons: self.comparisons.load(Ordering::Relaxed),
            queue_size_sum: self.queue_size_sum.load(Ordering::Relaxed),
            queue_size_max: self.queue_size_max.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            compute_ns_total: self.compute_ns_total.load(Ordering::Relaxed),
            compute_ns_max: self.compute_ns_max.load(Ordering::Relaxed),
            total_ns_total: self.total_ns_total.load(Ordering::Relaxed),
            total_ns_max: self.total_ns_max.load(Ordering::Relaxed),
        }
    }
}

fn duration_ns(elapsed: Duration) -> u64 {
    elapsed.as_nanos().min(u128::from(u64::MAX)) as u64
}
