//! Per-worker counters for host diagnostics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter handle owned by one worker instance.
#[derive(Debug, Default)]
pub struct Metrics {
    results_committed: AtomicU64,
    enqueue_retries: AtomicU64,
    late_callbacks: AtomicU64,
    ticks: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result_committed(&self) {
        self.results_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn enqueue_retry(&self) {
        self.enqueue_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn late_callback(&self) {
        self.late_callbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            results_committed: self.results_committed.load(Ordering::Relaxed),
            enqueue_retries: self.enqueue_retries.load(Ordering::Relaxed),
            late_callbacks: self.late_callbacks.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub results_committed: u64,
    pub enqueue_retries: u64,
    pub late_callbacks: u64,
    pub ticks: u64,
}
