use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-lifetime counters for the orchestration layer.
#[derive(Default)]
pub struct Metrics {
    containers_started: AtomicU64,
    start_failures: AtomicU64,
    items_launched: AtomicU64,
    item_failures: AtomicU64,
    capacity_rejections: AtomicU64,
    containers_stopped: AtomicU64,
    termination_timeouts: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_containers_started(&self) {
        self.containers_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_start_failures(&self) {
        self.start_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_items_launched(&self, n: u64) {
        self.items_launched.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_item_failures(&self, n: u64) {
        self.item_failures.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_capacity_rejections(&self) {
        self.capacity_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_containers_stopped(&self) {
        self.containers_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_termination_timeouts(&self) {
        self.termination_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            containers_started: self.containers_started.load(Ordering::Relaxed),
            start_failures: self.start_failures.load(Ordering::Relaxed),
            items_launched: self.items_launched.load(Ordering::Relaxed),
            item_failures: self.item_failures.load(Ordering::Relaxed),
            capacity_rejections: self.capacity_rejections.load(Ordering::Relaxed),
            containers_stopped: self.containers_stopped.load(Ordering::Relaxed),
            termination_timeouts: self.termination_timeouts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub containers_started: u64,
    pub start_failures: u64,
    pub items_launched: u64,
    pub item_failures: u64,
    pub capacity_rejections: u64,
    pub containers_stopped: u64,
    pub termination_timeouts: u64,
}
