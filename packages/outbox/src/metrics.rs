use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Cumulative dispatcher counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub ticks: u64,
    pub claimed: u64,
    pub sent: u64,
    pub failed: u64,
    pub dead_lettered: u64,
    pub store_errors: u64,
}

impl DispatchStats {
    /// Sum of two snapshots, for reporting several dispatchers together.
    pub fn merge(self, other: DispatchStats) -> DispatchStats {
        DispatchStats {
            ticks: self.ticks + other.ticks,
            claimed: self.claimed + other.claimed,
            sent: self.sent + other.sent,
            failed: self.failed + other.failed,
            dead_lettered: self.dead_lettered + other.dead_lettered,
            store_errors: self.store_errors + other.store_errors,
        }
    }
}

/// Lock-free counters shared between a dispatcher and its handle.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    ticks: AtomicU64,
    claimed: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    dead_lettered: AtomicU64,
    store_errors: AtomicU64,
}

impl DispatchMetrics {
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_claimed(&self, count: usize) {
        self.claimed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            claimed: self.claimed.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}
