//! Process-wide TX accounting.
//!
//! Per-queue drop counts go to the peer through its hooks; these counters
//! aggregate across every queue in the process for stats display.

use std::sync::atomic::{AtomicU64, Ordering};

static MESSAGES_ENQUEUED: AtomicU64 = AtomicU64::new(0);
static FLOWC_DROPS: AtomicU64 = AtomicU64::new(0);
static SWIFT_DROPS: AtomicU64 = AtomicU64::new(0);
static FATAL_OVERFLOWS: AtomicU64 = AtomicU64::new(0);

pub fn inc_enqueued() {
    MESSAGES_ENQUEUED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_flowc_drops(n: u64) {
    FLOWC_DROPS.fetch_add(n, Ordering::Relaxed);
}

pub fn inc_swift_drops(n: u64) {
    SWIFT_DROPS.fetch_add(n, Ordering::Relaxed);
}

pub fn inc_fatal_overflows() {
    FATAL_OVERFLOWS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_enqueued: u64,
    pub flowc_drops: u64,
    pub swift_drops: u64,
    pub fatal_overflows: u64,
}

pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        messages_enqueued: MESSAGES_ENQUEUED.load(Ordering::Relaxed),
        flowc_drops: FLOWC_DROPS.load(Ordering::Relaxed),
        swift_drops: SWIFT_DROPS.load(Ordering::Relaxed),
        fatal_overflows: FATAL_OVERFLOWS.load(Ordering::Relaxed),
    }
}
