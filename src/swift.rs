//! SWIFT drop budgeting.
//!
//! Once the grace period expires under flow control, the queue starts taking
//! periodic checkpoints and force-drops enough traffic that, at the observed
//! flush and fill rates, it can reach the low watermark by the next timer.
//! The arithmetic projects the current period's rates onto the next period
//! and pads the result with safety margins for bursty traffic.

use crate::frame::{FrameHeader, FrameKind};

/// Rate observations for one checkpoint.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint {
    /// Bytes queued right now.
    pub bytes: usize,
    /// Low watermark we are trying to reach.
    pub lo_watermark: usize,
    /// Bytes queued at the previous checkpoint.
    pub last_size: usize,
    /// Bytes flushed to the driver since the previous checkpoint.
    pub flushed: usize,
    /// Milliseconds since the previous checkpoint was scheduled.
    pub elapsed_ms: u64,
    /// Milliseconds until the next checkpoint.
    pub next_period_ms: u64,
    /// Margin divisor when flushing alone should suffice (default 3):
    /// still drop a third of the distance to cover bursts.
    pub burst_margin_divisor: u32,
    /// Margin divisor on projected flush when it will not suffice (default
    /// 4): assume only 75% of the current flush rate holds up.
    pub flush_decay_divisor: u32,
}

/// Bytes to force-drop at this checkpoint.
pub(crate) fn drop_budget(cp: Checkpoint) -> usize {
    debug_assert!(cp.bytes > cp.lo_watermark);

    let elapsed = cp.elapsed_ms.max(1) as f64;
    let period_ratio = cp.next_period_ms as f64 / elapsed;

    let target_to_lowmark = (cp.bytes - cp.lo_watermark) as i64;
    let added = cp.bytes as i64 - cp.last_size as i64 + cp.flushed as i64;

    let flush_next = (cp.flushed as f64 * period_ratio) as i64;
    let add_next = if added <= 0 {
        0
    } else {
        (added as f64 * period_ratio) as i64
    };

    // Shortfall once the projected flush and projected fill cancel out.
    let extra = target_to_lowmark - (flush_next - add_next);

    let needed = if extra <= 0 {
        target_to_lowmark / cp.burst_margin_divisor.max(1) as i64
    } else {
        extra + flush_next / cp.flush_decay_divisor.max(1) as i64
    };

    needed.max(0) as usize
}

/// Reference header for the initial checkpoint: purge forwarded queries
/// (hops > 0) and spare our own hops-0 queries.
pub(crate) fn query_purge_header(max_ttl: u8) -> FrameHeader {
    FrameHeader::new(FrameKind::Query, max_ttl, 1)
}

/// Reference header for one step of the subsequent checkpoints' walk over
/// query hits, from least valuable (near, fresh) toward most valuable.
pub(crate) fn hit_purge_header(hard_ttl_limit: u8, ttl: u8) -> FrameHeader {
    FrameHeader::new(FrameKind::QueryHit, ttl, hard_ttl_limit - ttl)
}
