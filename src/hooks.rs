//! The queue's upward and downward interfaces.
//!
//! The queue owns neither its peer nor its TX driver; it talks to the peer
//! through [`PeerHooks`] and gates the driver through [`TxDriver`]. Hooks are
//! invoked synchronously inside queue operations and must not call back into
//! the queue; implementations typically record state the peer's loop reads
//! later.

/// Reason code passed to [`PeerHooks::on_fatal_overflow`] when a prioritary
/// message cannot fit and nothing cheaper can be evicted.
pub const OVERFLOW_BYE_CODE: u16 = 502;

/// Notifications and tuning the queue pulls from its owning peer.
pub trait PeerHooks {
    /// Crossed the low watermark upward.
    fn on_tx_enter_warn(&self) {}
    /// Drained back below the low watermark from the warn zone.
    fn on_tx_leave_warn(&self) {}
    /// Crossed the high watermark: flow control engaged.
    fn on_tx_enter_flowc(&self) {}
    /// Drained to the low watermark: flow control released.
    fn on_tx_leave_flowc(&self) {}
    /// Grace period expired while flow-controlled: shedding on a budget now.
    fn on_tx_enter_swift(&self) {}
    /// The queue went non-empty (`true`) or empty (`false`).
    fn on_tx_service_needed(&self, _active: bool) {}
    /// `n` messages were dropped on the TX side.
    fn on_tx_drop_recorded(&self, _n: u32) {}
    /// A prioritary message overflowed a full queue with nothing cheaper to
    /// evict. The peer should close the connection.
    fn on_fatal_overflow(&self, _code: u16, _max_size: usize) {}

    /// Seconds of flow control tolerated before SWIFT engages.
    fn flowc_swift_grace_secs(&self) -> u64 {
        30
    }
    /// Seconds between SWIFT checkpoints.
    fn flowc_swift_period_secs(&self) -> u64 {
        10
    }
}

/// Hook set that ignores everything. Useful for tests and detached queues.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHooks;

impl PeerHooks for NullHooks {}

/// Service gating contract on the lower TX driver.
pub trait TxDriver {
    /// There is data to write; the driver should start or keep servicing.
    fn service_enable(&mut self);
    /// Nothing left to write.
    fn service_disable(&mut self);
    /// The queue is going away; release driver resources. Called before any
    /// still-queued messages are discarded.
    fn release(&mut self) {}
}

/// Driver that swallows everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDriver;

impl TxDriver for NullDriver {
    fn service_enable(&mut self) {}
    fn service_disable(&mut self) {}
}

/// Identity a queue logs under, supplied by the peer layer.
#[derive(Debug, Clone)]
pub struct LogContext {
    peer: String,
}

impl LogContext {
    pub fn new(peer: impl Into<String>) -> Self {
        Self { peer: peer.into() }
    }
}

impl std::fmt::Display for LogContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.peer)
    }
}
