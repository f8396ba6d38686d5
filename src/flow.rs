//! Watermark-driven flow-control zones.
//!
//! Three zones with hysteresis: the queue warns at the low watermark, enters
//! flow control at the high watermark, and only leaves flow control once it
//! has drained back below the low watermark. SWIFT is an orthogonal flag
//! meaningful only under flow control. The transition decision is a pure
//! function here; the queue applies the side effects (hooks, timers, index
//! lifetime).

use bitflags::bitflags;

bitflags! {
    /// Queue state flag word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueueFlags: u8 {
        /// Above the low watermark at some point and not yet back under it.
        const WARN = 0b0001;
        /// Flow-controlled: the drop engine is armed.
        const FLOWC = 0b0010;
        /// Grace period expired while flow-controlled; shedding on a budget.
        const SWIFT = 0b0100;
        /// Further enqueues are discarded.
        const SHUTDOWN = 0b1000;
    }
}

/// Externally visible zone, derived from the flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Normal,
    Warn,
    Flowc,
}

impl Zone {
    pub(crate) fn from_flags(flags: QueueFlags) -> Self {
        if flags.contains(QueueFlags::FLOWC) {
            Zone::Flowc
        } else if flags.contains(QueueFlags::WARN) {
            Zone::Warn
        } else {
            Zone::Normal
        }
    }
}

/// What a zone update must do, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ZoneAction {
    EnterFlowc,
    LeaveFlowc,
    EnterWarn,
    LeaveWarn,
    Hold,
}

/// Decide the transition for the current size. Entering flow control raises
/// the warn flag silently and leaving clears it silently; the warn hooks only
/// fire on transitions through the warn zone itself.
pub(crate) fn zone_action(flags: QueueFlags, bytes: usize, lo: usize, hi: usize) -> ZoneAction {
    if flags.contains(QueueFlags::FLOWC) {
        if bytes <= lo {
            ZoneAction::LeaveFlowc
        } else {
            ZoneAction::Hold
        }
    } else if bytes >= hi {
        ZoneAction::EnterFlowc
    } else if bytes >= lo {
        if flags.contains(QueueFlags::WARN) {
            ZoneAction::Hold
        } else {
            ZoneAction::EnterWarn
        }
    } else if flags.contains(QueueFlags::WARN) {
        ZoneAction::LeaveWarn
    } else {
        ZoneAction::Hold
    }
}
