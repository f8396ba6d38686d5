//! Shared fixtures for queue integration tests.
#![allow(dead_code)] // each test binary uses its own subset of these helpers

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;

use gossipq::buffer::{MessageBuf, Priority};
use gossipq::callout::Callout;
use gossipq::clock::{Clock, ManualClock};
use gossipq::config::QueueConfig;
use gossipq::frame::{FrameHeader, FrameKind};
use gossipq::hooks::{LogContext, PeerHooks, TxDriver};
use gossipq::queue::{Discipline, Mq, SwiftEvent};

/// Everything the queue told its peer, in counters.
#[derive(Debug, Default)]
pub struct HookLog {
    pub enter_warn: u32,
    pub leave_warn: u32,
    pub enter_flowc: u32,
    pub leave_flowc: u32,
    pub enter_swift: u32,
    /// Every on_tx_service_needed call, in order.
    pub service: Vec<bool>,
    pub drops: u64,
    pub fatal: Option<(u16, usize)>,
}

#[derive(Clone)]
pub struct RecordingHooks {
    pub log: Rc<RefCell<HookLog>>,
    pub grace_secs: u64,
    pub period_secs: u64,
}

impl Default for RecordingHooks {
    fn default() -> Self {
        Self {
            log: Rc::new(RefCell::new(HookLog::default())),
            // Short cadence keeps swift tests readable.
            grace_secs: 2,
            period_secs: 1,
        }
    }
}

impl PeerHooks for RecordingHooks {
    fn on_tx_enter_warn(&self) {
        self.log.borrow_mut().enter_warn += 1;
    }
    fn on_tx_leave_warn(&self) {
        self.log.borrow_mut().leave_warn += 1;
    }
    fn on_tx_enter_flowc(&self) {
        self.log.borrow_mut().enter_flowc += 1;
    }
    fn on_tx_leave_flowc(&self) {
        self.log.borrow_mut().leave_flowc += 1;
    }
    fn on_tx_enter_swift(&self) {
        self.log.borrow_mut().enter_swift += 1;
    }
    fn on_tx_service_needed(&self, active: bool) {
        self.log.borrow_mut().service.push(active);
    }
    fn on_tx_drop_recorded(&self, n: u32) {
        self.log.borrow_mut().drops += u64::from(n);
    }
    fn on_fatal_overflow(&self, code: u16, max_size: usize) {
        self.log.borrow_mut().fatal = Some((code, max_size));
    }
    fn flowc_swift_grace_secs(&self) -> u64 {
        self.grace_secs
    }
    fn flowc_swift_period_secs(&self) -> u64 {
        self.period_secs
    }
}

#[derive(Debug, Default)]
pub struct TxState {
    pub enabled: bool,
    pub enables: u32,
    pub disables: u32,
    pub released: bool,
}

/// TX driver double that records its gating.
#[derive(Clone, Default)]
pub struct MockTx {
    pub state: Rc<RefCell<TxState>>,
}

impl TxDriver for MockTx {
    fn service_enable(&mut self) {
        let mut s = self.state.borrow_mut();
        s.enabled = true;
        s.enables += 1;
    }
    fn service_disable(&mut self) {
        let mut s = self.state.borrow_mut();
        s.enabled = false;
        s.disables += 1;
    }
    fn release(&mut self) {
        self.state.borrow_mut().released = true;
    }
}

/// A queue wired to recording doubles and a manual clock.
pub struct Harness {
    pub clock: Rc<ManualClock>,
    pub callout: Rc<RefCell<Callout<SwiftEvent>>>,
    pub hooks: Rc<RefCell<HookLog>>,
    pub tx: Rc<RefCell<TxState>>,
    pub q: Mq<RecordingHooks, MockTx>,
}

pub fn config(max: usize, hi: usize, lo: usize) -> QueueConfig {
    QueueConfig {
        max_size: max,
        hi_watermark: hi,
        lo_watermark: lo,
        ..QueueConfig::default()
    }
}

pub fn harness(cfg: QueueConfig) -> Harness {
    harness_with(cfg, Discipline::Stream)
}

pub fn harness_with(cfg: QueueConfig, discipline: Discipline) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Rc::new(ManualClock::new());
    let callout = Rc::new(RefCell::new(Callout::new(clock.clone() as Rc<dyn Clock>)));
    let hooks = RecordingHooks::default();
    let tx = MockTx::default();
    let hook_log = hooks.log.clone();
    let tx_state = tx.state.clone();
    let q = Mq::new(
        LogContext::new("peer 192.0.2.7:6346"),
        discipline,
        cfg,
        callout.clone(),
        tx,
        hooks,
    )
    .expect("valid test config");
    Harness {
        clock,
        callout,
        hooks: hook_log,
        tx: tx_state,
        q,
    }
}

impl Harness {
    /// Advance the clock and deliver whatever timers came due.
    pub fn advance(&mut self, ms: u64) {
        self.clock.advance(ms);
        let due = self.callout.borrow_mut().expire_due();
        for ev in due {
            self.q.on_timer(ev);
        }
    }

    /// Write out the whole head message, as the TX driver would. Returns the
    /// bytes consumed.
    pub fn drain_head(&mut self) -> usize {
        let size = self.q.head().map(|m| m.remaining()).unwrap_or(0);
        if size > 0 {
            self.q.notify_bytes_written(size);
        }
        size
    }
}

/// Build a message with the given frame header, padded to `size` bytes.
pub fn frame_msg(
    kind: FrameKind,
    ttl: u8,
    hops: u8,
    prio: Priority,
    size: usize,
    droppable: bool,
) -> MessageBuf {
    assert!(size >= 4, "tests keep a tag byte after the header");
    let mut data = FrameHeader::new(kind, ttl, hops).to_bytes().to_vec();
    data.resize(size, 0);
    MessageBuf::new(Bytes::from(data), prio, droppable)
}

/// Same, with an identifying tag at byte 3 for order assertions.
pub fn tagged_msg(
    kind: FrameKind,
    ttl: u8,
    hops: u8,
    prio: Priority,
    size: usize,
    droppable: bool,
    tag: u8,
) -> MessageBuf {
    let mut data = FrameHeader::new(kind, ttl, hops).to_bytes().to_vec();
    data.resize(size, 0);
    data[3] = tag;
    MessageBuf::new(Bytes::from(data), prio, droppable)
}

pub fn msg_tag(m: &MessageBuf) -> u8 {
    m.data()[3]
}

/// One of our own queries: hops 0, protected from the swift query purge.
pub fn our_query(size: usize) -> MessageBuf {
    frame_msg(FrameKind::Query, 4, 0, Priority::Data, size, true)
}

/// A relayed query: hops > 0, first in line for shedding.
pub fn forwarded_query(size: usize) -> MessageBuf {
    frame_msg(FrameKind::Query, 2, 2, Priority::Data, size, true)
}

/// A query hit, more important than any query.
pub fn hit(size: usize) -> MessageBuf {
    frame_msg(FrameKind::QueryHit, 4, 2, Priority::Data, size, true)
}
