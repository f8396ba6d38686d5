//! Per-peer outbound message queue.
//!
//! The queue sits at the top of a peer's TX stack. Messages are appended in
//! FIFO order (prioritary traffic jumps near the transmit side), drained from
//! the head by the lower driver, and shed according to a three-zone watermark
//! state machine once the peer stops keeping up:
//!
//! * **warn**: above the low watermark; the peer is notified and nothing else
//!   changes.
//! * **flow control**: above the high watermark; droppable traffic is only
//!   accepted if something cheaper can be evicted first, and a grace timer
//!   starts ticking.
//! * **SWIFT**: flow control outlasted the grace period; periodic
//!   checkpoints compute a byte budget from the observed flush and fill
//!   rates and force-drop the least valuable traffic against it.
//!
//! Eviction runs over a cached importance-sorted view of the queue (the sort
//! index) that is patched in place across enqueues and drops, and released
//! when flow control ends. A message that the driver has started writing is
//! never touched by any of this: evicting half-sent bytes would corrupt the
//! peer's framing.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use crate::buffer::{MessageBuf, Priority};
use crate::callout::{Callout, TimerHandle};
use crate::config::{ConfigError, QueueConfig};
use crate::flow::{self, QueueFlags, Zone, ZoneAction};
use crate::frame::{self, FrameHeader};
use crate::hooks::{LogContext, PeerHooks, TxDriver, OVERFLOW_BYE_CODE};
use crate::index::SortIndex;
use crate::metrics;
use crate::store::Store;
use crate::swift;

/// Timer tokens the queue schedules on its callout. The owner routes fired
/// tokens back through [`Mq::on_timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwiftEvent {
    /// Grace period expired: escalate flow control to SWIFT.
    Grace,
    /// Periodic SWIFT checkpoint.
    Checkpoint,
}

/// Enqueue policy split between transport flavors. Both share everything
/// except the decision for a prioritary message that overflows a full queue:
/// a stream peer must be closed (losing a control message mid-sequence
/// desynchronizes it), datagram traffic is inherently lossy so the message
/// is just dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    Stream,
    Datagram,
}

/// Read-only view of queue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub bytes: usize,
    pub count: usize,
    pub zone: Zone,
    pub swift: bool,
    pub shutdown: bool,
    pub tx_dropped: u64,
}

pub struct Mq<H: PeerHooks, T: TxDriver> {
    label: LogContext,
    cfg: QueueConfig,
    discipline: Discipline,
    store: Store,
    /// Present iff the drop engine ran under flow control and flow control
    /// has not been released since.
    index: Option<SortIndex>,
    flags: QueueFlags,
    /// Live bytes queued: payload sizes minus what the driver already took
    /// out of the head.
    size: usize,
    /// Queue size at the last SWIFT checkpoint.
    last_size: usize,
    /// Bytes flushed to the driver since the last checkpoint.
    flowc_written: usize,
    /// Delay the pending swift event was scheduled with; doubles as the
    /// elapsed time when it fires.
    swift_elapsed_ms: u64,
    swift_ev: Option<TimerHandle>,
    callout: Rc<RefCell<Callout<SwiftEvent>>>,
    hooks: H,
    tx: T,
    tx_dropped: u64,
}

impl<H: PeerHooks, T: TxDriver> Mq<H, T> {
    pub fn new(
        label: LogContext,
        discipline: Discipline,
        cfg: QueueConfig,
        callout: Rc<RefCell<Callout<SwiftEvent>>>,
        tx: T,
        hooks: H,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            label,
            cfg,
            discipline,
            store: Store::new(),
            index: None,
            flags: QueueFlags::empty(),
            size: 0,
            last_size: 0,
            flowc_written: 0,
            swift_elapsed_ms: 0,
            swift_ev: None,
            callout,
            hooks,
            tx,
            tx_dropped: 0,
        })
    }

    /// Queued bytes not yet written out.
    pub fn bytes(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn zone(&self) -> Zone {
        Zone::from_flags(self.flags)
    }

    pub fn in_swift(&self) -> bool {
        self.flags.contains(QueueFlags::SWIFT)
    }

    pub fn is_shutdown(&self) -> bool {
        self.flags.contains(QueueFlags::SHUTDOWN)
    }

    /// Next message to transmit.
    pub fn head(&self) -> Option<&MessageBuf> {
        self.store.head().map(|k| self.store.get(k))
    }

    /// Messages in the order the driver will see them.
    pub fn iter_transmit_order(&self) -> impl Iterator<Item = &MessageBuf> {
        self.store.iter_keys().map(move |k| self.store.get(k))
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            bytes: self.size,
            count: self.store.len(),
            zone: self.zone(),
            swift: self.in_swift(),
            shutdown: self.is_shutdown(),
            tx_dropped: self.tx_dropped,
        }
    }

    /// Enqueue a message; the queue owns it from here. Under flow control a
    /// droppable message is only accepted if traffic strictly less important
    /// than it can cover its size; a message that cannot fit inside
    /// `max_size` either displaces cheaper traffic, gets dropped (normal
    /// priority or datagram discipline), or escalates to a fatal overflow
    /// when a prioritary message meets a stream queue with nothing cheaper in it.
    pub fn enqueue(&mut self, m: MessageBuf) {
        if self.flags.contains(QueueFlags::SHUTDOWN) {
            log::trace!(
                "{}: queue shut down, discarding {} byte message",
                self.label,
                m.size()
            );
            return;
        }
        if m.size() == 0 {
            debug_assert!(false, "zero-byte message enqueued");
            log::warn!("{}: discarding zero-byte message", self.label);
            return;
        }

        let msize = m.size();
        let header = m.header();
        let prio = m.priority();

        let mut hint = None;
        let mut room_called = false;

        if self.flags.contains(QueueFlags::FLOWC) && prio.is_normal() && m.droppable() {
            room_called = true;
            let (enough, h) = self.make_room(&header, prio, msize);
            hint = h;
            if !enough {
                debug_assert!(m.is_unread());
                log::debug!(
                    "{}: flow-controlled, dropping droppable {:?} ({} bytes queued)",
                    self.label,
                    header.kind,
                    self.size
                );
                self.record_incoming_drop();
                return;
            }
        }

        let needed = (self.size + msize).saturating_sub(self.cfg.max_size);
        if needed > 0 {
            // make_room runs at most once per enqueue; if the droppable scan
            // above already ran and we still do not fit, this is a failure.
            let enough = if room_called {
                false
            } else {
                let (enough, h) = self.make_room(&header, prio, needed);
                hint = h;
                enough
            };
            if !enough {
                debug_assert!(m.is_unread());
                if prio.is_normal() || self.discipline == Discipline::Datagram {
                    log::debug!(
                        "{}: queue full, dropping {:?} message ({} bytes queued)",
                        self.label,
                        header.kind,
                        self.size
                    );
                    self.record_incoming_drop();
                } else {
                    log::warn!(
                        "{}: prioritary {:?} overflows full queue, closing peer (max {} bytes)",
                        self.label,
                        header.kind,
                        self.cfg.max_size
                    );
                    metrics::inc_fatal_overflows();
                    self.hooks.on_fatal_overflow(OVERFLOW_BYE_CODE, self.cfg.max_size);
                }
                return;
            }
        }
        debug_assert!(self.size + msize <= self.cfg.max_size);

        // Normal priority appends: plain FIFO, the common case. Prioritary
        // messages walk from the transmit side past the partially-written
        // head and any message at their own priority or above, landing just
        // before the first strictly less prioritary one.
        let key = if prio.is_normal() {
            self.store.push_tail(m)
        } else {
            let mut at = None;
            let mut cur = self.store.head();
            while let Some(k) = cur {
                let node = self.store.get(k);
                if node.is_unread() && node.priority() < prio {
                    at = Some(k);
                    break;
                }
                cur = self.store.next(k);
            }
            match at {
                Some(k) => self.store.insert_before(k, m),
                None => self.store.push_tail(m),
            }
        };
        self.size += msize;

        // Keep the sort index coherent. A hint from make_room pinpoints the
        // first message ranked at least as high; without one, binary search.
        if let Some(mut index) = self.index.take() {
            match hint {
                Some(offset) => index.insert_before(offset, key, &self.store),
                None => index.insert(key, &self.store),
            }
            self.index = Some(index);
        }

        metrics::inc_enqueued();
        self.update_zone();
        self.tx.service_enable();
        if self.store.len() == 1 {
            self.hooks.on_tx_service_needed(true);
        }
    }

    /// Remove every message the driver has not started writing. The
    /// partially-written head, if any, stays: yanking it would desynchronize
    /// the peer's framing.
    pub fn clear(&mut self) {
        if self.store.is_empty() {
            return;
        }
        let mut cur = self.store.head();
        while let Some(key) = cur {
            let next = self.store.next(key);
            if self.store.get(key).is_unread() {
                let removed = self.store.remove(key);
                self.size -= removed.remaining();
            }
            cur = next;
        }
        debug_assert!(self.store.len() <= 1);
        self.index = None;
        self.update_zone();
        if self.store.is_empty() {
            self.tx.service_disable();
            self.hooks.on_tx_service_needed(false);
        }
    }

    /// Forbid further enqueues. Queued messages keep draining.
    pub fn shutdown(&mut self) {
        log::debug!("{}: queue shut down", self.label);
        self.flags |= QueueFlags::SHUTDOWN;
    }

    /// The driver consumed `n` more bytes from the transmit side. Advances
    /// the head cursor, retires fully-sent messages, and re-evaluates the
    /// flow-control zone.
    pub fn notify_bytes_written(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if self.flags.contains(QueueFlags::FLOWC) {
            self.flowc_written += n;
        }
        let mut left = n;
        while left > 0 {
            let Some(key) = self.store.head() else {
                debug_assert!(false, "TX driver wrote more than was queued");
                log::error!(
                    "{}: driver reported {} bytes with an empty queue, recounting",
                    self.label,
                    left
                );
                self.reconcile();
                break;
            };
            let step = self.store.get_mut(key).advance(left);
            if step == 0 {
                debug_assert!(false, "fully-sent message left at queue head");
                log::error!("{}: fully written message still queued, recounting", self.label);
                self.reconcile();
                break;
            }
            self.size -= step;
            left -= step;
            if self.store.get(key).is_fully_sent() {
                self.store.remove(key);
                if let Some(index) = self.index.as_mut() {
                    index.remove(key, self.store.len());
                }
            }
        }
        self.update_zone();
        if self.store.is_empty() {
            self.tx.service_disable();
            self.hooks.on_tx_service_needed(false);
        }
    }

    /// Route a fired timer token. A token that outlived its flow-control
    /// episode is ignored.
    pub fn on_timer(&mut self, ev: SwiftEvent) {
        match ev {
            SwiftEvent::Grace => {
                if !self.flags.contains(QueueFlags::FLOWC) || self.flags.contains(QueueFlags::SWIFT)
                {
                    return;
                }
                self.swift_ev = None;
                self.flags |= QueueFlags::SWIFT;
                log::debug!("{}: entering SWIFT ({} bytes queued)", self.label, self.size);
                self.hooks.on_tx_enter_swift();
                self.swift_checkpoint(true);
            }
            SwiftEvent::Checkpoint => {
                if !self.flags.contains(QueueFlags::FLOWC | QueueFlags::SWIFT) {
                    return;
                }
                self.swift_ev = None;
                self.swift_checkpoint(false);
            }
        }
    }

    /// Make room for `needed` bytes by evicting messages strictly less
    /// important than the reference, scanning the sort index from the most
    /// disposable end. Returns whether enough was freed, plus the index
    /// offset of the message that stopped the scan, so the caller can insert
    /// there without a second search. Tries to free one byte more than
    /// asked, so a frontier hit at exactly zero remaining still succeeds.
    fn make_room(
        &mut self,
        reference: &FrameHeader,
        prio: Priority,
        needed: usize,
    ) -> (bool, Option<usize>) {
        debug_assert!(needed > 0);

        if self.store.is_empty() {
            return (false, None);
        }
        if self.index.is_none() {
            self.index = Some(SortIndex::build(&self.store));
        }
        log::trace!(
            "{}: trying to make room for {} bytes ({} queued)",
            self.label,
            needed,
            self.size
        );

        let mut index = self.index.take().expect("sort index");
        let mut needed = needed as i64;
        let mut hint = None;
        let mut dropped: u32 = 0;

        let mut n = 0;
        while needed >= 0 && n < index.len() {
            let Some(key) = index.get(n) else {
                n += 1;
                continue;
            };
            let cand = self.store.get(key);

            // A partially-written message cannot go, however unimportant.
            if !cand.is_unread() {
                n += 1;
                continue;
            }

            // Reached traffic at least as important as the reference: not
            // enough cheap messages ahead of it, stop here.
            if frame::cmp_importance(&cand.header(), reference) != Ordering::Less {
                hint = Some(n);
                break;
            }

            // A higher priority protects everything that follows, whatever
            // the header comparison says.
            if cand.priority() > prio {
                hint = Some(n);
                break;
            }

            let evicted = self.store.remove(key);
            self.size -= evicted.remaining();
            index.tombstone(n);
            needed -= evicted.size() as i64;
            dropped += 1;
            n += 1;
        }

        self.index = Some(index);

        if dropped > 0 {
            self.tx_dropped += u64::from(dropped);
            if self.flags.contains(QueueFlags::SWIFT) {
                metrics::inc_swift_drops(u64::from(dropped));
            } else {
                metrics::inc_flowc_drops(u64::from(dropped));
            }
            self.hooks.on_tx_drop_recorded(dropped);
            log::debug!(
                "{}: purged {} message(s), {} bytes queued, still need {}",
                self.label,
                dropped,
                self.size,
                needed.max(0)
            );
        }

        // The purge may have drained enough to release flow control, or even
        // emptied the queue outright.
        self.update_zone();
        if self.store.is_empty() {
            self.tx.service_disable();
            self.hooks.on_tx_service_needed(false);
        }

        (needed <= 0, hint)
    }

    fn record_incoming_drop(&mut self) {
        self.tx_dropped += 1;
        metrics::inc_flowc_drops(1);
        self.hooks.on_tx_drop_recorded(1);
    }

    fn update_zone(&mut self) {
        match flow::zone_action(
            self.flags,
            self.size,
            self.cfg.lo_watermark,
            self.cfg.hi_watermark,
        ) {
            ZoneAction::EnterFlowc => self.enter_flowc(),
            ZoneAction::LeaveFlowc => self.leave_flowc(),
            ZoneAction::EnterWarn => {
                self.flags |= QueueFlags::WARN;
                self.hooks.on_tx_enter_warn();
            }
            ZoneAction::LeaveWarn => {
                self.flags -= QueueFlags::WARN;
                self.hooks.on_tx_leave_warn();
            }
            ZoneAction::Hold => {}
        }
    }

    fn enter_flowc(&mut self) {
        debug_assert!(self.swift_ev.is_none());
        debug_assert!(!self.flags.intersects(QueueFlags::FLOWC | QueueFlags::SWIFT));

        self.flags |= QueueFlags::FLOWC | QueueFlags::WARN;
        self.flowc_written = 0;
        self.last_size = self.size;
        self.swift_elapsed_ms = self.hooks.flowc_swift_grace_secs() * 1000;
        self.swift_ev = Some(
            self.callout
                .borrow_mut()
                .schedule_in(self.swift_elapsed_ms, SwiftEvent::Grace),
        );
        self.hooks.on_tx_enter_flowc();
        log::debug!("{}: entering FLOWC ({} bytes queued)", self.label, self.size);
    }

    fn leave_flowc(&mut self) {
        debug_assert!(self.flags.contains(QueueFlags::FLOWC));
        log::debug!(
            "{}: leaving {} ({} bytes queued)",
            self.label,
            if self.flags.contains(QueueFlags::SWIFT) {
                "SWIFT"
            } else {
                "FLOWC"
            },
            self.size
        );

        self.flags -= QueueFlags::FLOWC | QueueFlags::SWIFT | QueueFlags::WARN;
        self.index = None;
        if let Some(ev) = self.swift_ev.take() {
            self.callout.borrow_mut().cancel(ev);
        }
        self.hooks.on_tx_leave_flowc();
    }

    fn swift_checkpoint(&mut self, initial: bool) {
        debug_assert!(self.flags.contains(QueueFlags::FLOWC));
        if self.size <= self.cfg.lo_watermark {
            // A timely zone update would already have released flow control.
            self.update_zone();
            return;
        }

        let elapsed_ms = self.swift_elapsed_ms;
        self.swift_elapsed_ms = self.hooks.flowc_swift_period_secs() * 1000;

        let mut needed = swift::drop_budget(swift::Checkpoint {
            bytes: self.size,
            lo_watermark: self.cfg.lo_watermark,
            last_size: self.last_size,
            flushed: self.flowc_written,
            elapsed_ms,
            next_period_ms: self.swift_elapsed_ms,
            burst_margin_divisor: self.cfg.swift.burst_margin_divisor,
            flush_decay_divisor: self.cfg.swift.flush_decay_divisor,
        }) as i64;

        if initial {
            // First checkpoint: purge forwarded queries, they have aged past
            // usefulness. Our own hops-0 queries stay. Whether this frees
            // enough does not matter yet; query hits become fair game at the
            // next checkpoint.
            if needed > 0 {
                let template = swift::query_purge_header(self.cfg.swift.max_ttl);
                let _ = self.make_room(&template, Priority::Data, needed as usize);
            }
        } else {
            // Walk query hits from least valuable (near, fresh) upward until
            // the budget is spent or the walk is exhausted.
            let hard = self.cfg.swift.hard_ttl_limit;
            let mut ttl = i16::from(hard);
            while needed > 0 && ttl >= 0 {
                let before = self.size;
                let template = swift::hit_purge_header(hard, ttl as u8);
                let (enough, _) = self.make_room(&template, Priority::Data, needed as usize);
                if enough {
                    break;
                }
                needed -= (before - self.size) as i64;
                ttl -= 1;
            }
        }

        self.update_zone();

        // Still in SWIFT: restart the accounting window and rearm the timer.
        if self.flags.contains(QueueFlags::SWIFT) {
            self.flowc_written = 0;
            self.last_size = self.size;
            self.swift_ev = Some(
                self.callout
                    .borrow_mut()
                    .schedule_in(self.swift_elapsed_ms, SwiftEvent::Checkpoint),
            );
        }
    }

    /// Recount `size` from the store after a detected accounting breach.
    fn reconcile(&mut self) {
        let bytes: usize = self
            .store
            .iter_keys()
            .map(|k| self.store.get(k).remaining())
            .sum();
        if bytes != self.size {
            log::error!(
                "{}: queue accounting drifted (recorded {}, actual {}), recounted",
                self.label,
                self.size,
                bytes
            );
            self.size = bytes;
        }
    }
}

impl<H: PeerHooks, T: TxDriver> Drop for Mq<H, T> {
    fn drop(&mut self) {
        // Release the driver before the queued messages go away, and make
        // sure no timer token outlives the queue.
        if let Some(ev) = self.swift_ev.take() {
            self.callout.borrow_mut().cancel(ev);
        }
        self.tx.release();
    }
}

impl<H: PeerHooks, T: TxDriver> std::fmt::Debug for Mq<H, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mq")
            .field("label", &self.label)
            .field("bytes", &self.size)
            .field("count", &self.store.len())
            .field("zone", &self.zone())
            .field("swift", &self.in_swift())
            .finish()
    }
}
