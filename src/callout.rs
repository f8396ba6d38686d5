//! One-shot timer service driven by the owning event loop.
//!
//! The queue schedules its flow-control events here and gets back an opaque
//! [`TimerHandle`]. Expired events are returned as plain tokens from
//! [`Callout::expire_due`]; the owner routes each token back into whichever
//! queue scheduled it. Nothing here calls back into anything, which keeps
//! cancellation race-free during dispatch.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;

use crate::clock::Clock;

/// Handle for a scheduled event. Cancellation through a handle is idempotent;
/// a handle for an event that already fired is simply ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct Entry<T> {
    fire_at_ms: u64,
    token: T,
}

/// One-shot timer queue over a [`Clock`].
pub struct Callout<T> {
    clock: Rc<dyn Clock>,
    entries: HashMap<u64, Entry<T>>,
    // May hold ids whose entry was cancelled; expire_due skips those.
    order: BinaryHeap<Reverse<(u64, u64)>>,
    next_id: u64,
}

impl<T> Callout<T> {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: HashMap::new(),
            order: BinaryHeap::new(),
            next_id: 0,
        }
    }

    /// Schedule `token` to fire `delay_ms` from now.
    pub fn schedule_in(&mut self, delay_ms: u64, token: T) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        let fire_at_ms = self.clock.now_ms() + delay_ms;
        self.entries.insert(id, Entry { fire_at_ms, token });
        self.order.push(Reverse((fire_at_ms, id)));
        TimerHandle(id)
    }

    /// Cancel a scheduled event. Safe to call any number of times, including
    /// for events that already fired.
    pub fn cancel(&mut self, handle: TimerHandle) {
        self.entries.remove(&handle.0);
    }

    pub fn is_scheduled(&self, handle: TimerHandle) -> bool {
        self.entries.contains_key(&handle.0)
    }

    /// Number of live (scheduled, not yet fired or cancelled) events.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deadline of the earliest live event, in clock milliseconds.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.entries.values().map(|e| e.fire_at_ms).min()
    }

    /// Pop every event whose deadline has passed, in firing order.
    pub fn expire_due(&mut self) -> Vec<T> {
        let now = self.clock.now_ms();
        let mut due = Vec::new();
        while let Some(&Reverse((fire_at, id))) = self.order.peek() {
            if fire_at > now {
                break;
            }
            self.order.pop();
            if let Some(entry) = self.entries.remove(&id) {
                due.push(entry.token);
            }
        }
        due
    }
}

impl<T> std::fmt::Debug for Callout<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callout")
            .field("scheduled", &self.entries.len())
            .finish()
    }
}
