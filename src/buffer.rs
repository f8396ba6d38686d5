//! Outbound message buffers.
//!
//! A [`MessageBuf`] owns an immutable payload plus the transmit-side metadata
//! the queue tracks: a priority tag, a droppable flag, and the read cursor
//! counting bytes already handed to the lower TX driver. Payload, priority
//! and droppability never change after construction; only the cursor moves,
//! and only forward.

use std::cmp::Ordering;

use bytes::Bytes;

use crate::frame::{self, FrameHeader};

/// Transmit priority, most disposable first. `Data` is the normal priority
/// carried by the overwhelming majority of traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Data,
    Urgent,
    Control,
}

impl Priority {
    /// Normal-priority traffic takes the FIFO fast path on enqueue.
    pub fn is_normal(self) -> bool {
        self == Priority::Data
    }
}

#[derive(Debug, Clone)]
pub struct MessageBuf {
    data: Bytes,
    priority: Priority,
    droppable: bool,
    read: usize,
}

impl MessageBuf {
    pub fn new(data: Bytes, priority: Priority, droppable: bool) -> Self {
        Self {
            data,
            priority,
            droppable,
            read: 0,
        }
    }

    /// Total payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Bytes not yet handed to the TX driver.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.read
    }

    /// True until the first byte is written out. Only unread messages may be
    /// evicted or cleared.
    pub fn is_unread(&self) -> bool {
        self.read == 0
    }

    pub fn is_fully_sent(&self) -> bool {
        self.read == self.data.len()
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn droppable(&self) -> bool {
        self.droppable
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Unsent tail of the payload, the next bytes a TX driver would read.
    pub fn unread_data(&self) -> &[u8] {
        &self.data[self.read..]
    }

    pub fn header(&self) -> FrameHeader {
        frame::FrameHeader::parse(&self.data)
    }

    /// Advance the read cursor by up to `n` bytes; returns how many were
    /// actually consumed.
    pub(crate) fn advance(&mut self, n: usize) -> usize {
        let step = n.min(self.remaining());
        self.read += step;
        step
    }

    /// Total order used by the drop engine and the sort index: `Less` means
    /// more disposable. Priority dominates; the header comparator breaks ties
    /// within a priority.
    pub fn cmp_disposable(&self, other: &MessageBuf) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| frame::cmp_importance(&self.header(), &other.header()))
    }
}
