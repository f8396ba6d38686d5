//! # Gossipq - Outbound Message Queues for Gossip Overlay Servents
//!
//! Gossipq is the transmission scheduler that sits at the top of each peer's
//! TX stack in a gossip-overlay servent. Every peer connection gets one
//! queue; the queue decides what is sent next, what is shed when the peer
//! stops draining its socket, and when the connection is beyond saving.
//!
//! ## Features
//!
//! - **Priority FIFO**: normal traffic appends in O(1); urgent and control
//!   frames jump ahead of lesser traffic without ever reordering their own
//!   priority class or touching a half-written message.
//! - **Watermark Flow Control**: three zones with hysteresis (normal, warn,
//!   flow-controlled) driven by queued byte counts, with peer notifications
//!   at every boundary crossing.
//! - **SWIFT Load Shedding**: when flow control outlasts a grace period, the
//!   queue drops the least valuable traffic against a per-period byte budget
//!   computed from observed flush and fill rates.
//! - **In-Place Drop Engine**: eviction scans a cached importance-sorted
//!   view that survives across enqueues via tombstones, hint offsets, and
//!   lazy compaction.
//! - **Deterministic Timers**: an injected clock and a token-based callout
//!   service keep every timer path testable and cancellation race-free.
//! - **Async Pump**: an optional Tokio task per peer exposes the queue as a
//!   cloneable command handle in the usual actor shape.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use bytes::Bytes;
//! use gossipq::buffer::{MessageBuf, Priority};
//! use gossipq::callout::Callout;
//! use gossipq::clock::{Clock, MonotonicClock};
//! use gossipq::config::QueueConfig;
//! use gossipq::frame::{FrameHeader, FrameKind};
//! use gossipq::hooks::{LogContext, NullDriver, NullHooks};
//! use gossipq::queue::{Discipline, Mq};
//!
//! fn main() -> anyhow::Result<()> {
//!     let clock = Rc::new(MonotonicClock::new());
//!     let callout = Rc::new(RefCell::new(Callout::new(clock as Rc<dyn Clock>)));
//!
//!     let mut queue = Mq::new(
//!         LogContext::new("192.0.2.7:6346"),
//!         Discipline::Stream,
//!         QueueConfig::default(),
//!         callout.clone(),
//!         NullDriver,
//!         NullHooks,
//!     )?;
//!
//!     let mut payload = FrameHeader::new(FrameKind::Query, 4, 0).to_bytes().to_vec();
//!     payload.extend_from_slice(b"search terms");
//!     queue.enqueue(MessageBuf::new(Bytes::from(payload), Priority::Data, true));
//!
//!     // The owning loop drains timers and feeds them back. Collect first:
//!     // on_timer may reschedule through the same callout.
//!     let due = callout.borrow_mut().expire_due();
//!     for ev in due {
//!         queue.on_timer(ev);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`queue`] - The queue facade: enqueue, clear, shutdown, drop engine, zones
//! - [`buffer`] - Message payloads with priority tags and read cursors
//! - [`frame`] - Frame headers and the importance order used when shedding
//! - [`flow`] - Watermark zones and the queue flag word
//! - [`callout`] / [`clock`] - Timer service and injected time source
//! - [`hooks`] - Peer notification and TX driver interfaces
//! - [`config`] - Watermark and SWIFT tuning, TOML-loadable
//! - [`metrics`] - Process-wide TX drop accounting
//! - [`driver`] - Per-peer Tokio pump task and command handle
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   Peer session   │ ← hooks: warn/flowc/swift, drops, fatal overflow
//! └──────────────────┘
//!          │ enqueue
//! ┌──────────────────┐     ┌────────────────┐
//! │  Message queue   │ ──→ │  Sort index    │ (flow control only)
//! │  (priority FIFO) │     │  (drop engine) │
//! └──────────────────┘     └────────────────┘
//!          │ head bytes
//! ┌──────────────────┐
//! │    TX driver     │ ← service enable/disable, bytes-written feedback
//! └──────────────────┘
//! ```
//!
//! The queue owns its messages from enqueue to removal and nothing else: the
//! peer and the TX driver are reached only through the narrow traits in
//! [`hooks`]. All operations run to completion on one thread.

pub mod buffer;
pub mod callout;
pub mod clock;
pub mod config;
pub mod driver;
pub mod flow;
pub mod frame;
pub mod hooks;
pub mod metrics;
pub mod queue;

mod index;
mod store;
mod swift;
