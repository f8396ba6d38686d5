//! Async pump that owns a queue and drives its timers.
//!
//! The queue core is synchronous; this module gives a peer session the usual
//! task-plus-handle shape: commands go in over an unbounded channel, the loop
//! applies them run-to-completion, and between commands it sleeps until the
//! next callout deadline and routes fired timer tokens back into the queue.
//!
//! The loop is spawned with `spawn_local` and must run inside a
//! [`tokio::task::LocalSet`]: everything stays on one thread, which is the
//! model the queue is built for: no locks, no reentrancy.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::buffer::MessageBuf;
use crate::callout::Callout;
use crate::clock::{Clock, MonotonicClock};
use crate::config::QueueConfig;
use crate::hooks::{LogContext, PeerHooks, TxDriver};
use crate::queue::{Discipline, Mq, QueueSnapshot, SwiftEvent};

/// Fallback poll interval when no timer is armed.
const IDLE_TICK: Duration = Duration::from_millis(50);

pub enum QueueCommand {
    Enqueue(MessageBuf),
    BytesWritten(usize),
    Clear,
    Shutdown,
    Snapshot(oneshot::Sender<QueueSnapshot>),
    Close(oneshot::Sender<()>),
}

/// Cheap cloneable handle onto a queue pump.
#[derive(Clone, Debug)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<QueueCommand>,
}

impl QueueHandle {
    pub fn enqueue(&self, m: MessageBuf) {
        let _ = self.tx.send(QueueCommand::Enqueue(m));
    }

    /// Report bytes the TX driver consumed from the transmit side.
    pub fn bytes_written(&self, n: usize) {
        let _ = self.tx.send(QueueCommand::BytesWritten(n));
    }

    pub fn clear(&self) {
        let _ = self.tx.send(QueueCommand::Clear);
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(QueueCommand::Shutdown);
    }

    pub async fn snapshot(&self) -> Option<QueueSnapshot> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(QueueCommand::Snapshot(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }

    /// Stop the pump, dropping the queue and whatever it still holds.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(QueueCommand::Close(tx));
        let _ = rx.await;
    }
}

/// Spawn the pump for one peer's queue. Must be called from within a
/// `LocalSet`.
pub fn start_tx_loop<H, T>(
    label: LogContext,
    discipline: Discipline,
    cfg: QueueConfig,
    tx_driver: T,
    hooks: H,
) -> QueueHandle
where
    H: PeerHooks + 'static,
    T: TxDriver + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<QueueCommand>();
    let handle = QueueHandle { tx };

    tokio::task::spawn_local(async move {
        let clock = Rc::new(MonotonicClock::new());
        let callout = Rc::new(RefCell::new(Callout::<SwiftEvent>::new(
            clock.clone() as Rc<dyn Clock>
        )));
        let mut q = match Mq::new(label, discipline, cfg, callout.clone(), tx_driver, hooks) {
            Ok(q) => q,
            Err(e) => {
                log::error!("refusing to start tx queue loop: {e}");
                return;
            }
        };

        loop {
            let sleep_for = callout
                .borrow()
                .next_deadline_ms()
                .map(|deadline| Duration::from_millis(deadline.saturating_sub(clock.now_ms())))
                .unwrap_or(IDLE_TICK);

            let cmd = tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(cmd) => Some(cmd),
                    None => break, // every handle dropped
                },
                _ = tokio::time::sleep(sleep_for) => None,
            };

            let due = callout.borrow_mut().expire_due();
            for ev in due {
                q.on_timer(ev);
            }

            match cmd {
                Some(QueueCommand::Enqueue(m)) => q.enqueue(m),
                Some(QueueCommand::BytesWritten(n)) => q.notify_bytes_written(n),
                Some(QueueCommand::Clear) => q.clear(),
                Some(QueueCommand::Shutdown) => q.shutdown(),
                Some(QueueCommand::Snapshot(resp)) => {
                    let _ = resp.send(q.snapshot());
                }
                Some(QueueCommand::Close(done)) => {
                    let _ = done.send(());
                    break;
                }
                None => {}
            }
        }
        log::debug!("tx queue loop terminated");
    });

    handle
}
