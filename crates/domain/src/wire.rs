use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::event::StepEvent;

/// Default channel capacity when a caller doesn't pick one. Large enough to
/// absorb a burst of STEP_DELTA events without the model-call task blocking
/// on a slow consumer.
pub const DEFAULT_CAPACITY: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("wire is closed")]
    Closed,
}

/// A bounded, ordered, single-closer event channel shared by a run and,
/// transparently, by every nested run spawned from it.
///
/// Built on `tokio::mpsc`, which already gives bounded capacity and
/// per-sender FIFO ordering; `close()` layers an explicit idempotent flag
/// on top so that a write after close returns an error instead of relying
/// solely on "all senders dropped" semantics — a late write from, say, a
/// trace collector's background task should be swallowed, not panic.
pub struct Wire {
    tx: mpsc::Sender<StepEvent>,
    rx: parking_lot::Mutex<Option<mpsc::Receiver<StepEvent>>>,
    closed: Arc<AtomicBool>,
}

impl Wire {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: parking_lot::Mutex::new(Some(rx)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cloned_sender(&self) -> WireSender {
        WireSender {
            tx: self.tx.clone(),
            closed: self.closed.clone(),
        }
    }

    pub async fn write(&self, event: StepEvent) -> Result<(), WireError> {
        self.cloned_sender().write(event).await
    }

    /// Idempotent. Only the top-level run driver should call this — nested
    /// runs borrow the wire but never close it (see `ExecutionContext`).
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Takes ownership of the receiving half. Can only be called once; the
    /// top-level `run_stream` driver is the sole reader.
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<StepEvent>> {
        self.rx.lock().take()
    }
}

/// A cheaply-cloneable write handle to a `Wire`, handed to every task that
/// may need to emit events — the top-level driver, tool-execution tasks,
/// and any nested run sharing the same wire.
#[derive(Clone)]
pub struct WireSender {
    tx: mpsc::Sender<StepEvent>,
    closed: Arc<AtomicBool>,
}

impl WireSender {
    pub async fn write(&self, event: StepEvent) -> Result<(), WireError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WireError::Closed);
        }
        // A send failing because the receiver was dropped is equivalent to
        // the wire being closed from the consumer side.
        self.tx.send(event).await.map_err(|_| WireError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
