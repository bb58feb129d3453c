//! Bounded, multi-producer/single-consumer mailbox (§4.1).

use crate::error::ExecError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio_util::sync::CancellationToken;

/// A bounded FIFO mailbox. Cloneable handles share the same underlying
/// queue; `send` may be called concurrently by many producers, `receive`
/// is intended to be driven by a single consumer task at a time.
pub struct Mailbox<T> {
    tx: mpsc::Sender<T>,
    rx: AsyncMutex<mpsc::Receiver<T>>,
    closed: AtomicBool,
    close_signal: Notify,
    capacity: usize,
}

impl<T: Send + 'static> Mailbox<T> {
    pub fn bounded(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Arc::new(Self {
            tx,
            rx: AsyncMutex::new(rx),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Non-blocking send. Fails with `Full` at capacity, `Closed` once closed.
    pub fn send(&self, msg: T) -> Result<(), ExecError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ExecError::Closed);
        }
        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(ExecError::Full),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ExecError::Closed),
        }
    }

    /// Blocks until a message arrives, the mailbox closes, or `cancel` fires.
    pub async fn receive(&self, cancel: &CancellationToken) -> Result<T, ExecError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ExecError::Closed);
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            item = rx.recv() => item.ok_or(ExecError::Closed),
            _ = self.close_signal.notified() => Err(ExecError::Closed),
            _ = cancel.cancelled() => Err(ExecError::Cancelled),
        }
    }

    /// Idempotent: wakes all waiters with `Closed` and rejects subsequent sends.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close_signal.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
