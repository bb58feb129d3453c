//! A single registration on an [`crate::Bus`] address (§3 "Consumer").

use crate::context::{BusHost, HandlerContext};
use crate::error::BusError;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use verge_core::{Address, Message};
use verge_exec::{ExecError, Executor, Mailbox, Task};

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), BusError>> + Send>>;
pub type HandlerFn = dyn Fn(Message, HandlerContext) -> HandlerFuture + Send + Sync;

/// Blanket conversion from a plain async closure into a boxed [`HandlerFn`].
pub trait IntoHandlerFn {
    fn into_handler_fn(self) -> Arc<HandlerFn>;
}

impl<F, Fut> IntoHandlerFn for F
where
    F: Fn(Message, HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BusError>> + Send + 'static,
{
    fn into_handler_fn(self) -> Arc<HandlerFn> {
        let this = Arc::new(self);
        Arc::new(move |msg, ctx| {
            let this = Arc::clone(&this);
            Box::pin(async move { this(msg, ctx).await }) as HandlerFuture
        })
    }
}

/// The slice of [`crate::Bus`] a consumer's drain loop depends on.
pub(crate) trait DrainHost: Send + Sync {
    fn cancel_token(&self) -> CancellationToken;
    fn manager_handle(&self) -> Option<Arc<dyn BusHost>>;
    fn executor(&self) -> Arc<Executor>;
    fn unregister(&self, address: &Address, registration_seq: u64);
}

/// A registration record created by [`crate::Bus::consumer`]. A consumer
/// without a handler attached never processes messages — sends still
/// succeed but nothing drains the mailbox until [`Consumer::handler`] is
/// called (§3).
pub struct Consumer {
    pub(crate) address: Address,
    pub(crate) mailbox: Arc<Mailbox<Message>>,
    pub(crate) registration_seq: u64,
    pub(crate) bus: Weak<dyn DrainHost>,
    loop_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    done_signal: Notify,
    done_fired: AtomicBool,
}

impl Consumer {
    pub(crate) fn new(
        address: Address,
        mailbox: Arc<Mailbox<Message>>,
        registration_seq: u64,
        bus: Weak<dyn DrainHost>,
    ) -> Arc<Self> {
        Arc::new(Self {
            address,
            mailbox,
            registration_seq,
            bus,
            loop_task: parking_lot::Mutex::new(None),
            done_signal: Notify::new(),
            done_fired: AtomicBool::new(false),
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Attaches a handler and begins draining the mailbox. Required before
    /// any enqueued message is ever processed. Attaching a second handler
    /// is a programmer error and panics fast.
    #[allow(clippy::panic)]
    pub fn handler<H: IntoHandlerFn>(self: &Arc<Self>, handler: H) {
        let mut slot = self.loop_task.lock();
        assert!(slot.is_none(), "handler already attached to consumer on {}", self.address);

        let Some(bus) = self.bus.upgrade() else {
            warn!(address = %self.address, "handler attached after bus was dropped");
            return;
        };
        let handler = handler.into_handler_fn();
        let consumer = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            drain_loop(consumer, bus, handler).await;
        }));
    }

    /// Fires exactly once, when the drain loop exits after mailbox close.
    /// A consumer with no handler attached never fires this.
    pub async fn done(&self) {
        if self.done_fired.load(Ordering::Acquire) {
            return;
        }
        self.done_signal.notified().await;
    }

    pub(crate) fn fire_done(&self) {
        if self.done_fired.swap(true, Ordering::AcqRel) {
            return;
        }
        self.done_signal.notify_waiters();
    }

    pub fn close(&self) {
        self.mailbox.close();
    }
}

/// Drives one consumer's mailbox to completion: receive, submit the
/// handler invocation to the bus's shared executor, repeat (§4.2). Submit
/// never blocks — a rejected submission (queue full, executor closed) is
/// logged and that single delivery is dropped, mirroring the bus-level
/// fanout backpressure policy (§5).
async fn drain_loop(consumer: Arc<Consumer>, bus: Arc<dyn DrainHost>, handler: Arc<HandlerFn>) {
    let cancel = bus.cancel_token();
    loop {
        let msg = match consumer.mailbox.receive(&cancel).await {
            Ok(msg) => msg,
            Err(_closed_or_cancelled) => break,
        };

        let request_id = msg.request_id().map(str::to_string);
        let mut ctx = HandlerContext::new(cancel.clone(), request_id.clone());
        if let Some(manager) = bus.manager_handle() {
            ctx = ctx.with_manager(manager);
        }

        let address = consumer.address.clone();
        let handler = Arc::clone(&handler);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let scope_request_id = request_id.clone();
        let task = Task::new(format!("bus-handler:{address}"), async move {
            let outcome = crate::ambient::scope(scope_request_id, AssertUnwindSafe(handler(msg, ctx)).catch_unwind()).await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(
                        address = %address,
                        request_id = request_id.as_deref().unwrap_or(""),
                        error = %err,
                        "handler returned an error"
                    );
                }
                Err(_panic) => {
                    error!(
                        address = %address,
                        request_id = request_id.as_deref().unwrap_or(""),
                        "handler panicked"
                    );
                }
            }
            let _ = done_tx.send(());
            Ok(())
        });

        // Submitting spreads handler execution across the bus's shared
        // worker pool, but this loop still awaits completion before
        // receiving the next message: per-consumer delivery order must
        // stay strict FIFO (§4.2) even though workers are shared across
        // every other consumer's deliveries too.
        match bus.executor().submit(task) {
            Ok(()) => {
                let _ = done_rx.await;
            }
            Err(ExecError::QueueFull) => {
                warn!(address = %consumer.address, "dropping delivery: handler executor queue is full");
            }
            Err(ExecError::Closed) => break,
            Err(_) => {}
        }
    }

    bus.unregister(&consumer.address, consumer.registration_seq);
    consumer.fire_done();
}
