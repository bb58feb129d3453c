//! The typed event bus kernel (§4.2, C3): publish/fanout, point-to-point
//! send, and request/reply over per-consumer bounded mailboxes.

use crate::consumer::{Consumer, DrainHost};
use crate::context::BusHost;
use crate::error::BusError;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use verge_core::{validate_timeout, Address, Body, Message};
use verge_exec::{Executor, Mailbox};

/// Default bounded mailbox capacity for `Bus::consumer` (§4.2).
pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;

const CLOSE_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub executor_workers: usize,
    pub executor_queue: usize,
    pub default_mailbox_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            executor_workers: 10,
            executor_queue: 1000,
            default_mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

/// Owns `address -> ordered list of Consumer`, the shared handler
/// executor, a cancellable scope, and (optionally) a back-reference to the
/// deployment manager used only to mint per-message handler contexts (§3).
pub struct Bus {
    addresses: RwLock<IndexMap<Address, Vec<Arc<Consumer>>>>,
    executor: Arc<Executor>,
    cancel: CancellationToken,
    manager: RwLock<Option<Weak<dyn BusHost>>>,
    registration_counter: AtomicU64,
    default_mailbox_capacity: usize,
    closed: AtomicBool,
}

impl Bus {
    pub fn new(config: BusConfig) -> Arc<Self> {
        Arc::new(Self {
            addresses: RwLock::new(IndexMap::new()),
            executor: Executor::start(config.executor_workers, config.executor_queue),
            cancel: CancellationToken::new(),
            manager: RwLock::new(None),
            registration_counter: AtomicU64::new(0),
            default_mailbox_capacity: config.default_mailbox_capacity,
            closed: AtomicBool::new(false),
        })
    }

    /// Sets the back-edge to the deployment manager. Called once, by the
    /// manager, immediately after both are constructed (§9).
    pub fn attach_manager(&self, manager: Weak<dyn BusHost>) {
        *self.manager.write() = Some(manager);
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Registers (and atomically indexes) a new consumer at `address`
    /// with the default mailbox capacity. Invalid addresses are a
    /// programmer error and panic fast — recoverable only in tests, per
    /// §4.2.
    pub fn consumer(self: &Arc<Self>, address: impl AsRef<str>) -> Arc<Consumer> {
        self.consumer_with_capacity(address, self.default_mailbox_capacity)
    }

    #[allow(clippy::panic)]
    pub fn consumer_with_capacity(
        self: &Arc<Self>,
        address: impl AsRef<str>,
        capacity: usize,
    ) -> Arc<Consumer> {
        let address = Address::parse(address.as_ref())
            .unwrap_or_else(|err| panic!("Bus::consumer: {err}"));
        let seq = self.registration_counter.fetch_add(1, Ordering::AcqRel);
        let mailbox = Mailbox::bounded(capacity);
        let bus_weak: Weak<dyn DrainHost> = Arc::downgrade(self);
        let consumer = Consumer::new(address.clone(), mailbox, seq, bus_weak);

        let mut guard = self.addresses.write();
        guard.entry(address).or_default().push(Arc::clone(&consumer));
        consumer
    }

    /// Fanout to every consumer on `address`. A full mailbox drops only
    /// that consumer's delivery; the call itself only fails for an
    /// invalid address or body (§4.2).
    pub fn publish(&self, address: impl AsRef<str>, body: Body) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        let address = Address::parse(address.as_ref())?;
        let msg = Message::new(body, current_request_id().as_deref());

        let consumers = {
            let guard = self.addresses.read();
            guard.get(&address).cloned().unwrap_or_default()
        };
        for consumer in &consumers {
            if let Err(err) = consumer.mailbox.send(msg.clone()) {
                warn!(address = %address, error = %err, "dropped fanout delivery to a full/closed consumer");
            }
        }
        Ok(())
    }

    /// Point-to-point delivery to the first registered consumer on
    /// `address`. Fails with `NoHandlers` if none are registered, or
    /// `Timeout` if that consumer's mailbox is full (§4.2).
    pub fn send(&self, address: impl AsRef<str>, body: Body) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        let address = Address::parse(address.as_ref())?;
        let msg = Message::new(body, current_request_id().as_deref());
        self.deliver_point_to_point(&address, msg)
    }

    fn deliver_point_to_point(&self, address: &Address, msg: Message) -> Result<(), BusError> {
        let target = {
            let guard = self.addresses.read();
            guard.get(address).and_then(|list| list.first().cloned())
        };
        match target {
            None => Err(BusError::NoHandlers),
            Some(consumer) => consumer.mailbox.send(msg).map_err(BusError::from),
        }
    }

    /// Registers a single-slot temporary reply consumer, delivers `body`
    /// to `address` with the reply address attached, awaits the reply
    /// with a deadline derived from `timeout`, and always unregisters the
    /// temporary consumer before returning (§4.2).
    pub async fn request(
        self: &Arc<Self>,
        address: impl AsRef<str>,
        body: Body,
        timeout: Duration,
    ) -> Result<Message, BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        let address = Address::parse(address.as_ref())?;
        let timeout = validate_timeout(timeout)?;

        let reply_address_raw = format!("_reply.{}", nanoid::nanoid!(21));
        let reply_address = Address::parse(&reply_address_raw)?;
        let reply_consumer = self.consumer_with_capacity(&reply_address_raw, 1);

        let msg = Message::new(body, current_request_id().as_deref())
            .with_reply_address(reply_address_raw);

        let result = async {
            self.deliver_point_to_point(&address, msg)?;
            let cancel = self.cancel.clone();
            match tokio::time::timeout(timeout, reply_consumer.mailbox.receive(&cancel)).await {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(_closed_or_cancelled)) => Err(BusError::Closed),
                Err(_elapsed) => Err(BusError::Timeout),
            }
        }
        .await;

        self.unregister(&reply_address, reply_consumer.registration_seq);
        reply_consumer.close();
        result
    }

    /// Cancels the bus scope, shuts down the handler executor (5s grace),
    /// closes every consumer mailbox, and clears the address index.
    /// Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();

        let all: Vec<Arc<Consumer>> = {
            let guard = self.addresses.read();
            guard.values().flatten().cloned().collect()
        };
        for consumer in &all {
            consumer.close();
        }

        if let Err(err) = self.executor.shutdown(CLOSE_SHUTDOWN_GRACE).await {
            warn!(error = %err, "bus executor shutdown did not finish within its grace window");
        }

        self.addresses.write().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn registered_consumer_count(&self, address: impl AsRef<str>) -> usize {
        let guard = self.addresses.read();
        guard.get(address.as_ref()).map_or(0, Vec::len)
    }
}

impl DrainHost for Bus {
    fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn manager_handle(&self) -> Option<Arc<dyn BusHost>> {
        self.manager.read().as_ref().and_then(Weak::upgrade)
    }

    fn executor(&self) -> Arc<Executor> {
        Arc::clone(&self.executor)
    }

    fn unregister(&self, address: &Address, registration_seq: u64) {
        let mut guard = self.addresses.write();
        if let Some(list) = guard.get_mut(address) {
            list.retain(|c| c.registration_seq != registration_seq);
            if list.is_empty() {
                guard.shift_remove(address);
            }
        }
    }
}

// `Bus::request` takes `self: &Arc<Self>` (it mints a temporary consumer,
// which needs to hand out a `Weak` back-edge). `EventBus` is implemented for
// `Arc<Bus>` rather than `Bus` itself so that receiver shape lines up
// exactly; `Bus::new` already returns an `Arc<Bus>`, so callers never notice.
#[async_trait::async_trait]
impl crate::interface::EventBus for Arc<Bus> {
    fn publish(&self, address: &str, body: Body) -> Result<(), BusError> {
        Bus::publish(self, address, body)
    }

    fn send(&self, address: &str, body: Body) -> Result<(), BusError> {
        Bus::send(self, address, body)
    }

    async fn request(&self, address: &str, body: Body, timeout: Duration) -> Result<Message, BusError> {
        Bus::request(self, address, body, timeout).await
    }

    async fn close(&self) {
        Bus::close(self).await
    }
}

/// `request_id` propagation from the ambient scope a consumer's drain loop
/// establishes around a handler invocation (§3, §4.2), so that `publish`/
/// `send`/`request` calls made from inside a handler inherit the inbound
/// message's `request_id`. `None` outside any handler invocation.
fn current_request_id() -> Option<String> {
    crate::ambient::current()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn body(v: serde_json::Value) -> Body {
        Body::encode(&v).unwrap()
    }

    #[tokio::test]
    async fn publish_fans_out_to_every_consumer() {
        let bus = Bus::new(BusConfig::default());
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let count = Arc::clone(&count);
            let consumer = bus.consumer("work");
            consumer.handler(move |_msg, _ctx| {
                let count = Arc::clone(&count);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }

        for _ in 0..10 {
            bus.publish("work", body(json!({"i": 1}))).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 20);
        bus.close().await;
    }

    #[tokio::test]
    async fn send_goes_to_first_registered_consumer_only() {
        let bus = Bus::new(BusConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let hits1 = Arc::clone(&hits);
        let first = bus.consumer("work");
        first.handler(move |_m, _c| {
            let hits1 = Arc::clone(&hits1);
            async move {
                hits1.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let second = bus.consumer("work");
        second.handler(|_m, _c| async { Ok(()) });

        for _ in 0..50 {
            bus.send("work", body(json!(1))).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 50);
        bus.close().await;
    }

    #[tokio::test]
    async fn send_with_no_consumers_fails_fast() {
        let bus = Bus::new(BusConfig::default());
        let result = bus.send("nobody.home", body(json!(1)));
        assert!(matches!(result, Err(BusError::NoHandlers)));
        bus.close().await;
    }

    #[tokio::test]
    async fn request_round_trips_through_echo_handler() {
        let bus = Bus::new(BusConfig::default());
        let bus_for_handler = Arc::clone(&bus);
        let echo = bus.consumer("echo");
        echo.handler(move |msg: Message, _ctx| {
            let bus = Arc::clone(&bus_for_handler);
            async move {
                let mut value: serde_json::Value = msg.body.decode()?;
                value["ok"] = json!(true);
                let reply_body = Body::encode(&value)?;
                if let Some(reply_to) = &msg.reply_address {
                    bus.send(reply_to, reply_body)?;
                }
                Ok(())
            }
        });

        let reply = bus
            .request("echo", body(json!({"msg": "hi"})), Duration::from_secs(2))
            .await
            .unwrap();
        let decoded: serde_json::Value = reply.body.decode().unwrap();
        assert_eq!(decoded, json!({"msg": "hi", "ok": true}));
        bus.close().await;
    }

    #[tokio::test]
    async fn request_cleans_up_its_reply_consumer_on_timeout() {
        let bus = Bus::new(BusConfig::default());
        let result = bus
            .request("nobody.home", body(json!(1)), Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(BusError::NoHandlers)));
        assert_eq!(bus.registered_consumer_count("nobody.home"), 0);
        bus.close().await;
    }

    #[tokio::test]
    async fn request_id_propagates_to_a_sub_call_made_from_inside_a_handler() {
        let bus = Bus::new(BusConfig::default());
        let bus_for_handler = Arc::clone(&bus);
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_for_handler = Arc::clone(&seen);

        let downstream = bus.consumer("downstream");
        downstream.handler(move |msg: Message, _ctx| {
            let seen = Arc::clone(&seen_for_handler);
            async move {
                *seen.lock().unwrap() = msg.request_id().map(str::to_string);
                Ok(())
            }
        });

        let relay = bus.consumer("relay");
        relay.handler(move |_msg, _ctx| {
            let bus = Arc::clone(&bus_for_handler);
            async move { bus.send("downstream", body(json!({}))) }
        });

        let relay_msg = Message::new(body(json!({})), Some("req-xyz"));
        bus.deliver_point_to_point(&Address::parse("relay").unwrap(), relay_msg)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*seen.lock().unwrap(), Some("req-xyz".to_string()));
        bus.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let bus = Bus::new(BusConfig::default());
        bus.close().await;
        bus.close().await;
    }
}
