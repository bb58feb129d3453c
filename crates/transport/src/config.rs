//! Transport adapter configuration (§4.6).

use std::time::Duration;

/// Whether traffic flows over plain NATS core pub-sub (`Direct`, at-most
/// delivery like C3's in-process mailboxes) or JetStream-backed streams
/// with retention and manual acks (`Durable`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Direct,
    Durable,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// NATS server URL, e.g. `nats://127.0.0.1:4222`.
    pub nats_url: String,
    /// Subject prefix every address is namespaced under.
    pub prefix: String,
    /// Identifies this service for fanout queue-group naming.
    pub service: String,
    pub delivery_mode: DeliveryMode,
    /// JetStream-only: how long the durable streams retain messages.
    pub stream_max_age: Duration,
    /// JetStream-only: how long a delivered-but-unacked message is held
    /// before redelivery.
    pub ack_wait: Duration,
    /// JetStream-only: max unacked messages in flight per consumer.
    pub max_in_flight: usize,
    /// JetStream-only: stream replication factor.
    pub replicas: usize,
    /// Default deadline for `request` when the caller doesn't override it.
    pub default_request_timeout: Duration,
}

impl TransportConfig {
    pub fn direct(nats_url: impl Into<String>, prefix: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            nats_url: nats_url.into(),
            prefix: prefix.into(),
            service: service.into(),
            delivery_mode: DeliveryMode::Direct,
            stream_max_age: Duration::from_secs(24 * 60 * 60),
            ack_wait: Duration::from_secs(30),
            max_in_flight: 1000,
            replicas: 1,
            default_request_timeout: Duration::from_secs(5),
        }
    }

    pub fn durable(self) -> Self {
        Self { delivery_mode: DeliveryMode::Durable, ..self }
    }
}
