//! Transport-adapter error kinds (§7: operational errors from the NATS
//! substrate fold into [`verge_bus::BusError::Transport`] at the
//! `EventBus` boundary; this richer enum is for callers using
//! [`crate::TransportBus`] directly).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to nats at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: async_nats::ConnectError,
    },
    #[error("publish failed: {0}")]
    Publish(#[from] async_nats::PublishError),
    #[error("request failed: {0}")]
    Request(#[from] async_nats::RequestError),
    #[error("subscribe failed: {0}")]
    Subscribe(#[from] async_nats::SubscribeError),
    #[error("jetstream stream creation failed: {0}")]
    CreateStream(String),
    #[error("jetstream consumer creation failed: {0}")]
    CreateConsumer(String),
    #[error("no reply received before the deadline")]
    Timeout,
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] verge_core::CoreError),
    #[error("failed to encode/decode a wire frame: {0}")]
    Wire(#[from] serde_json::Error),
}

impl From<TransportError> for verge_bus::BusError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => verge_bus::BusError::Timeout,
            TransportError::InvalidAddress(e) => verge_bus::BusError::Invalid(e),
            other => verge_bus::BusError::Transport(other.to_string()),
        }
    }
}
