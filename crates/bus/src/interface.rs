//! The object-safe facade every Event Bus backend implements (§4.6).
//!
//! [`crate::Bus`] is the in-process C3 kernel; `verge-transport`'s
//! `TransportBus` is the C5 adapter over an external substrate. Both
//! implement [`EventBus`] so code that only needs `publish`/`send`/`request`/
//! `close` is agnostic to which one backs a given handle. `consumer`
//! registration is deliberately left out of this trait — each backend's
//! subscription handle shape differs enough (local mailbox vs. queue-group
//! subscription) that unifying it would force a lowest-common-denominator
//! API; callers that need to register consumers do so through the
//! concrete backend type.

use crate::error::BusError;
use async_trait::async_trait;
use std::time::Duration;
use verge_core::{Body, Message};

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Fanout to every consumer registered on `address` (§4.2).
    fn publish(&self, address: &str, body: Body) -> Result<(), BusError>;

    /// Point-to-point delivery to one consumer (§4.2).
    fn send(&self, address: &str, body: Body) -> Result<(), BusError>;

    /// Send-with-reply-address, awaiting the reply up to `timeout` (§4.2).
    async fn request(&self, address: &str, body: Body, timeout: Duration) -> Result<Message, BusError>;

    /// Tears the backend down. Idempotent.
    async fn close(&self);
}
