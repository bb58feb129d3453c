// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! verge-transport: the optional NATS/JetStream adapter (§4.6, C5) — an
//! alternative [`verge_bus::EventBus`] implementation over an external
//! pub-sub substrate, so clustered deployments can swap the in-process
//! [`verge_bus::Bus`] for [`TransportBus`] without touching caller code.

pub mod config;
pub mod error;
pub mod subjects;
pub mod transport_bus;
pub mod wire;

pub use config::{DeliveryMode, TransportConfig};
pub use error::TransportError;
pub use transport_bus::TransportBus;
