// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! verge-bus: the typed event bus kernel (§4.2, C3) — publish/fanout,
//! point-to-point send, and request/reply over per-consumer bounded
//! mailboxes, backed by [`verge_exec`]'s mailbox and executor.

mod ambient;
pub mod bus;
pub mod consumer;
pub mod context;
pub mod error;
pub mod interface;

pub use bus::{Bus, BusConfig, DEFAULT_MAILBOX_CAPACITY};
pub use consumer::{Consumer, HandlerFn, HandlerFuture, IntoHandlerFn};
pub use context::{BusHost, HandlerContext};
pub use error::BusError;
pub use interface::EventBus;
