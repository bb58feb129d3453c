// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! verge-deploy: the verticle lifecycle & deployment manager (§4.3, C4).
//! Owns the bus, hands each deployed verticle a [`DeployContext`] with a
//! dedicated single-worker event loop, and drives the
//! `Pending -> Started -> Stopping -> Stopped` state machine.

pub mod context;
pub mod error;
pub mod manager;
pub mod verticle;

pub use context::DeployContext;
pub use error::DeployError;
pub use manager::{DeploymentManager, DeploymentState};
pub use verticle::{DeploymentId, Verticle};
