// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! verge-core: shared data model for the verge runtime.
//!
//! Hosts the kernel-wide primitives every other component depends on:
//! validated [`Address`]es, the [`Message`]/[`Body`] wire model, the
//! [`Clock`] abstraction used for testable time, and the [`define_id!`]
//! macro used to mint typed identifiers.

pub mod address;
pub mod clock;
pub mod error;
pub mod id;
pub mod message;
pub mod timeout;

pub use address::{Address, ADDRESS_MAX_LEN};
pub use clock::{Clock, FakeClock, SystemClock};
pub use error::CoreError;
pub use id::IdBuf;
pub use message::{Body, Message, REQUEST_ID_HEADER};
pub use timeout::{validate_timeout, MAX_TIMEOUT};
