// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! verge-logstore: a segmented, CRC32C-framed append-only log store with a
//! background flusher and crash recovery on open.

pub mod error;
pub mod frame;
pub mod observer;
pub mod segment;
pub mod store;

pub use error::LogError;
pub use observer::LogObserver;
pub use store::{Durability, LogStatsSnapshot, LogStore, LogStoreConfig, Record};
