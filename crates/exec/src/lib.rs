// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! verge-exec: the concurrency substrate shared by the bus and deployment
//! manager — a bounded [`Mailbox`] for per-consumer queues and a
//! worker-pool [`Executor`] for running background work with panic
//! isolation.

pub mod error;
pub mod executor;
pub mod mailbox;
pub mod task;

pub use error::ExecError;
pub use executor::Executor;
pub use mailbox::Mailbox;
pub use task::{Task, TaskOutcome};
