//! Operational and programmer-error kinds for the event bus (§7).

use thiserror::Error;
use verge_core::CoreError;
use verge_exec::ExecError;

#[derive(Debug, Error)]
pub enum BusError {
    #[error(transparent)]
    Invalid(#[from] CoreError),
    #[error("no consumers registered on this address")]
    NoHandlers,
    #[error("no reply received before the deadline")]
    Timeout,
    #[error("bus is closed")]
    Closed,
    #[error("request carries no reply address")]
    NoReplyAddress,
    /// Non-local backends (e.g. the transport adapter, §4.6) surface
    /// substrate-specific failures here rather than inventing a kind per
    /// wire protocol.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<ExecError> for BusError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Closed => BusError::Closed,
            ExecError::Cancelled => BusError::Closed,
            ExecError::Timeout => BusError::Timeout,
            // `Full`/`QueueFull` surface as `Timeout` at the bus's `send`
            // boundary (§4.2); `publish`'s fanout swallows them entirely
            // and never routes them through this conversion.
            ExecError::Full | ExecError::QueueFull => BusError::Timeout,
        }
    }
}
