use thiserror::Error;

/// Operational errors from the append-only log store (§7).
#[derive(Debug, Error)]
pub enum LogError {
    #[error("data must not be empty")]
    InvalidData,
    #[error("log store is closed")]
    Closed,
    #[error("backpressure: {0}")]
    Backpressure(&'static str),
    #[error("corrupt frame {0}")]
    Corrupt(&'static str),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
