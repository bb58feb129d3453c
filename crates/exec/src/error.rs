use thiserror::Error;

/// Operational errors from the mailbox/executor concurrency substrate (§7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("mailbox full")]
    Full,
    #[error("queue full")]
    QueueFull,
    #[error("closed")]
    Closed,
    #[error("cancelled")]
    Cancelled,
    #[error("timed out")]
    Timeout,
}
