//! Error kinds shared by every component that validates addresses, bodies,
//! or timeouts at its public boundary.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid body: {0}")]
    InvalidBody(String),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}
