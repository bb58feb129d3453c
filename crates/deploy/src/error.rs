//! Deployment manager error kinds (§7).

use thiserror::Error;
use verge_bus::BusError;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("deployment id must not be empty")]
    InvalidDeploymentId,
    #[error("deployment {0} was not found")]
    DeploymentNotFound(String),
    #[error("deployment {0} is still pending and cannot be undeployed")]
    DeploymentPending(String),
    #[error("deployment {0} is already stopping or stopped")]
    DeploymentAlreadyStopping(String),
    #[error("event loop was not started")]
    NotStarted,
    #[error("event loop queue is full")]
    EventLoopQueueFull,
    #[error("verticle start failed: {0}")]
    StartFailed(String),
    #[error(transparent)]
    Bus(#[from] BusError),
}
