//! Aggregated runtime-facade error type.

use crate::config::ConfigError;
use thiserror::Error;
use verge_bus::BusError;
use verge_deploy::DeployError;
use verge_logstore::LogError;
use verge_vm::VmError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Deploy(#[from] DeployError),
    #[error(transparent)]
    Log(#[from] LogError),
    #[error(transparent)]
    Vm(#[from] VmError),
}
