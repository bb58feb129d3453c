//! Per-deployment context (§4.3): what every verticle's `start`/`stop` and
//! nested handler code is handed.

use crate::error::DeployError;
use crate::manager::DeploymentManager;
use crate::verticle::DeploymentId;
use std::sync::Arc;
use tracing::{info_span, Span};
use verge_bus::Bus;
use verge_exec::{Executor, Task, TaskOutcome};

/// Everything a deployed verticle needs: the process-wide manager (for
/// nested deploys), the bus, its own config, a request-id-propagating
/// logging span, and its dedicated single-worker event loop.
pub struct DeployContext {
    pub id: DeploymentId,
    manager: Arc<DeploymentManager>,
    bus: Arc<Bus>,
    config: serde_json::Value,
    event_loop: Arc<Executor>,
}

impl DeployContext {
    pub(crate) fn new(
        id: DeploymentId,
        manager: Arc<DeploymentManager>,
        bus: Arc<Bus>,
        config: serde_json::Value,
        event_loop: Arc<Executor>,
    ) -> Arc<Self> {
        Arc::new(Self { id, manager, bus, config, event_loop })
    }

    pub fn manager(&self) -> &Arc<DeploymentManager> {
        &self.manager
    }

    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    pub fn config(&self) -> &serde_json::Value {
        &self.config
    }

    /// A tracing span carrying this deployment's id, with `request_id`
    /// attached when propagated from an inbound message.
    pub fn log_span(&self, request_id: Option<&str>) -> Span {
        info_span!("verticle", deployment_id = %self.id, request_id = request_id.unwrap_or(""))
    }

    /// Submits `task` onto this verticle's single-worker event loop,
    /// which runs all submitted tasks in strict FIFO submission order
    /// (§4.1, §5).
    pub fn run_on_event_loop<F>(&self, name: impl Into<String>, fut: F) -> Result<(), DeployError>
    where
        F: std::future::Future<Output = TaskOutcome> + Send + 'static,
    {
        self.event_loop
            .submit(Task::new(name, fut))
            .map_err(|err| match err {
                verge_exec::ExecError::Closed => DeployError::NotStarted,
                _ => DeployError::EventLoopQueueFull,
            })
    }
}
