//! The runtime facade: the one entry point embedding binaries wire up
//! instead of constructing the bus, deployment manager, VM, and log
//! store by hand.

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use std::sync::Arc;
use std::time::Duration;
use verge_bus::{Bus, BusConfig};
use verge_core::{Body, Message};
use verge_deploy::{DeployError, DeploymentId, DeploymentManager, DeploymentState, Verticle};
use verge_logstore::{LogObserver, LogStore, LogStoreConfig};
use verge_vm::{Vm, VmConfig};

/// Wires a [`DeploymentManager`] (which owns the bus), an embedded
/// [`Vm`] attached to that same bus, and an optional [`LogStore`] used
/// by event-sourced verticles.
pub struct Runtime {
    manager: Arc<DeploymentManager>,
    vm: Vm,
    log: Option<LogStore>,
}

fn vm_config_from(config: &RuntimeConfig) -> VmConfig {
    VmConfig {
        call_stack_limit: config.vm.call_stack_limit,
        request_timeout: Duration::from_millis(config.request.max_timeout_ms),
    }
}

impl Runtime {
    /// Boots the bus, deployment manager, and VM without a log store.
    pub fn bootstrap(config: &RuntimeConfig) -> Arc<Self> {
        let bus_config = BusConfig {
            executor_workers: config.bus.executor_workers,
            executor_queue: config.bus.executor_queue,
            default_mailbox_capacity: config.bus.default_mailbox_capacity,
        };
        let manager = DeploymentManager::new(bus_config);
        let vm = Vm::with_bus(vm_config_from(config), Arc::clone(manager.bus()));
        Arc::new(Self { manager, vm, log: None })
    }

    /// Boots the bus, deployment manager, and VM, then opens (recovering
    /// if necessary) the log store rooted at `config.log.dir`.
    pub async fn bootstrap_with_log(
        config: &RuntimeConfig,
        observer: Option<Arc<dyn LogObserver>>,
    ) -> Result<Arc<Self>, RuntimeError> {
        let log_config = LogStoreConfig {
            dir: config.log.dir.clone(),
            durability: config.log.durability.into(),
            max_segment_bytes: config.log.max_segment_bytes,
            max_buffered_bytes: config.log.max_buffered_bytes,
            queue_capacity: config.log.queue_capacity,
        };
        let log = LogStore::open(log_config, observer).await?;

        let bus_config = BusConfig {
            executor_workers: config.bus.executor_workers,
            executor_queue: config.bus.executor_queue,
            default_mailbox_capacity: config.bus.default_mailbox_capacity,
        };
        let manager = DeploymentManager::new(bus_config);
        let vm = Vm::with_bus(vm_config_from(config), Arc::clone(manager.bus()));
        Ok(Arc::new(Self { manager, vm, log: Some(log) }))
    }

    pub fn bus(&self) -> &Arc<Bus> {
        self.manager.bus()
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn log(&self) -> Option<&LogStore> {
        self.log.as_ref()
    }

    pub fn deploy(self: &Arc<Self>, verticle: Arc<dyn Verticle>, config: serde_json::Value) -> DeploymentId {
        self.manager.deploy(verticle, config)
    }

    pub async fn deploy_and_wait(
        self: &Arc<Self>,
        verticle: Arc<dyn Verticle>,
        config: serde_json::Value,
    ) -> Result<DeploymentId, DeployError> {
        self.manager.deploy_and_wait(verticle, config).await
    }

    pub async fn undeploy(&self, id: DeploymentId) -> Result<(), DeployError> {
        self.manager.undeploy(id).await
    }

    pub fn state_of(&self, id: DeploymentId) -> Option<DeploymentState> {
        self.manager.state_of(id)
    }

    pub fn publish(&self, address: &str, body: Body) -> Result<(), RuntimeError> {
        Ok(self.bus().publish(address, body)?)
    }

    pub fn send(&self, address: &str, body: Body) -> Result<(), RuntimeError> {
        Ok(self.bus().send(address, body)?)
    }

    pub async fn request(&self, address: &str, body: Body, timeout: Duration) -> Result<Message, RuntimeError> {
        Ok(self.bus().request(address, body, timeout).await?)
    }

    /// Tears the whole runtime down: closes every deployment, then the
    /// bus, then (if attached) the log store.
    pub async fn close(&self) {
        self.manager.close().await;
        if let Some(log) = &self.log {
            let _ = log.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    #[tokio::test]
    async fn bootstrap_wires_bus_manager_and_vm() {
        let config = RuntimeConfig::default();
        let runtime = Runtime::bootstrap(&config);
        assert_eq!(runtime.manager.deployment_count(), 0);
        runtime.close().await;
    }

    #[tokio::test]
    async fn bootstrap_with_log_opens_against_a_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RuntimeConfig::default();
        config.log.dir = dir.path().to_path_buf();
        let runtime = Runtime::bootstrap_with_log(&config, None).await.unwrap();
        assert!(runtime.log().is_some());
        runtime.close().await;
    }

    #[tokio::test]
    async fn publish_with_no_consumers_is_not_an_error() {
        let config = RuntimeConfig::default();
        let runtime = Runtime::bootstrap(&config);
        assert!(runtime.publish("nobody.home", Body::from_bytes(b"x".to_vec())).is_ok());
        runtime.close().await;
    }
}
