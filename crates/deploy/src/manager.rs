//! The verticle lifecycle & deployment manager (§4.3, C4).

use crate::context::DeployContext;
use crate::error::DeployError;
use crate::verticle::{DeploymentId, Verticle};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use verge_bus::{Bus, BusConfig, BusHost};
use verge_exec::Executor;

/// Per-verticle event loop sizing (§4.1): single worker enforces strict
/// FIFO execution of everything submitted to it.
pub const EVENT_LOOP_WORKERS: usize = 1;
pub const EVENT_LOOP_QUEUE: usize = 1000;

/// Upper bound on the grace window `close()` waits for in-flight `deploy`
/// starts to settle before force-stopping survivors (§4.3).
const CLOSE_SETTLE_GRACE: Duration = Duration::from_millis(100);
const STOP_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    Pending,
    Started,
    Failed,
    Stopping,
    Stopped,
}

struct DeploymentRecord {
    state: DeploymentState,
    verticle: Arc<dyn Verticle>,
    context: Arc<DeployContext>,
    event_loop: Arc<Executor>,
}

/// Owns the bus and every live deployment; drives the `Pending -> Started
/// -> Stopping -> Stopped` state machine (§3).
pub struct DeploymentManager {
    bus: Arc<Bus>,
    cancel: CancellationToken,
    deployments: RwLock<IndexMap<DeploymentId, DeploymentRecord>>,
    closed: AtomicBool,
}

impl DeploymentManager {
    pub fn new(bus_config: BusConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<DeploymentManager>| {
            let bus = Bus::new(bus_config);
            let host_weak: Weak<dyn BusHost> = weak.clone();
            bus.attach_manager(host_weak);
            Self {
                bus,
                cancel: CancellationToken::new(),
                deployments: RwLock::new(IndexMap::new()),
                closed: AtomicBool::new(false),
            }
        })
    }

    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Mints an id, records a `Pending` deployment, and runs
    /// `verticle.start` on a new task. Returns the id immediately — start
    /// failures are logged and the record is dropped, never surfaced to
    /// this call site (§4.3, §7). Use [`Self::deploy_and_wait`] when the
    /// caller needs to observe start failures directly.
    pub fn deploy(self: &Arc<Self>, verticle: Arc<dyn Verticle>, config: serde_json::Value) -> DeploymentId {
        let (id, _started) = self.deploy_internal(verticle, config);
        id
    }

    /// Synchronous variant (§9 open-question resolution (a)): awaits the
    /// start result before returning, so the caller observes failures.
    pub async fn deploy_and_wait(
        self: &Arc<Self>,
        verticle: Arc<dyn Verticle>,
        config: serde_json::Value,
    ) -> Result<DeploymentId, DeployError> {
        let (id, started) = self.deploy_internal(verticle, config);
        match started.await {
            Ok(Ok(())) => Ok(id),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(DeployError::StartFailed("start task was dropped".into())),
        }
    }

    fn deploy_internal(
        self: &Arc<Self>,
        verticle: Arc<dyn Verticle>,
        config: serde_json::Value,
    ) -> (DeploymentId, oneshot::Receiver<Result<(), DeployError>>) {
        let id = DeploymentId::new();
        let event_loop = Executor::start(EVENT_LOOP_WORKERS, EVENT_LOOP_QUEUE);
        let context = DeployContext::new(
            id,
            Arc::clone(self),
            Arc::clone(&self.bus),
            config,
            Arc::clone(&event_loop),
        );

        self.deployments.write().insert(
            id,
            DeploymentRecord {
                state: DeploymentState::Pending,
                verticle: Arc::clone(&verticle),
                context: Arc::clone(&context),
                event_loop,
            },
        );

        let (tx, rx) = oneshot::channel();
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let result = verticle.start(context).await;
            match result {
                Ok(()) => {
                    if let Some(record) = manager.deployments.write().get_mut(&id) {
                        record.state = DeploymentState::Started;
                    }
                    let _ = tx.send(Ok(()));
                }
                Err(err) => {
                    manager.deployments.write().shift_remove(&id);
                    warn!(deployment_id = %id, error = %err, "verticle start failed");
                    let _ = tx.send(Err(DeployError::StartFailed(err.to_string())));
                }
            }
        });

        (id, rx)
    }

    /// Rejects an empty id, an unknown id, a `Pending` deployment, or one
    /// already `Stopping`/`Stopped`. Otherwise transitions to `Stopping`
    /// and runs `verticle.stop` on a new task, settling at `Stopped`.
    pub async fn undeploy(&self, id: DeploymentId) -> Result<(), DeployError> {
        if id.is_empty() {
            return Err(DeployError::InvalidDeploymentId);
        }

        {
            let mut guard = self.deployments.write();
            let record = guard
                .get_mut(&id)
                .ok_or_else(|| DeployError::DeploymentNotFound(id.to_string()))?;
            match record.state {
                DeploymentState::Pending => return Err(DeployError::DeploymentPending(id.to_string())),
                DeploymentState::Stopping | DeploymentState::Stopped => {
                    return Err(DeployError::DeploymentAlreadyStopping(id.to_string()))
                }
                DeploymentState::Started | DeploymentState::Failed => {
                    record.state = DeploymentState::Stopping;
                }
            }
        }

        self.stop_one(id).await;
        Ok(())
    }

    async fn stop_one(&self, id: DeploymentId) {
        let (verticle, context, event_loop) = {
            let guard = self.deployments.read();
            let Some(record) = guard.get(&id) else { return };
            (
                Arc::clone(&record.verticle),
                Arc::clone(&record.context),
                Arc::clone(&record.event_loop),
            )
        };

        if let Err(err) = verticle.stop(context).await {
            warn!(deployment_id = %id, error = %err, "verticle stop failed");
        }
        if let Err(err) = event_loop.shutdown(STOP_SHUTDOWN_GRACE).await {
            warn!(deployment_id = %id, error = %err, "event loop shutdown did not finish within its grace window");
        }

        if let Some(record) = self.deployments.write().get_mut(&id) {
            record.state = DeploymentState::Stopped;
        }
    }

    /// Cancels the root scope, waits a short grace window for in-flight
    /// starts to settle, force-stops every surviving deployment
    /// regardless of state, then closes the bus. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        tokio::time::sleep(CLOSE_SETTLE_GRACE).await;

        let survivors: Vec<DeploymentId> = {
            let guard = self.deployments.read();
            guard
                .iter()
                .filter(|(_, r)| !matches!(r.state, DeploymentState::Stopped))
                .map(|(id, _)| *id)
                .collect()
        };

        for id in survivors {
            {
                let mut guard = self.deployments.write();
                if let Some(record) = guard.get_mut(&id) {
                    record.state = DeploymentState::Stopping;
                }
            }
            self.stop_one(id).await;
        }

        self.bus.close().await;
        info!("deployment manager closed");
    }

    pub fn deployment_count(&self) -> usize {
        self.deployments.read().len()
    }

    pub fn state_of(&self, id: DeploymentId) -> Option<DeploymentState> {
        self.deployments.read().get(&id).map(|r| r.state)
    }
}

impl BusHost for DeploymentManager {
    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingVerticle {
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
        fail_start: bool,
    }

    #[async_trait]
    impl Verticle for CountingVerticle {
        async fn start(&self, _ctx: Arc<DeployContext>) -> Result<(), DeployError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(DeployError::StartFailed("boom".into()));
            }
            Ok(())
        }

        async fn stop(&self, _ctx: Arc<DeployContext>) -> Result<(), DeployError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn deploy_and_wait_observes_start_success() {
        let manager = DeploymentManager::new(BusConfig::default());
        let starts = Arc::new(AtomicUsize::new(0));
        let verticle = Arc::new(CountingVerticle {
            starts: Arc::clone(&starts),
            stops: Arc::new(AtomicUsize::new(0)),
            fail_start: false,
        });

        let id = manager
            .deploy_and_wait(verticle, serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state_of(id), Some(DeploymentState::Started));
        manager.close().await;
    }

    #[tokio::test]
    async fn deploy_and_wait_surfaces_start_failure() {
        let manager = DeploymentManager::new(BusConfig::default());
        let verticle = Arc::new(CountingVerticle {
            starts: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
            fail_start: true,
        });
        let result = manager.deploy_and_wait(verticle, serde_json::json!({})).await;
        assert!(matches!(result, Err(DeployError::StartFailed(_))));
        assert_eq!(manager.deployment_count(), 0);
        manager.close().await;
    }

    #[tokio::test]
    async fn undeploy_then_undeploy_again_is_already_stopping() {
        let manager = DeploymentManager::new(BusConfig::default());
        let verticle = Arc::new(CountingVerticle {
            starts: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
            fail_start: false,
        });
        let id = manager
            .deploy_and_wait(verticle, serde_json::json!({}))
            .await
            .unwrap();
        manager.undeploy(id).await.unwrap();
        assert_eq!(manager.state_of(id), Some(DeploymentState::Stopped));
        let result = manager.undeploy(id).await;
        assert!(matches!(result, Err(DeployError::DeploymentAlreadyStopping(_))));
        manager.close().await;
    }

    #[tokio::test]
    async fn undeploy_unknown_id_is_not_found() {
        let manager = DeploymentManager::new(BusConfig::default());
        let result = manager.undeploy(DeploymentId::new()).await;
        assert!(matches!(result, Err(DeployError::DeploymentNotFound(_))));
        manager.close().await;
    }

    #[tokio::test]
    async fn undeploy_rejects_pending_deployment() {
        let manager = DeploymentManager::new(BusConfig::default());
        let verticle = Arc::new(CountingVerticle {
            starts: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
            fail_start: false,
        });
        let id = manager.deploy(verticle, serde_json::json!({}));
        let result = manager.undeploy(id).await;
        assert!(matches!(result, Err(DeployError::DeploymentPending(_))));
        manager.close().await;
    }

    #[tokio::test]
    async fn close_force_stops_survivors() {
        let manager = DeploymentManager::new(BusConfig::default());
        let stops = Arc::new(AtomicUsize::new(0));
        let verticle = Arc::new(CountingVerticle {
            starts: Arc::new(AtomicUsize::new(0)),
            stops: Arc::clone(&stops),
            fail_start: false,
        });
        manager
            .deploy_and_wait(verticle, serde_json::json!({}))
            .await
            .unwrap();
        manager.close().await;
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let manager = DeploymentManager::new(BusConfig::default());
        manager.close().await;
        manager.close().await;
    }
}
