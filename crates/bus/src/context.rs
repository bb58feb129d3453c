//! Per-message handler context and the type-erased back-reference to the
//! deployment manager (§9 design note: "Back-references between Bus and
//! Deployment Manager").
//!
//! `verge-bus` sits below `verge-deploy` in the dependency order (§2), so
//! it cannot name the deployment manager's concrete type. [`BusHost`] is
//! the minimal trait the manager implements so a handler can recover its
//! concrete type via `as_any().downcast_ref` at the one place (the
//! `verge-deploy`/`verge-runtime` crates) where both types are in scope.
//! The bus itself never calls through this trait — it only stores and
//! hands it back out, used only to mint per-message contexts.

use std::any::Any;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Implemented by the deployment manager so handler code can recover it.
pub trait BusHost: Send + Sync {
    fn as_any(&self) -> &(dyn Any + Send + Sync);
}

/// Context handed to every consumer handler invocation.
#[derive(Clone)]
pub struct HandlerContext {
    /// The bus's cancellation scope; handlers performing sub-waits should
    /// race against this.
    pub cancel: CancellationToken,
    /// Propagated from the inbound message's `request_id` header, if any.
    pub request_id: Option<String>,
    /// Back-reference to the deployment manager, for handlers that need
    /// to mint nested deployments. `None` when the bus was constructed
    /// standalone (e.g. in unit tests).
    pub manager: Option<Arc<dyn BusHost>>,
}

impl HandlerContext {
    pub fn new(cancel: CancellationToken, request_id: Option<String>) -> Self {
        Self { cancel, request_id, manager: None }
    }

    pub fn with_manager(mut self, manager: Arc<dyn BusHost>) -> Self {
        self.manager = Some(manager);
        self
    }
}
