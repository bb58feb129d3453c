//! The deployable unit interface (§3 Glossary: "Verticle").

use crate::context::DeployContext;
use crate::error::DeployError;
use async_trait::async_trait;
use std::sync::Arc;

verge_core::define_id! {
    /// Identifies one deployment, minted fresh by [`crate::DeploymentManager::deploy`].
    pub struct DeploymentId("dep-");
}

/// A deployable unit with `start`/`stop` hooks and a dedicated
/// single-worker event loop, supplied via [`DeployContext`].
#[async_trait]
pub trait Verticle: Send + Sync + 'static {
    async fn start(&self, ctx: Arc<DeployContext>) -> Result<(), DeployError>;

    /// Called at most once. A verticle that was never started successfully
    /// never has `stop` called on it.
    async fn stop(&self, ctx: Arc<DeployContext>) -> Result<(), DeployError>;
}
