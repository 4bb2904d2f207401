//! Action and resource capabilities consumed by the pursuit loop.
//!
//! Both action calls are fire-and-forget-safe: the orchestrator logs and
//! swallows their failures, so implementations may also swallow their own.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{GeoPoint, TargetId};
use crate::error::Result;

/// The catch/interaction collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionRunner: Send + Sync {
    /// Primary action; `target` is set for the directed attempts at and
    /// after arrival, unset for opportunistic en-route attempts.
    async fn perform_primary(&self, target: Option<TargetId>) -> Result<()>;

    /// Secondary action fired through the travel callback.
    async fn perform_secondary(&self, position: GeoPoint) -> Result<()>;
}

/// Resource gate consulted before entering the pursuit loop.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceGauge: Send + Sync {
    async fn count(&self, kind: &str) -> u32;
}

/// Action runner that only logs. Used by the demo binary.
pub struct NoopActions;

#[async_trait]
impl ActionRunner for NoopActions {
    async fn perform_primary(&self, target: Option<TargetId>) -> Result<()> {
        match target {
            Some(id) => debug!(target = %id, "primary action"),
            None => debug!("primary action (en route)"),
        }
        Ok(())
    }

    async fn perform_secondary(&self, position: GeoPoint) -> Result<()> {
        debug!(%position, "secondary action");
        Ok(())
    }
}

/// Gauge reporting a fixed count for every resource kind.
pub struct FixedResources {
    count: u32,
}

impl FixedResources {
    pub fn new(count: u32) -> Self {
        Self { count }
    }
}

#[async_trait]
impl ResourceGauge for FixedResources {
    async fn count(&self, _kind: &str) -> u32 {
        self.count
    }
}
