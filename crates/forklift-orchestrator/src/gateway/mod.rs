//! Cluster gateway: the orchestrator's only view of the backend
//!
//! [`ClusterGateway`] is the capability interface `{create, get,
//! wait_for_condition, ensure_secret}`. [`KubeGateway`] talks to a real API
//! server; [`MemoryGateway`] is an in-process backend with simulated
//! controllers for tests and dry runs.

mod kube_client;
mod memory;

pub use kube_client::KubeGateway;
pub use memory::{ControllerBehavior, MemoryGateway};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[cfg(test)]
use mockall::automock;

use forklift_common::crd::ResourceKind;
use forklift_common::retry::{deadline_after, sleep_or_cancel};
use forklift_common::{Error, Result};

use crate::builder::WorkflowObject;

/// Default interval between status observations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Condition evaluated against every observation of an object
pub type Predicate = Arc<dyn Fn(&WorkflowObject) -> bool + Send + Sync>;

/// Backend operations the orchestrator needs.
///
/// Implementations must be safe to share across concurrent workflows.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Create `obj`; `Conflict` if the name is taken
    async fn create(&self, obj: &WorkflowObject) -> Result<WorkflowObject>;

    /// Fetch an object; `NotFound` if absent
    async fn get(&self, kind: ResourceKind, name: &str, namespace: &str)
        -> Result<WorkflowObject>;

    /// Observe an object until `predicate` holds.
    ///
    /// Returns `Timeout` carrying the last observed phase when `timeout`
    /// elapses first, and `Cancelled` as soon as `cancel` fires.
    async fn wait_for_condition(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: &str,
        predicate: Predicate,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<WorkflowObject>;

    /// Create the credential secret; an existing secret is left untouched
    async fn ensure_secret(&self, secret: &Secret) -> Result<()>;
}

/// Poll `observe` until `predicate` holds, `timeout` elapses or `cancel` fires.
///
/// The last sleep is clamped to the remaining budget and a final
/// observation is made at the deadline, so a never-true predicate returns
/// `Timeout` exactly at the boundary. Errors from `observe` are returned
/// unchanged for the caller to classify.
pub async fn poll_until<F, Fut>(
    object: &str,
    poll_interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
    predicate: &Predicate,
    mut observe: F,
) -> Result<WorkflowObject>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<WorkflowObject>>,
{
    let deadline = deadline_after(timeout);
    loop {
        if cancel.is_cancelled() {
            return Err(Error::cancelled(object));
        }

        let obj = observe().await?;
        let phase = obj.observed_phase();
        if predicate(&obj) {
            return Ok(obj);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(Error::timeout(object, timeout, Some(phase)));
        }
        trace!(object = %object, phase = %phase, "condition not met, polling again");
        let delay = poll_interval.min(deadline - now);
        if !sleep_or_cancel(delay, cancel).await {
            return Err(Error::cancelled(object));
        }
    }
}
