//! In-process gateway with simulated Forklift controllers
//!
//! Objects live in a map keyed by (kind, namespace, name). Every `get`
//! counts as one observation; the simulated controller for the object's
//! kind decides when (and whether) a status appears. Errors can be scripted
//! per kind to exercise retry and failure paths.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use forklift_common::crd::{
    Condition, ConditionStatus, ResourceKind, ResourceStatus, CATEGORY_CRITICAL,
};
use forklift_common::kube_utils::object_ref;
use forklift_common::{Error, ErrorClass, Result};

use super::{poll_until, ClusterGateway, Predicate, DEFAULT_POLL_INTERVAL};
use crate::builder::WorkflowObject;

/// How the simulated controller treats objects of one kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControllerBehavior {
    /// Report the kind's success condition once `after` observations have
    /// seen the object pending
    Converge {
        /// Pending observations before convergence
        after: u32,
    },
    /// Report a critical failure once `after` observations have seen the
    /// object pending
    Fail {
        /// Pending observations before the failure
        after: u32,
        /// Failure message written to the condition
        message: String,
    },
    /// Never write a status
    Stall,
}

impl Default for ControllerBehavior {
    fn default() -> Self {
        Self::Converge { after: 0 }
    }
}

type Key = (ResourceKind, String, String);

struct Stored {
    object: WorkflowObject,
    observations: u32,
}

#[derive(Default)]
struct Store {
    objects: HashMap<Key, Stored>,
    secrets: HashMap<(String, String), Secret>,
    behaviors: HashMap<ResourceKind, ControllerBehavior>,
    create_errors: HashMap<ResourceKind, VecDeque<(ErrorClass, String)>>,
    get_errors: HashMap<ResourceKind, VecDeque<(ErrorClass, String)>>,
    creates: HashMap<ResourceKind, u32>,
}

/// In-memory backend, safe to share across concurrent workflows
pub struct MemoryGateway {
    store: Mutex<Store>,
    poll_interval: Duration,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    /// Empty backend where every kind converges on first observation
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the status poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the simulated controller behavior for `kind`
    pub fn with_behavior(self, kind: ResourceKind, behavior: ControllerBehavior) -> Self {
        self.set_behavior(kind, behavior);
        self
    }

    /// Change the simulated controller behavior for `kind`
    pub fn set_behavior(&self, kind: ResourceKind, behavior: ControllerBehavior) {
        self.store.lock().behaviors.insert(kind, behavior);
    }

    /// Make the next `create` of `kind` fail with an error of `class`
    pub fn fail_next_create(&self, kind: ResourceKind, class: ErrorClass, message: &str) {
        self.store
            .lock()
            .create_errors
            .entry(kind)
            .or_default()
            .push_back((class, message.to_string()));
    }

    /// Make the next `get` of `kind` fail with an error of `class`
    pub fn fail_next_get(&self, kind: ResourceKind, class: ErrorClass, message: &str) {
        self.store
            .lock()
            .get_errors
            .entry(kind)
            .or_default()
            .push_back((class, message.to_string()));
    }

    /// Store an object as if someone else had created it; status is kept
    pub fn insert(&self, obj: WorkflowObject) {
        let key = (obj.kind(), obj.namespace().to_string(), obj.name().to_string());
        self.store.lock().objects.insert(
            key,
            Stored {
                object: obj,
                observations: 0,
            },
        );
    }

    /// Current copy of an object, without counting as an observation
    pub fn object(&self, kind: ResourceKind, name: &str, namespace: &str) -> Option<WorkflowObject> {
        let key = (kind, namespace.to_string(), name.to_string());
        self.store.lock().objects.get(&key).map(|s| s.object.clone())
    }

    /// Stored secret
    pub fn secret(&self, name: &str, namespace: &str) -> Option<Secret> {
        let key = (namespace.to_string(), name.to_string());
        self.store.lock().secrets.get(&key).cloned()
    }

    /// Successful creates of `kind` so far
    pub fn create_count(&self, kind: ResourceKind) -> u32 {
        self.store.lock().creates.get(&kind).copied().unwrap_or(0)
    }

    /// Successful creates across all kinds
    pub fn total_creates(&self) -> u32 {
        self.store.lock().creates.values().sum()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.store.lock().objects.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn scripted_error(class: ErrorClass, object: String, message: String) -> Error {
    match class {
        ErrorClass::Validation => Error::Validation {
            object,
            message,
            field: None,
        },
        ErrorClass::Conflict => Error::conflict(object, message),
        ErrorClass::NotFound => Error::not_found(object),
        ErrorClass::Transient => Error::transient(object, message),
        ErrorClass::Timeout => Error::timeout(object, Duration::ZERO, None),
        ErrorClass::Fatal => Error::fatal(object, message),
        ErrorClass::Cancelled => Error::cancelled(object),
        ErrorClass::Internal => Error::internal_with_context(object, message),
    }
}

fn success_status(kind: ResourceKind) -> ResourceStatus {
    let mut status = ResourceStatus::default();
    match kind {
        ResourceKind::Provider => {
            status.phase = Some("Ready".to_string());
            status.set_condition(Condition::new("Ready", ConditionStatus::True));
        }
        ResourceKind::NetworkMap | ResourceKind::StorageMap | ResourceKind::Plan => {
            status.set_condition(Condition::new("Ready", ConditionStatus::True));
        }
        ResourceKind::Migration => {
            status.set_condition(Condition::new("Succeeded", ConditionStatus::True));
        }
    }
    status
}

fn failure_status(message: &str) -> ResourceStatus {
    let mut status = ResourceStatus::default();
    status.set_condition(
        Condition::new("SimulatedFailure", ConditionStatus::True)
            .with_category(CATEGORY_CRITICAL)
            .with_message(message),
    );
    status
}

/// Advance the simulated controller by one observation
fn observe(stored: &mut Stored, behavior: &ControllerBehavior) {
    if stored.object.status().is_some() {
        return;
    }
    stored.observations += 1;
    let status = match behavior {
        ControllerBehavior::Converge { after } if stored.observations > *after => {
            success_status(stored.object.kind())
        }
        ControllerBehavior::Fail { after, message } if stored.observations > *after => {
            failure_status(message)
        }
        _ => return,
    };
    stored.object.set_status(Some(status));
}

#[async_trait]
impl ClusterGateway for MemoryGateway {
    async fn create(&self, obj: &WorkflowObject) -> Result<WorkflowObject> {
        let kind = obj.kind();
        let mut store = self.store.lock();

        if let Some((class, message)) = store.create_errors.get_mut(&kind).and_then(VecDeque::pop_front) {
            return Err(scripted_error(class, obj.object_ref(), message));
        }

        let key = (kind, obj.namespace().to_string(), obj.name().to_string());
        if store.objects.contains_key(&key) {
            return Err(Error::conflict(obj.object_ref(), "object already exists"));
        }

        let mut created = obj.clone();
        created.set_status(None);
        store.objects.insert(
            key,
            Stored {
                object: created.clone(),
                observations: 0,
            },
        );
        *store.creates.entry(kind).or_default() += 1;
        debug!(kind = %kind, name = %obj.name(), namespace = %obj.namespace(), "Stored object");
        Ok(created)
    }

    async fn get(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: &str,
    ) -> Result<WorkflowObject> {
        let object = object_ref(kind.as_str(), namespace, name);
        let mut store = self.store.lock();

        if let Some((class, message)) = store.get_errors.get_mut(&kind).and_then(VecDeque::pop_front) {
            return Err(scripted_error(class, object, message));
        }

        let behavior = store.behaviors.get(&kind).cloned().unwrap_or_default();
        let key = (kind, namespace.to_string(), name.to_string());
        let stored = store
            .objects
            .get_mut(&key)
            .ok_or_else(|| Error::not_found(object))?;
        observe(stored, &behavior);
        Ok(stored.object.clone())
    }

    async fn wait_for_condition(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: &str,
        predicate: Predicate,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<WorkflowObject> {
        let object = object_ref(kind.as_str(), namespace, name);
        poll_until(
            &object,
            self.poll_interval,
            timeout,
            &cancel,
            &predicate,
            || self.get(kind, name, namespace),
        )
        .await
    }

    async fn ensure_secret(&self, secret: &Secret) -> Result<()> {
        let name = secret.metadata.name.clone().unwrap_or_default();
        let namespace = secret.metadata.namespace.clone().unwrap_or_default();
        self.store
            .lock()
            .secrets
            .entry((namespace, name))
            .or_insert_with(|| secret.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use forklift_common::crd::ObservedPhase;
    use tokio::time::Instant;

    use crate::builder::{build, build_credentials_secret, StageKind};
    use crate::request::tests::sample_request;

    fn never() -> Predicate {
        Arc::new(|_: &WorkflowObject| false)
    }

    fn ready() -> Predicate {
        Arc::new(|o: &WorkflowObject| o.observed_phase() == ObservedPhase::Ready)
    }

    #[tokio::test]
    async fn test_create_then_conflict() {
        let gw = MemoryGateway::new();
        let obj = build(StageKind::SourceProvider, &sample_request()).expect("build");

        let created = gw.create(&obj).await.expect("create");
        assert_eq!(created.name(), "vmware-demo");
        assert_eq!(gw.create_count(ResourceKind::Provider), 1);

        let err = gw.create(&obj).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Conflict);
        assert_eq!(gw.create_count(ResourceKind::Provider), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let gw = MemoryGateway::new();
        let err = gw
            .get(ResourceKind::Plan, "missing", "openshift-mtv")
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[tokio::test]
    async fn test_converges_after_observations() {
        let gw = MemoryGateway::new()
            .with_behavior(ResourceKind::Provider, ControllerBehavior::Converge { after: 2 });
        let obj = build(StageKind::SourceProvider, &sample_request()).expect("build");
        gw.create(&obj).await.expect("create");

        for _ in 0..2 {
            let seen = gw
                .get(ResourceKind::Provider, "vmware-demo", "openshift-mtv")
                .await
                .expect("get");
            assert_eq!(seen.observed_phase(), ObservedPhase::Pending);
        }
        let seen = gw
            .get(ResourceKind::Provider, "vmware-demo", "openshift-mtv")
            .await
            .expect("get");
        assert_eq!(seen.observed_phase(), ObservedPhase::Ready);
    }

    #[tokio::test]
    async fn test_simulated_failure_carries_message() {
        let gw = MemoryGateway::new().with_behavior(
            ResourceKind::StorageMap,
            ControllerBehavior::Fail {
                after: 0,
                message: "storage class not found".into(),
            },
        );
        let obj = build(StageKind::StorageMap, &sample_request()).expect("build");
        gw.create(&obj).await.expect("create");
        let seen = gw
            .get(ResourceKind::StorageMap, obj.name(), obj.namespace())
            .await
            .expect("get");
        assert_eq!(seen.observed_phase(), ObservedPhase::Failed);
        assert_eq!(
            seen.failure_reason().as_deref(),
            Some("storage class not found")
        );
    }

    #[tokio::test]
    async fn test_scripted_errors_are_consumed_in_order() {
        let gw = MemoryGateway::new();
        gw.fail_next_create(ResourceKind::Plan, ErrorClass::Transient, "etcd leader changed");
        let obj = build(StageKind::Plan, &sample_request()).expect("build");

        let err = gw.create(&obj).await.unwrap_err();
        assert!(err.is_retryable());
        gw.create(&obj).await.expect("second create succeeds");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_exactly_at_budget() {
        let gw = MemoryGateway::new()
            .with_behavior(ResourceKind::Provider, ControllerBehavior::Stall);
        let obj = build(StageKind::SourceProvider, &sample_request()).expect("build");
        gw.create(&obj).await.expect("create");

        let budget = Duration::from_millis(4500);
        let start = Instant::now();
        let err = gw
            .wait_for_condition(
                ResourceKind::Provider,
                obj.name(),
                obj.namespace(),
                never(),
                budget,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(start.elapsed(), budget);
        assert_eq!(err.class(), ErrorClass::Timeout);
        assert_eq!(err.last_phase(), Some(ObservedPhase::Pending));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_when_predicate_holds() {
        let gw = MemoryGateway::new()
            .with_behavior(ResourceKind::Provider, ControllerBehavior::Converge { after: 3 });
        let obj = build(StageKind::SourceProvider, &sample_request()).expect("build");
        gw.create(&obj).await.expect("create");

        let start = Instant::now();
        let seen = gw
            .wait_for_condition(
                ResourceKind::Provider,
                obj.name(),
                obj.namespace(),
                ready(),
                Duration::from_secs(60),
                CancellationToken::new(),
            )
            .await
            .expect("converges");
        assert_eq!(seen.observed_phase(), ObservedPhase::Ready);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_with_unbounded_budget() {
        let gw = MemoryGateway::new()
            .with_behavior(ResourceKind::Provider, ControllerBehavior::Converge { after: 1 });
        let obj = build(StageKind::SourceProvider, &sample_request()).expect("build");
        gw.create(&obj).await.expect("create");

        for budget in [Duration::from_secs(u64::MAX), Duration::MAX] {
            let seen = gw
                .wait_for_condition(
                    ResourceKind::Provider,
                    obj.name(),
                    obj.namespace(),
                    ready(),
                    budget,
                    CancellationToken::new(),
                )
                .await
                .expect("converges");
            assert_eq!(seen.observed_phase(), ObservedPhase::Ready);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_observes_cancellation() {
        let gw = Arc::new(
            MemoryGateway::new().with_behavior(ResourceKind::Provider, ControllerBehavior::Stall),
        );
        let obj = build(StageKind::SourceProvider, &sample_request()).expect("build");
        gw.create(&obj).await.expect("create");

        let cancel = CancellationToken::new();
        let waiter = {
            let gw = gw.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                gw.wait_for_condition(
                    ResourceKind::Provider,
                    "vmware-demo",
                    "openshift-mtv",
                    never(),
                    Duration::from_secs(600),
                    cancel,
                )
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let cancelled_at = Instant::now();
        cancel.cancel();
        let err = waiter.await.expect("join").unwrap_err();
        assert_eq!(err.class(), ErrorClass::Cancelled);
        assert!(cancelled_at.elapsed() <= Duration::from_millis(1200));
    }

    #[tokio::test]
    async fn test_existing_secret_is_left_untouched() {
        let gw = MemoryGateway::new();
        let req = sample_request();
        let secret = build_credentials_secret(&req).expect("secret");
        gw.ensure_secret(&secret).await.expect("first");

        let mut changed = req.clone();
        changed.source.credentials.password = "rotated".into();
        let rotated = build_credentials_secret(&changed).expect("secret");
        gw.ensure_secret(&rotated).await.expect("second");

        let stored = gw
            .secret("vmware-demo-secret", "openshift-mtv")
            .expect("stored");
        let data = stored.string_data.expect("data");
        assert_eq!(data["password"], "s3cret");
    }
}
