//! Reconciliation driver
//!
//! Takes one workflow object through Pending → Observing → Ready|Failed:
//! issue the create (adopting an existing object when the policy allows),
//! then observe it until its controller reports a terminal phase. Transient
//! backend errors are absorbed with exponential backoff inside the stage
//! budget; everything else surfaces immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use k8s_openapi::api::core::v1::Secret;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use forklift_common::crd::{ObservedPhase, ResourceKind};
use forklift_common::kube_utils::{json_matches, object_ref};
use forklift_common::retry::{deadline_after, sleep_or_cancel, Backoff, RetryConfig};
use forklift_common::{Error, ErrorClass, Result};

use crate::builder::WorkflowObject;
use crate::gateway::{ClusterGateway, Predicate};

/// Default budget for every stage but the Migration
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default budget for the Migration stage (disk copies take hours)
pub const DEFAULT_MIGRATION_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Timeouts and backoff for the driver
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Overall budget per stage
    pub stage_timeout: Duration,
    /// Overall budget for the Migration stage
    pub migration_timeout: Duration,
    /// Backoff applied to transient errors
    pub retry: RetryConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            migration_timeout: DEFAULT_MIGRATION_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }
}

impl DriverConfig {
    /// Budget for objects of `kind`
    pub fn timeout_for(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Migration => self.migration_timeout,
            _ => self.stage_timeout,
        }
    }
}

/// What to do when the object's name is already taken
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdoptPolicy {
    /// Adopt only if the existing spec equals the rendered one, apart from
    /// fields the controllers default
    RequireMatchingSpec,
    /// Adopt whatever exists under the name
    AdoptExisting,
}

/// Overall time budget shared by the create and observe steps of a stage
#[derive(Clone, Copy, Debug)]
pub struct StageBudget {
    total: Duration,
    deadline: Instant,
}

impl StageBudget {
    /// Start a budget of `total` now
    pub fn start(total: Duration) -> Self {
        Self {
            total,
            deadline: deadline_after(total),
        }
    }

    /// The full budget
    pub fn total(&self) -> Duration {
        self.total
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

type ObjectKey = (ResourceKind, String, String);

/// Registration of an object in the in-flight registry; released on drop
pub struct InFlightGuard {
    registry: Arc<DashMap<ObjectKey, ()>>,
    key: ObjectKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.key);
    }
}

/// Result of driving one object
#[derive(Clone, Debug)]
pub struct Reconciled {
    /// Last observation of the object
    pub object: WorkflowObject,
    /// Whether this driver created it (false when adopted)
    pub created: bool,
}

/// Drives workflow objects to convergence against a [`ClusterGateway`]
pub struct ReconciliationDriver {
    gateway: Arc<dyn ClusterGateway>,
    config: DriverConfig,
    in_flight: Arc<DashMap<ObjectKey, ()>>,
}

impl ReconciliationDriver {
    /// Create a driver over `gateway`
    pub fn new(gateway: Arc<dyn ClusterGateway>, config: DriverConfig) -> Self {
        Self {
            gateway,
            config,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Driver configuration
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Start the budget for an object of `kind`
    pub fn budget_for(&self, kind: ResourceKind) -> StageBudget {
        StageBudget::start(self.config.timeout_for(kind))
    }

    /// Number of objects currently being reconciled
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Register `obj` as being reconciled.
    ///
    /// Fails with `Conflict` if another invocation holds it; the backend is
    /// not touched either way.
    pub fn claim(&self, obj: &WorkflowObject) -> Result<InFlightGuard> {
        let key = (obj.kind(), obj.namespace().to_string(), obj.name().to_string());
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(_) => Err(Error::conflict(
                obj.object_ref(),
                "already being reconciled by another workflow",
            )),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlightGuard {
                    registry: self.in_flight.clone(),
                    key,
                })
            }
        }
    }

    /// Claim, create and observe `obj` until it converges.
    #[instrument(
        skip(self, obj, cancel),
        fields(kind = %obj.kind(), name = %obj.name(), namespace = %obj.namespace())
    )]
    pub async fn reconcile(
        &self,
        obj: &WorkflowObject,
        policy: AdoptPolicy,
        cancel: &CancellationToken,
    ) -> Result<Reconciled> {
        let _guard = self.claim(obj)?;
        let budget = self.budget_for(obj.kind());
        let Reconciled { object, created } =
            self.ensure_created(obj, policy, &budget, cancel).await?;
        let object = self.observe(&object, &budget, cancel).await?;
        Ok(Reconciled { object, created })
    }

    /// Issue the create, applying `policy` when the name is taken.
    pub async fn ensure_created(
        &self,
        obj: &WorkflowObject,
        policy: AdoptPolicy,
        budget: &StageBudget,
        cancel: &CancellationToken,
    ) -> Result<Reconciled> {
        let object = obj.object_ref();
        let mut backoff = Backoff::new(&self.config.retry);
        loop {
            if cancel.is_cancelled() {
                return Err(Error::cancelled(&object));
            }
            let err = match cancellable(&object, cancel, self.gateway.create(obj)).await {
                Ok(created) => {
                    info!(object = %object, "Created object");
                    return Ok(Reconciled {
                        object: created,
                        created: true,
                    });
                }
                Err(e) if e.class() == ErrorClass::Conflict => match self.adopt(obj, policy, cancel).await {
                    Ok(existing) => {
                        return Ok(Reconciled {
                            object: existing,
                            created: false,
                        })
                    }
                    // deleted between the create and the get
                    Err(e) if e.class() == ErrorClass::NotFound => e,
                    Err(e) if e.is_retryable() => e,
                    Err(e) => return Err(e),
                },
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };
            self.back_off(&mut backoff, budget, cancel, &object, err)
                .await?;
        }
    }

    async fn adopt(
        &self,
        desired: &WorkflowObject,
        policy: AdoptPolicy,
        cancel: &CancellationToken,
    ) -> Result<WorkflowObject> {
        let object = desired.object_ref();
        let existing = cancellable(
            &object,
            cancel,
            self.gateway
                .get(desired.kind(), desired.name(), desired.namespace()),
        )
        .await?;
        match policy {
            AdoptPolicy::AdoptExisting => {
                info!(object = %object, "Adopting existing object");
                Ok(existing)
            }
            AdoptPolicy::RequireMatchingSpec => {
                let defaulted = desired.kind().server_defaulted_fields();
                if json_matches(&existing.spec_json()?, &desired.spec_json()?, defaulted) {
                    info!(object = %object, "Existing object matches, adopting");
                    Ok(existing)
                } else {
                    Err(Error::conflict(
                        object,
                        "an object with this name exists with a different spec",
                    ))
                }
            }
        }
    }

    /// Observe `obj` until its phase is terminal for its kind.
    ///
    /// A Failed phase becomes `StageFailed` with the controller's reason.
    pub async fn observe(
        &self,
        obj: &WorkflowObject,
        budget: &StageBudget,
        cancel: &CancellationToken,
    ) -> Result<WorkflowObject> {
        let kind = obj.kind();
        let object = obj.object_ref();
        let predicate: Predicate =
            Arc::new(move |o: &WorkflowObject| kind.is_terminal(o.observed_phase()));
        let mut backoff = Backoff::new(&self.config.retry);

        loop {
            let result = self
                .gateway
                .wait_for_condition(
                    kind,
                    obj.name(),
                    obj.namespace(),
                    predicate.clone(),
                    budget.remaining(),
                    cancel.clone(),
                )
                .await;
            match result {
                Ok(seen) if seen.observed_phase() == ObservedPhase::Failed => {
                    let reason = seen
                        .failure_reason()
                        .unwrap_or_else(|| "controller reported a failure".to_string());
                    warn!(object = %object, reason = %reason, "Object failed");
                    return Err(Error::stage_failed(&object, reason));
                }
                Ok(seen) => {
                    debug!(object = %object, phase = %seen.observed_phase(), "Object converged");
                    return Ok(seen);
                }
                Err(Error::Timeout { last_phase, .. }) => {
                    warn!(object = %object, budget_secs = budget.total().as_secs(), "Timed out waiting for object");
                    return Err(Error::timeout(&object, budget.total(), last_phase));
                }
                Err(e) if e.is_retryable() => {
                    self.back_off(&mut backoff, budget, cancel, &object, e)
                        .await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Create the credential secret, retrying transient errors
    pub async fn ensure_secret(&self, secret: &Secret, cancel: &CancellationToken) -> Result<()> {
        let object = object_ref(
            "Secret",
            secret.metadata.namespace.as_deref().unwrap_or_default(),
            secret.metadata.name.as_deref().unwrap_or_default(),
        );
        let budget = StageBudget::start(self.config.stage_timeout);
        let mut backoff = Backoff::new(&self.config.retry);
        loop {
            if cancel.is_cancelled() {
                return Err(Error::cancelled(&object));
            }
            match cancellable(&object, cancel, self.gateway.ensure_secret(secret)).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    self.back_off(&mut backoff, &budget, cancel, &object, e)
                        .await?
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sleep before retrying a transient error, within the stage budget.
    ///
    /// Returns the error itself once attempts are exhausted, `Timeout` once
    /// the budget is spent and `Cancelled` if the token fires while asleep.
    async fn back_off(
        &self,
        backoff: &mut Backoff,
        budget: &StageBudget,
        cancel: &CancellationToken,
        object: &str,
        err: Error,
    ) -> Result<()> {
        let remaining = budget.remaining();
        if remaining.is_zero() {
            warn!(object = %object, error = %err, "Budget exhausted while retrying");
            return Err(Error::timeout(object, budget.total(), None));
        }
        let delay = backoff.next_delay().min(remaining);
        if backoff.exhausted() {
            warn!(object = %object, attempt = backoff.attempt(), error = %err, "Giving up after max retries");
            return Err(err);
        }
        warn!(
            object = %object,
            attempt = backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient error, backing off"
        );
        if !sleep_or_cancel(delay, cancel).await {
            return Err(Error::cancelled(object));
        }
        Ok(())
    }
}

/// Await a backend call unless `cancel` fires first
async fn cancellable<T>(
    object: &str,
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(object)),
        result = call => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use forklift_common::crd::{Condition, ConditionStatus, ResourceStatus, CATEGORY_CRITICAL};

    use crate::builder::{build, StageKind};
    use crate::builder::build_credentials_secret;
    use crate::gateway::MockClusterGateway;
    use crate::request::tests::sample_request;

    fn source_provider() -> WorkflowObject {
        build(StageKind::SourceProvider, &sample_request()).expect("build")
    }

    fn with_condition(obj: &WorkflowObject, condition: Condition) -> WorkflowObject {
        let mut obj = obj.clone();
        let mut status = ResourceStatus::default();
        status.set_condition(condition);
        obj.set_status(Some(status));
        obj
    }

    fn ready(obj: &WorkflowObject) -> WorkflowObject {
        with_condition(obj, Condition::new("Ready", ConditionStatus::True))
    }

    fn driver(mock: MockClusterGateway) -> ReconciliationDriver {
        ReconciliationDriver::new(Arc::new(mock), DriverConfig::default())
    }

    /// Backend whose calls never return, apart from an optional create conflict
    struct UnresponsiveGateway {
        conflict_on_create: bool,
    }

    #[async_trait::async_trait]
    impl ClusterGateway for UnresponsiveGateway {
        async fn create(&self, obj: &WorkflowObject) -> Result<WorkflowObject> {
            if self.conflict_on_create {
                return Err(Error::conflict(obj.object_ref(), "exists"));
            }
            std::future::pending().await
        }

        async fn get(&self, _: ResourceKind, _: &str, _: &str) -> Result<WorkflowObject> {
            std::future::pending().await
        }

        async fn wait_for_condition(
            &self,
            _: ResourceKind,
            _: &str,
            _: &str,
            _: Predicate,
            _: Duration,
            _: CancellationToken,
        ) -> Result<WorkflowObject> {
            std::future::pending().await
        }

        async fn ensure_secret(&self, _: &Secret) -> Result<()> {
            std::future::pending().await
        }
    }

    fn unresponsive(conflict_on_create: bool) -> Arc<ReconciliationDriver> {
        Arc::new(ReconciliationDriver::new(
            Arc::new(UnresponsiveGateway { conflict_on_create }),
            DriverConfig::default(),
        ))
    }

    fn conflicting_get(existing: WorkflowObject) -> MockClusterGateway {
        let mut mock = MockClusterGateway::new();
        mock.expect_create()
            .returning(|o| Err(Error::conflict(o.object_ref(), "exists")));
        mock.expect_get()
            .returning(move |_, _, _| Ok(existing.clone()));
        mock
    }

    #[tokio::test]
    async fn test_creates_then_observes() {
        let obj = source_provider();
        let converged = ready(&obj);

        let mut mock = MockClusterGateway::new();
        let created = obj.clone();
        mock.expect_create()
            .times(1)
            .returning(move |_| Ok(created.clone()));
        mock.expect_wait_for_condition()
            .times(1)
            .returning(move |_, _, _, predicate, _, _| {
                assert!(predicate(&converged));
                Ok(converged.clone())
            });

        let d = driver(mock);
        let result = d
            .reconcile(&obj, AdoptPolicy::RequireMatchingSpec, &CancellationToken::new())
            .await
            .expect("reconcile");
        assert!(result.created);
        assert_eq!(result.object.observed_phase(), ObservedPhase::Ready);
        assert_eq!(d.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_adopts_matching_existing_object() {
        let obj = source_provider();
        let existing = ready(&obj);

        let mut mock = MockClusterGateway::new();
        mock.expect_create()
            .returning(|o| Err(Error::conflict(o.object_ref(), "exists")));
        let found = existing.clone();
        mock.expect_get()
            .times(1)
            .returning(move |_, _, _| Ok(found.clone()));
        mock.expect_wait_for_condition()
            .returning(move |_, _, _, _, _, _| Ok(existing.clone()));

        let result = driver(mock)
            .reconcile(&obj, AdoptPolicy::RequireMatchingSpec, &CancellationToken::new())
            .await
            .expect("adopted");
        assert!(!result.created);
    }

    #[tokio::test]
    async fn test_divergent_spec_is_a_conflict() {
        let obj = source_provider();
        let mut req = sample_request();
        req.source.host = "other-vcenter.example.com".into();
        let divergent = build(StageKind::SourceProvider, &req).expect("build");

        let mut mock = MockClusterGateway::new();
        mock.expect_create()
            .returning(|o| Err(Error::conflict(o.object_ref(), "exists")));
        mock.expect_get()
            .returning(move |_, _, _| Ok(divergent.clone()));
        mock.expect_wait_for_condition().never();

        let err = driver(mock)
            .reconcile(&obj, AdoptPolicy::RequireMatchingSpec, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Conflict);
    }

    #[tokio::test]
    async fn test_field_dropped_on_rerun_is_a_conflict() {
        let mut first = sample_request();
        first.description = Some("wave 1".into());
        first.storage[0].access_mode = Some("ReadWriteMany".into());
        let rerun = sample_request();

        for stage in [StageKind::Plan, StageKind::StorageMap] {
            let existing = ready(&build(stage, &first).expect("build"));
            let mut mock = conflicting_get(existing);
            mock.expect_wait_for_condition().never();

            let obj = build(stage, &rerun).expect("build");
            let err = driver(mock)
                .reconcile(&obj, AdoptPolicy::RequireMatchingSpec, &CancellationToken::new())
                .await
                .unwrap_err();
            assert_eq!(err.class(), ErrorClass::Conflict, "{}", stage);
        }
    }

    #[tokio::test]
    async fn test_controller_resolved_vm_id_still_adopts() {
        let mut req = sample_request();
        req.vms[0].id = None;
        let obj = build(StageKind::Plan, &req).expect("build");
        let mut existing = ready(&obj);
        if let WorkflowObject::Plan(p) = &mut existing {
            p.spec.vms[0].id = Some("vm-12345".into());
        }

        let mut mock = conflicting_get(existing.clone());
        mock.expect_wait_for_condition()
            .returning(move |_, _, _, _, _, _| Ok(existing.clone()));

        let result = driver(mock)
            .reconcile(&obj, AdoptPolicy::RequireMatchingSpec, &CancellationToken::new())
            .await
            .expect("adopted");
        assert!(!result.created);
    }

    #[tokio::test]
    async fn test_adopt_existing_ignores_spec() {
        let obj = build(StageKind::DestinationProvider, &sample_request()).expect("build");
        let mut foreign = ready(&obj);
        if let WorkflowObject::Provider(p) = &mut foreign {
            p.spec.url = Some("https://api.remote.example.com:6443".into());
        }

        let mut mock = MockClusterGateway::new();
        mock.expect_create()
            .returning(|o| Err(Error::conflict(o.object_ref(), "exists")));
        let found = foreign.clone();
        mock.expect_get().returning(move |_, _, _| Ok(found.clone()));
        mock.expect_wait_for_condition()
            .returning(move |_, _, _, _, _, _| Ok(foreign.clone()));

        let result = driver(mock)
            .reconcile(&obj, AdoptPolicy::AdoptExisting, &CancellationToken::new())
            .await
            .expect("adopted");
        assert!(!result.created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_create_errors_are_retried() {
        let obj = source_provider();
        let converged = ready(&obj);
        let attempts = Arc::new(AtomicU32::new(0));

        let mut mock = MockClusterGateway::new();
        let counter = attempts.clone();
        let created = obj.clone();
        mock.expect_create().times(3).returning(move |o| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::transient(o.object_ref(), "connection reset"))
            } else {
                Ok(created.clone())
            }
        });
        mock.expect_wait_for_condition()
            .returning(move |_, _, _, _, _, _| Ok(converged.clone()));

        let start = Instant::now();
        let result = driver(mock)
            .reconcile(&obj, AdoptPolicy::RequireMatchingSpec, &CancellationToken::new())
            .await
            .expect("eventually created");
        assert!(result.created);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // two backoffs: ~1s then ~2s, each within ±20%
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(2400), "{:?}", waited);
        assert!(waited <= Duration::from_millis(3600), "{:?}", waited);
    }

    #[tokio::test]
    async fn test_fatal_create_is_not_retried() {
        let obj = source_provider();
        let mut mock = MockClusterGateway::new();
        mock.expect_create()
            .times(1)
            .returning(|o| Err(Error::fatal(o.object_ref(), "forbidden")));
        mock.expect_wait_for_condition().never();

        let err = driver(mock)
            .reconcile(&obj, AdoptPolicy::RequireMatchingSpec, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[tokio::test]
    async fn test_failed_phase_stops_immediately() {
        let obj = source_provider();
        let failed = with_condition(
            &obj,
            Condition::new("ConnectionTestFailed", ConditionStatus::True)
                .with_category(CATEGORY_CRITICAL)
                .with_message("Could not connect to the vCenter."),
        );

        let mut mock = MockClusterGateway::new();
        let created = obj.clone();
        mock.expect_create().returning(move |_| Ok(created.clone()));
        mock.expect_wait_for_condition()
            .times(1)
            .returning(move |_, _, _, predicate, _, _| {
                assert!(predicate(&failed), "Failed must end observation");
                Ok(failed.clone())
            });

        let err = driver(mock)
            .reconcile(&obj, AdoptPolicy::RequireMatchingSpec, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert!(err.to_string().contains("Could not connect to the vCenter."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_wait_errors_back_off_then_succeed() {
        let obj = source_provider();
        let converged = ready(&obj);
        let calls = Arc::new(AtomicU32::new(0));

        let mut mock = MockClusterGateway::new();
        let created = obj.clone();
        mock.expect_create().returning(move |_| Ok(created.clone()));
        let counter = calls.clone();
        mock.expect_wait_for_condition()
            .returning(move |_, _, _, _, _, _| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::transient("get", "503 Service Unavailable"))
                } else {
                    Ok(converged.clone())
                }
            });

        driver(mock)
            .reconcile(&obj, AdoptPolicy::RequireMatchingSpec, &CancellationToken::new())
            .await
            .expect("recovers");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_reports_full_budget_and_last_phase() {
        let obj = source_provider();
        let mut mock = MockClusterGateway::new();
        let created = obj.clone();
        mock.expect_create().returning(move |_| Ok(created.clone()));
        mock.expect_wait_for_condition()
            .returning(|kind, name, ns, _, remaining, _| {
                Err(Error::timeout(
                    object_ref(kind.as_str(), ns, name),
                    remaining,
                    Some(ObservedPhase::Pending),
                ))
            });

        let err = driver(mock)
            .reconcile(&obj, AdoptPolicy::RequireMatchingSpec, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            Error::Timeout {
                budget, last_phase, ..
            } => {
                assert_eq!(budget, DEFAULT_STAGE_TIMEOUT);
                assert_eq!(last_phase, Some(ObservedPhase::Pending));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_not_found_while_observing_fails() {
        let obj = source_provider();
        let mut mock = MockClusterGateway::new();
        let created = obj.clone();
        mock.expect_create().returning(move |_| Ok(created.clone()));
        mock.expect_wait_for_condition()
            .times(1)
            .returning(|_, name, _, _, _, _| Err(Error::not_found(name.to_string())));

        let err = driver(mock)
            .reconcile(&obj, AdoptPolicy::RequireMatchingSpec, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let obj = source_provider();
        let mut mock = MockClusterGateway::new();
        mock.expect_create()
            .returning(|o| Err(Error::transient(o.object_ref(), "connection refused")));

        let d = Arc::new(driver(mock));
        let cancel = CancellationToken::new();
        let task = {
            let d = d.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                d.reconcile(&obj, AdoptPolicy::RequireMatchingSpec, &cancel)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();
        let err = task.await.expect("join").unwrap_err();
        assert_eq!(err.class(), ErrorClass::Cancelled);
        assert_eq!(d.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_a_hanging_create() {
        let d = unresponsive(false);
        let cancel = CancellationToken::new();
        let task = {
            let d = d.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                d.reconcile(&source_provider(), AdoptPolicy::RequireMatchingSpec, &cancel)
                    .await
            })
        };
        let start = Instant::now();
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        let err = task.await.expect("join").unwrap_err();
        assert_eq!(err.class(), ErrorClass::Cancelled);
        assert!(start.elapsed() < Duration::from_millis(1200));
        assert_eq!(d.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_a_hanging_adopt_lookup() {
        let d = unresponsive(true);
        let cancel = CancellationToken::new();
        let task = {
            let d = d.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                d.reconcile(&source_provider(), AdoptPolicy::RequireMatchingSpec, &cancel)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        let err = task.await.expect("join").unwrap_err();
        assert_eq!(err.class(), ErrorClass::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_a_hanging_secret_create() {
        let d = unresponsive(false);
        let secret = build_credentials_secret(&sample_request()).expect("secret");
        let cancel = CancellationToken::new();
        let task = {
            let d = d.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { d.ensure_secret(&secret, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        let err = task.await.expect("join").unwrap_err();
        assert_eq!(err.class(), ErrorClass::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_budget_does_not_overflow() {
        let budget = StageBudget::start(Duration::from_secs(u64::MAX));
        assert_eq!(budget.total(), Duration::from_secs(u64::MAX));
        assert!(budget.remaining() > Duration::from_secs(86_400 * 365));

        let obj = source_provider();
        let converged = ready(&obj);
        let mut mock = MockClusterGateway::new();
        let created = obj.clone();
        mock.expect_create().returning(move |_| Ok(created.clone()));
        mock.expect_wait_for_condition()
            .returning(move |_, _, _, _, _, _| Ok(converged.clone()));
        let config = DriverConfig {
            stage_timeout: Duration::from_secs(u64::MAX),
            migration_timeout: Duration::MAX,
            ..Default::default()
        };
        ReconciliationDriver::new(Arc::new(mock), config)
            .reconcile(&obj, AdoptPolicy::RequireMatchingSpec, &CancellationToken::new())
            .await
            .expect("converges");
    }

    #[test]
    fn test_second_claim_conflicts_until_released() {
        let d = driver(MockClusterGateway::new());
        let obj = source_provider();

        let guard = d.claim(&obj).expect("first claim");
        let err = d.claim(&obj).err().expect("second claim must fail");
        assert_eq!(err.class(), ErrorClass::Conflict);
        assert_eq!(d.in_flight(), 1);

        drop(guard);
        assert_eq!(d.in_flight(), 0);
        d.claim(&obj).expect("claim after release");
    }

    #[test]
    fn test_migration_gets_the_long_budget() {
        let config = DriverConfig::default();
        assert_eq!(
            config.timeout_for(ResourceKind::Migration),
            Duration::from_secs(86_400)
        );
        assert_eq!(config.timeout_for(ResourceKind::Plan), Duration::from_secs(600));
    }
}
