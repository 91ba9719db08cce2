//! Migration orchestrator: sequences the six stages of a workflow
//!
//! validate → credential secret → source Provider → destination Provider →
//! NetworkMap → StorageMap → Plan → Migration. Each stage starts only after
//! the previous one converged; the first failure halts the workflow and
//! leaves every object already created in place.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use forklift_common::{Error, Result};

use crate::builder::{build, build_credentials_secret, StageKind};
use crate::driver::{AdoptPolicy, DriverConfig, Reconciled, ReconciliationDriver};
use crate::gateway::ClusterGateway;
use crate::request::MigrationRequest;
use crate::state::{WorkflowPhase, WorkflowState};

/// Orchestrator configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Timeouts and backoff
    pub driver: DriverConfig,
    /// Adopt an existing destination Provider without comparing specs
    pub adopt_destination: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            driver: DriverConfig::default(),
            adopt_destination: true,
        }
    }
}

/// Outcome of one workflow run
#[derive(Debug)]
pub struct MigrationRun {
    /// Final (possibly partial) workflow state
    pub state: WorkflowState,
    /// The error that stopped the workflow, if any
    pub error: Option<Error>,
}

impl MigrationRun {
    /// Whether every stage succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.state.phase() == WorkflowPhase::Succeeded
    }

    /// The state on success, the error otherwise
    pub fn into_result(self) -> Result<WorkflowState> {
        match self.error {
            None => Ok(self.state),
            Some(e) => Err(e),
        }
    }
}

/// Runs migration workflows against a shared gateway.
///
/// Holds no per-request state; one orchestrator can run many requests
/// concurrently.
pub struct Orchestrator {
    driver: ReconciliationDriver,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator over `gateway`
    pub fn new(gateway: Arc<dyn ClusterGateway>, config: OrchestratorConfig) -> Self {
        Self {
            driver: ReconciliationDriver::new(gateway, config.driver.clone()),
            config,
        }
    }

    /// The reconciliation driver
    pub fn driver(&self) -> &ReconciliationDriver {
        &self.driver
    }

    /// Run the workflow for `request` until it succeeds, fails or `cancel`
    /// fires.
    ///
    /// Never panics on backend errors; the returned state names the stage
    /// that stopped the workflow and why.
    #[instrument(
        skip(self, request, cancel),
        fields(workflow = %request.name, namespace = %request.namespace)
    )]
    pub async fn run(&self, request: &MigrationRequest, cancel: CancellationToken) -> MigrationRun {
        let mut state = WorkflowState::new(&request.name, &request.namespace);
        match self.execute(request, &cancel, &mut state).await {
            Ok(()) => {
                info!("Workflow succeeded");
                MigrationRun { state, error: None }
            }
            Err(e) => {
                state.fail(&e);
                match state.phase() {
                    WorkflowPhase::Cancelled => warn!(error = %e, "Workflow cancelled"),
                    _ => error!(
                        error = %e,
                        class = %e.class(),
                        stage = ?state.failed_stage().map(|r| r.stage),
                        "Workflow failed"
                    ),
                }
                MigrationRun {
                    state,
                    error: Some(e),
                }
            }
        }
    }

    async fn execute(
        &self,
        request: &MigrationRequest,
        cancel: &CancellationToken,
        state: &mut WorkflowState,
    ) -> Result<()> {
        request.validate()?;

        let secret = build_credentials_secret(request)?;
        self.driver.ensure_secret(&secret, cancel).await?;

        for stage in StageKind::ALL {
            self.run_stage(stage, request, cancel, state).await?;
        }
        Ok(())
    }

    async fn run_stage(
        &self,
        stage: StageKind,
        request: &MigrationRequest,
        cancel: &CancellationToken,
        state: &mut WorkflowState,
    ) -> Result<()> {
        let obj = build(stage, request)?;
        state.begin(stage, obj.name(), obj.namespace())?;
        info!(stage = %stage, kind = %obj.kind(), name = %obj.name(), "Starting stage");

        let policy = match stage {
            StageKind::DestinationProvider if self.config.adopt_destination => {
                AdoptPolicy::AdoptExisting
            }
            _ => AdoptPolicy::RequireMatchingSpec,
        };

        // A shared destination provider may be reconciled by several
        // workflows at once; only objects this workflow owns are claimed.
        let _guard = match policy {
            AdoptPolicy::RequireMatchingSpec => Some(self.driver.claim(&obj)?),
            AdoptPolicy::AdoptExisting => None,
        };

        let budget = self.driver.budget_for(obj.kind());
        let Reconciled { object, created } = self
            .driver
            .ensure_created(&obj, policy, &budget, cancel)
            .await?;
        state.mark_observing(created)?;
        state.observe(object.observed_phase())?;

        let converged = self.driver.observe(&object, &budget, cancel).await?;
        state.complete(converged.observed_phase())?;
        info!(
            stage = %stage,
            phase = %converged.observed_phase(),
            created,
            "Stage succeeded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forklift_common::crd::ResourceKind;
    use forklift_common::ErrorClass;

    use crate::gateway::{ControllerBehavior, MemoryGateway};
    use crate::request::tests::sample_request;
    use crate::state::StageStatus;

    #[tokio::test]
    async fn test_invalid_request_fails_before_any_backend_call() {
        let gw = Arc::new(MemoryGateway::new());
        let orchestrator = Orchestrator::new(gw.clone(), OrchestratorConfig::default());
        let mut req = sample_request();
        req.vms.clear();

        let run = orchestrator.run(&req, CancellationToken::new()).await;
        assert!(!run.is_success());
        assert_eq!(run.state.phase(), WorkflowPhase::Failed);
        assert!(run.state.stages().is_empty());
        assert_eq!(
            run.error.as_ref().map(|e| e.class()),
            Some(ErrorClass::Validation)
        );
        assert!(gw.secret("vmware-demo-secret", "openshift-mtv").is_none());
        assert_eq!(gw.total_creates(), 0);
    }

    #[tokio::test]
    async fn test_credential_secret_is_written() {
        let gw = Arc::new(MemoryGateway::new());
        let orchestrator = Orchestrator::new(gw.clone(), OrchestratorConfig::default());

        let run = orchestrator
            .run(&sample_request(), CancellationToken::new())
            .await;
        assert!(run.is_success(), "{:?}", run.error);
        let secret = gw
            .secret("vmware-demo-secret", "openshift-mtv")
            .expect("secret");
        assert_eq!(
            secret.string_data.expect("data")["user"],
            "administrator@vsphere.local"
        );
        assert_eq!(gw.create_count(ResourceKind::Provider), 2);
    }

    #[tokio::test]
    async fn test_plan_failure_marks_plan_stage() {
        let gw = Arc::new(MemoryGateway::new().with_behavior(
            ResourceKind::Plan,
            ControllerBehavior::Fail {
                after: 0,
                message: "VM vm-12345 not found".into(),
            },
        ));
        let orchestrator = Orchestrator::new(gw.clone(), OrchestratorConfig::default());

        let run = orchestrator
            .run(&sample_request(), CancellationToken::new())
            .await;
        let failed = run.state.failed_stage().expect("failed stage");
        assert_eq!(failed.stage, StageKind::Plan);
        assert_eq!(run.state.count(StageStatus::Succeeded), 4);
        assert_eq!(gw.create_count(ResourceKind::Migration), 0);
        assert!(run
            .error
            .expect("error")
            .to_string()
            .contains("VM vm-12345 not found"));
    }
}
