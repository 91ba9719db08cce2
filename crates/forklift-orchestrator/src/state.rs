//! Workflow state: the ordered record of stages a run has begun
//!
//! Stages are appended strictly in [`StageKind::ALL`] order and only after
//! the previous one succeeded. A stage is never re-begun once the workflow
//! has advanced past it.

use serde::{Deserialize, Serialize};

use forklift_common::crd::{ObservedPhase, ResourceKind};
use forklift_common::{Error, ErrorClass, Result};

use crate::builder::StageKind;

/// Progress of a single stage
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum StageStatus {
    /// Object rendered, create not yet acknowledged
    Pending,
    /// Object exists; waiting for its controller
    Observing,
    /// Converged
    Succeeded,
    /// Failed; the workflow halted here
    Failed,
}

/// Overall workflow phase
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum WorkflowPhase {
    /// Stages still advancing
    #[default]
    Running,
    /// All six stages succeeded
    Succeeded,
    /// A stage (or validation) failed
    Failed,
    /// The caller cancelled the run
    Cancelled,
}

impl WorkflowPhase {
    /// Whether the workflow has stopped
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// Error class and message recorded on failure
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct StageFailure {
    /// Error class
    pub class: ErrorClass,
    /// Error message
    pub message: String,
}

impl From<&Error> for StageFailure {
    fn from(err: &Error) -> Self {
        Self {
            class: err.class(),
            message: err.to_string(),
        }
    }
}

/// One stage of the workflow
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    /// Which stage
    pub stage: StageKind,
    /// Resource kind created by the stage
    pub kind: ResourceKind,
    /// Object name
    pub name: String,
    /// Object namespace
    pub namespace: String,
    /// Stage progress
    pub status: StageStatus,
    /// Last phase observed on the object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_phase: Option<ObservedPhase>,
    /// Whether this run created the object (false when adopted)
    #[serde(default)]
    pub created: bool,
    /// Failure details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
}

/// Ordered stage records plus the current stage and workflow phase
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    workflow: String,
    namespace: String,
    phase: WorkflowPhase,
    current_stage: Option<usize>,
    stages: Vec<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<StageFailure>,
}

impl WorkflowState {
    /// Empty state for a workflow
    pub fn new(workflow: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Workflow name
    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    /// Namespace of the workflow objects
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Overall phase
    pub fn phase(&self) -> WorkflowPhase {
        self.phase
    }

    /// Index of the stage currently in progress (or last attempted)
    pub fn current_stage(&self) -> Option<usize> {
        self.current_stage
    }

    /// Stage records in execution order
    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    /// Record of a given stage, if begun
    pub fn stage(&self, stage: StageKind) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// Workflow-level failure, if any
    pub fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    /// Stage that failed, if any
    pub fn failed_stage(&self) -> Option<&StageRecord> {
        self.stages
            .iter()
            .find(|r| r.status == StageStatus::Failed)
    }

    /// Number of stages with the given status
    pub fn count(&self, status: StageStatus) -> usize {
        self.stages.iter().filter(|r| r.status == status).count()
    }

    fn current_mut(&mut self) -> Result<&mut StageRecord> {
        let index = self
            .current_stage
            .ok_or_else(|| Error::internal_with_context("workflow_state", "no stage in progress"))?;
        self.stages
            .get_mut(index)
            .ok_or_else(|| Error::internal_with_context("workflow_state", "stage index out of range"))
    }

    /// Begin the next stage.
    ///
    /// Rejects anything but the next stage in order, and refuses to begin
    /// while the previous stage has not succeeded or the workflow stopped.
    pub fn begin(
        &mut self,
        stage: StageKind,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Result<()> {
        if self.phase.is_terminal() {
            return Err(Error::internal_with_context(
                "workflow_state",
                format!("cannot begin {} in a {} workflow", stage, self.phase),
            ));
        }
        let expected = self.stages.len();
        if stage.index() != expected {
            return Err(Error::internal_with_context(
                "workflow_state",
                format!("stage {} begun out of order (next is #{})", stage, expected),
            ));
        }
        if let Some(prev) = self.stages.last() {
            if prev.status != StageStatus::Succeeded {
                return Err(Error::internal_with_context(
                    "workflow_state",
                    format!("cannot begin {} before {} succeeded", stage, prev.stage),
                ));
            }
        }
        self.stages.push(StageRecord {
            stage,
            kind: stage.resource_kind(),
            name: name.into(),
            namespace: namespace.into(),
            status: StageStatus::Pending,
            observed_phase: None,
            created: false,
            failure: None,
        });
        self.current_stage = Some(expected);
        Ok(())
    }

    /// The current stage's object exists; `created` is false when adopted
    pub fn mark_observing(&mut self, created: bool) -> Result<()> {
        let record = self.current_mut()?;
        if record.status != StageStatus::Pending {
            return Err(Error::internal_with_context(
                "workflow_state",
                format!("{} is {:?}, not Pending", record.stage, record.status),
            ));
        }
        record.status = StageStatus::Observing;
        record.created = created;
        Ok(())
    }

    /// The current stage converged with `phase`
    pub fn complete(&mut self, phase: ObservedPhase) -> Result<()> {
        let record = self.current_mut()?;
        if record.status != StageStatus::Observing {
            return Err(Error::internal_with_context(
                "workflow_state",
                format!("{} is {:?}, not Observing", record.stage, record.status),
            ));
        }
        record.status = StageStatus::Succeeded;
        record.observed_phase = Some(phase);
        if self.stages.len() == StageKind::ALL.len() {
            self.phase = WorkflowPhase::Succeeded;
        }
        Ok(())
    }

    /// Stop the workflow with `err`.
    ///
    /// Marks the in-progress stage Failed when there is one; errors raised
    /// before any stage began (validation, secret) only set the workflow
    /// failure.
    pub fn fail(&mut self, err: &Error) {
        let failure = StageFailure::from(err);
        if let Some(record) = self
            .current_stage
            .and_then(|i| self.stages.get_mut(i))
            .filter(|r| matches!(r.status, StageStatus::Pending | StageStatus::Observing))
        {
            record.status = StageStatus::Failed;
            record.failure = Some(failure.clone());
            if let Some(phase) = err.last_phase() {
                record.observed_phase = Some(phase);
            }
        }
        self.phase = if failure.class == ErrorClass::Cancelled {
            WorkflowPhase::Cancelled
        } else {
            WorkflowPhase::Failed
        };
        self.failure = Some(failure);
    }

    /// Record the phase last seen on the current stage's object
    pub fn observe(&mut self, phase: ObservedPhase) -> Result<()> {
        self.current_mut()?.observed_phase = Some(phase);
        Ok(())
    }
}
