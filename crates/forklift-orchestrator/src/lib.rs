//! Forklift migration orchestrator
//!
//! Creates the credential secret and the Forklift resource chain for a VM
//! migration and drives each object to convergence:
//!
//! - [`request`]: the [`MigrationRequest`] input and its validation
//! - [`builder`]: pure rendering of the workflow objects
//! - [`gateway`]: the backend capability trait and its Kubernetes and
//!   in-memory implementations
//! - [`driver`]: per-object create/observe with backoff, timeout and
//!   cancellation
//! - [`orchestrator`]: stage sequencing and the re-run policy
//! - [`state`]: the monotonic [`WorkflowState`]

#![deny(missing_docs)]

pub mod builder;
pub mod driver;
pub mod gateway;
pub mod orchestrator;
pub mod request;
pub mod state;

pub use builder::{build, build_credentials_secret, render_manifests, StageKind, WorkflowObject};
pub use driver::{AdoptPolicy, DriverConfig, ReconciliationDriver};
pub use gateway::{ClusterGateway, ControllerBehavior, KubeGateway, MemoryGateway};
pub use orchestrator::{MigrationRun, Orchestrator, OrchestratorConfig};
pub use request::MigrationRequest;
pub use state::{StageRecord, StageStatus, WorkflowPhase, WorkflowState};
