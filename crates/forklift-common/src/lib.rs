//! Common types for the Forklift migration orchestrator: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod retry;
pub mod telemetry;

pub use error::{Error, ErrorClass};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group of the Forklift custom resources
pub const FORKLIFT_GROUP: &str = "forklift.konveyor.io";

/// API version of the Forklift custom resources
pub const FORKLIFT_VERSION: &str = "v1beta1";

/// Full apiVersion string for Forklift custom resources
pub const FORKLIFT_API_VERSION: &str = "forklift.konveyor.io/v1beta1";

/// Default namespace for Forklift objects (the MTV operator namespace)
pub const DEFAULT_FORKLIFT_NAMESPACE: &str = "openshift-mtv";

/// Name of the in-cluster destination provider created by the Forklift operator
pub const DEFAULT_DESTINATION_PROVIDER: &str = "host";

/// Field manager / managed-by value written on every object we create
pub const FIELD_MANAGER: &str = "forklift-migrate";

/// Standard Kubernetes label for the resource name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Standard Kubernetes label for the managing tool
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label tying every object to the workflow that created it
pub const LABEL_WORKFLOW: &str = "forklift.dev/workflow";

/// Annotation recording the source datacenter
pub const ANNOTATION_DATACENTER: &str = "forklift.dev/datacenter";

/// Annotation recording the source compute cluster
pub const ANNOTATION_CLUSTER: &str = "forklift.dev/cluster";
