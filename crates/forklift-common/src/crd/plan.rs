//! Plan CRD: which VMs migrate, between which providers, under which maps

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ObservedPhase, ProviderPair, ResourceRef, ResourceStatus, SourceRef};

/// Plan specifies the VMs to migrate and the mappings to apply.
///
/// Example:
/// ```yaml
/// apiVersion: forklift.konveyor.io/v1beta1
/// kind: Plan
/// metadata:
///   name: demo-plan
///   namespace: openshift-mtv
/// spec:
///   provider:
///     source: { name: vmware-demo, namespace: openshift-mtv }
///     destination: { name: host, namespace: openshift-mtv }
///   targetNamespace: vms
///   map:
///     network: { name: demo-networkmap, namespace: openshift-mtv }
///     storage: { name: demo-storagemap, namespace: openshift-mtv }
///   vms:
///     - id: vm-12345
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "forklift.konveyor.io",
    version = "v1beta1",
    kind = "Plan",
    namespaced,
    status = "ResourceStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.targetNamespace"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PlanSpec {
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Source and destination providers
    pub provider: ProviderPair,
    /// Namespace the migrated VMs are created in
    pub target_namespace: String,
    /// Network and storage maps
    pub map: PlanMaps,
    /// VMs to migrate
    pub vms: Vec<SourceRef>,
    /// Warm migration (pre-copy while the source VM keeps running)
    #[serde(default)]
    pub warm: bool,
}

/// References to the maps a plan uses
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct PlanMaps {
    /// NetworkMap reference
    pub network: ResourceRef,
    /// StorageMap reference
    pub storage: ResourceRef,
}

impl Plan {
    /// Reduce the plan's status conditions to an [`ObservedPhase`].
    ///
    /// Failure conditions take precedence, then completion, execution and
    /// readiness.
    pub fn observed_phase(&self) -> ObservedPhase {
        let Some(status) = self.status.as_ref() else {
            return ObservedPhase::Pending;
        };
        if status.is_true("Failed") || status.critical().is_some() {
            ObservedPhase::Failed
        } else if status.is_true("Succeeded") {
            ObservedPhase::Succeeded
        } else if status.is_true("Executing") {
            ObservedPhase::Running
        } else if status.is_true("Ready") {
            ObservedPhase::Ready
        } else {
            ObservedPhase::Pending
        }
    }

    /// Message describing why the plan failed, if it did
    pub fn failure_reason(&self) -> Option<String> {
        let status = self.status.as_ref()?;
        status
            .critical()
            .or_else(|| status.true_condition("Failed"))
            .map(|c| c.describe())
    }
}
