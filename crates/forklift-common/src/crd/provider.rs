//! Provider CRD: a connection to a source or destination platform

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ObservedPhase, ResourceRef, ResourceStatus};

/// Provider phases the controller reports when validation fails
const FAILED_PHASES: &[&str] = &["ConnectionFailed", "ValidationFailed", "Failed"];

/// Provider describes how Forklift connects to a virtualization platform.
///
/// Example:
/// ```yaml
/// apiVersion: forklift.konveyor.io/v1beta1
/// kind: Provider
/// metadata:
///   name: vmware-demo
///   namespace: openshift-mtv
/// spec:
///   type: vsphere
///   url: https://vcenter.example.com/sdk
///   secret:
///     name: vmware-demo-secret
///     namespace: openshift-mtv
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "forklift.konveyor.io",
    version = "v1beta1",
    kind = "Provider",
    namespaced,
    status = "ResourceStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".spec.url"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    /// Platform type
    #[serde(rename = "type")]
    pub provider_type: ProviderType,

    /// API endpoint; empty for the local (host) cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Credentials secret; absent for the local (host) cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<ResourceRef>,

    /// Provider-specific settings (sdkEndpoint, vddkInitImage, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, String>,
}

/// Supported platform types
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// VMware vSphere / vCenter
    #[default]
    Vsphere,
    /// Red Hat Virtualization / oVirt
    Ovirt,
    /// OpenStack
    Openstack,
    /// OVA files on an NFS share
    Ova,
    /// OpenShift Virtualization / KubeVirt
    Openshift,
}

impl ProviderType {
    /// The lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vsphere => "vsphere",
            Self::Ovirt => "ovirt",
            Self::Openstack => "openstack",
            Self::Ova => "ova",
            Self::Openshift => "openshift",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Provider {
    /// Reduce the controller-written status to an [`ObservedPhase`].
    ///
    /// Ready when the Ready condition (or phase) says so, Failed on a failed
    /// phase or any critical condition, Pending otherwise.
    pub fn observed_phase(&self) -> ObservedPhase {
        let Some(status) = self.status.as_ref() else {
            return ObservedPhase::Pending;
        };
        let phase = status.phase.as_deref();
        if phase.is_some_and(|p| FAILED_PHASES.contains(&p)) || status.critical().is_some() {
            ObservedPhase::Failed
        } else if status.is_true("Ready") || phase == Some("Ready") {
            ObservedPhase::Ready
        } else {
            ObservedPhase::Pending
        }
    }

    /// Message describing why the provider failed, if it did
    pub fn failure_reason(&self) -> Option<String> {
        let status = self.status.as_ref()?;
        status
            .critical()
            .map(|c| c.describe())
            .or_else(|| status.phase.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::types::{Condition, ConditionStatus};

    fn provider_with(status: Option<ResourceStatus>) -> Provider {
        let mut p = Provider::new(
            "vmware-demo",
            ProviderSpec {
                provider_type: ProviderType::Vsphere,
                url: Some("https://vcenter.example.com/sdk".to_string()),
                secret: Some(ResourceRef::new("vmware-demo-secret", "openshift-mtv")),
                settings: BTreeMap::new(),
            },
        );
        p.status = status;
        p
    }

    #[test]
    fn test_serializes_as_forklift_provider() {
        let json = serde_json::to_value(provider_with(None)).expect("serialize");
        assert_eq!(json["apiVersion"], "forklift.konveyor.io/v1beta1");
        assert_eq!(json["kind"], "Provider");
        assert_eq!(json["spec"]["type"], "vsphere");
        assert_eq!(json["spec"]["secret"]["name"], "vmware-demo-secret");
        assert!(json["spec"].get("settings").is_none());
    }

    #[test]
    fn test_phase_pending_without_status() {
        assert_eq!(provider_with(None).observed_phase(), ObservedPhase::Pending);
    }

    #[test]
    fn test_phase_ready_from_condition() {
        let mut status = ResourceStatus::default();
        status.set_condition(Condition::new("Ready", ConditionStatus::True));
        assert_eq!(
            provider_with(Some(status)).observed_phase(),
            ObservedPhase::Ready
        );
    }

    #[test]
    fn test_phase_failed_from_phase_string() {
        let status = ResourceStatus {
            phase: Some("ConnectionFailed".to_string()),
            ..Default::default()
        };
        let p = provider_with(Some(status));
        assert_eq!(p.observed_phase(), ObservedPhase::Failed);
        assert_eq!(p.failure_reason().as_deref(), Some("ConnectionFailed"));
    }

    #[test]
    fn test_critical_condition_wins_over_ready() {
        let mut status = ResourceStatus::default();
        status.set_condition(Condition::new("Ready", ConditionStatus::True));
        status.set_condition(
            Condition::new("SecretNotValid", ConditionStatus::True)
                .with_category("Critical")
                .with_message("The secret is not valid."),
        );
        let p = provider_with(Some(status));
        assert_eq!(p.observed_phase(), ObservedPhase::Failed);
        assert_eq!(p.failure_reason().as_deref(), Some("The secret is not valid."));
    }
}
