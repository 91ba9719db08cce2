//! NetworkMap CRD: maps source networks onto destination networks

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ObservedPhase, ProviderPair, ResourceStatus, SourceRef};

/// NetworkMap pairs each source network with a pod network, a Multus
/// network attachment, or "ignored".
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "forklift.konveyor.io",
    version = "v1beta1",
    kind = "NetworkMap",
    namespaced,
    status = "ResourceStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMapSpec {
    /// Providers the map applies to
    pub provider: ProviderPair,
    /// Network pairs
    pub map: Vec<NetworkPair>,
}

/// One source network → destination network mapping
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct NetworkPair {
    /// Source network in the provider inventory
    pub source: SourceRef,
    /// Destination network
    pub destination: NetworkDestination,
}

/// Destination network
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct NetworkDestination {
    /// Network type
    #[serde(rename = "type")]
    pub network_type: NetworkType,
    /// NetworkAttachmentDefinition name (multus only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// NetworkAttachmentDefinition namespace (multus only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Destination network type
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// The pod network
    #[default]
    Pod,
    /// A Multus NetworkAttachmentDefinition
    Multus,
    /// Do not attach the NIC
    Ignored,
}

impl NetworkMap {
    /// Ready once validated, Failed on any critical condition
    pub fn observed_phase(&self) -> ObservedPhase {
        map_phase(self.status.as_ref())
    }

    /// Message describing why the map failed, if it did
    pub fn failure_reason(&self) -> Option<String> {
        self.status
            .as_ref()
            .and_then(|s| s.critical())
            .map(|c| c.describe())
    }
}

/// Shared phase reduction for NetworkMap and StorageMap
pub(crate) fn map_phase(status: Option<&ResourceStatus>) -> ObservedPhase {
    match status {
        Some(s) if s.critical().is_some() => ObservedPhase::Failed,
        Some(s) if s.is_true("Ready") => ObservedPhase::Ready,
        _ => ObservedPhase::Pending,
    }
}
