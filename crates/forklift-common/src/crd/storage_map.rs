//! StorageMap CRD: maps source datastores onto storage classes

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::network_map::map_phase;
use super::types::{ObservedPhase, ProviderPair, ResourceStatus, SourceRef};

/// StorageMap pairs each source datastore / storage domain with a
/// destination storage class.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "forklift.konveyor.io",
    version = "v1beta1",
    kind = "StorageMap",
    namespaced,
    status = "ResourceStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct StorageMapSpec {
    /// Providers the map applies to
    pub provider: ProviderPair,
    /// Storage pairs
    pub map: Vec<StoragePair>,
}

/// One source datastore → storage class mapping
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct StoragePair {
    /// Source datastore in the provider inventory
    pub source: SourceRef,
    /// Destination storage
    pub destination: StorageDestination,
}

/// Destination storage
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageDestination {
    /// Storage class for the migrated disks
    pub storage_class: String,
    /// PVC access mode (ReadWriteOnce, ReadWriteMany, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<String>,
    /// PVC volume mode (Filesystem, Block)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_mode: Option<String>,
}

impl StorageMap {
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
