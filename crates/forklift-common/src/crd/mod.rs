//! Forklift custom resources
//!
//! Typed views of the `forklift.konveyor.io/v1beta1` kinds the orchestrator
//! creates. Status is written by the Forklift controllers and only read here;
//! each kind reduces it to an [`ObservedPhase`].

mod migration;
mod network_map;
mod plan;
mod provider;
mod storage_map;
mod types;

use kube::discovery::ApiResource;
use serde::{Deserialize, Serialize};

use crate::kube_utils::build_api_resource;
use crate::FORKLIFT_API_VERSION;

pub use migration::{Migration, MigrationSpec};
pub use network_map::{NetworkDestination, NetworkMap, NetworkMapSpec, NetworkPair, NetworkType};
pub use plan::{Plan, PlanMaps, PlanSpec};
pub use provider::{Provider, ProviderSpec, ProviderType};
pub use storage_map::{StorageDestination, StorageMap, StorageMapSpec, StoragePair};
pub use types::{
    Condition, ConditionStatus, ObservedPhase, ProviderPair, ResourceRef, ResourceStatus,
    SourceRef, CATEGORY_CRITICAL,
};

/// The Forklift kinds a workflow creates
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Provider (source or destination)
    Provider,
    /// NetworkMap
    NetworkMap,
    /// StorageMap
    StorageMap,
    /// Plan
    Plan,
    /// Migration
    Migration,
}

impl ResourceKind {
    /// All kinds in creation order
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Provider,
        ResourceKind::NetworkMap,
        ResourceKind::StorageMap,
        ResourceKind::Plan,
        ResourceKind::Migration,
    ];

    /// The Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provider => "Provider",
            Self::NetworkMap => "NetworkMap",
            Self::StorageMap => "StorageMap",
            Self::Plan => "Plan",
            Self::Migration => "Migration",
        }
    }

    /// ApiResource for dynamic API access
    pub fn api_resource(&self) -> ApiResource {
        build_api_resource(FORKLIFT_API_VERSION, self.as_str())
    }

    /// Whether `phase` counts as success for this kind.
    ///
    /// Providers and maps are done once Ready. A Plan is done once Ready and
    /// stays done while it executes or after it completes. A Migration is
    /// only done when it has Succeeded.
    pub fn is_converged(&self, phase: ObservedPhase) -> bool {
        match self {
            Self::Provider | Self::NetworkMap | Self::StorageMap => phase == ObservedPhase::Ready,
            Self::Plan => matches!(
                phase,
                ObservedPhase::Ready | ObservedPhase::Running | ObservedPhase::Succeeded
            ),
            Self::Migration => phase == ObservedPhase::Succeeded,
        }
    }

    /// Whether `phase` ends observation for this kind (converged or failed)
    pub fn is_terminal(&self, phase: ObservedPhase) -> bool {
        phase == ObservedPhase::Failed || self.is_converged(phase)
    }

    /// Spec paths the Forklift controllers fill in on their own.
    ///
    /// A source reference given by name gets its inventory `id` resolved.
    /// Every other spec field must match on re-run.
    pub fn server_defaulted_fields(&self) -> &'static [&'static str] {
        match self {
            Self::NetworkMap | Self::StorageMap => &["map.*.source.id"],
            Self::Plan => &["vms.*.id"],
            Self::Provider | Self::Migration => &[],
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown Forklift kind: {}", s))
    }
}
