//! Resource builder: renders the workflow objects from a request
//!
//! Pure functions, no I/O. Each call renders one object; names come from
//! the request's naming convention and are validated before anything is
//! returned.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use forklift_common::crd::{
    Migration, MigrationSpec, NetworkDestination, NetworkMap, NetworkMapSpec, NetworkPair,
    ObservedPhase, Plan, PlanMaps, PlanSpec, Provider, ProviderPair, ProviderSpec, ProviderType,
    ResourceKind, ResourceRef, ResourceStatus, StorageDestination, StorageMap, StorageMapSpec,
    StoragePair,
};
use forklift_common::kube_utils::{object_ref, validate_resource_name};
use forklift_common::{
    Error, Result, ANNOTATION_CLUSTER, ANNOTATION_DATACENTER, FIELD_MANAGER, LABEL_MANAGED_BY,
    LABEL_NAME, LABEL_WORKFLOW,
};

use crate::request::MigrationRequest;

/// Label Forklift reads to tell which provider type a secret belongs to
pub const LABEL_CREATED_FOR_PROVIDER_TYPE: &str = "createdForProviderType";

/// The six stages of a workflow, in execution order
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Source Provider
    SourceProvider,
    /// Destination Provider (adopted when it already exists)
    DestinationProvider,
    /// NetworkMap
    NetworkMap,
    /// StorageMap
    StorageMap,
    /// Plan
    Plan,
    /// Migration
    Migration,
}

impl StageKind {
    /// All stages in execution order
    pub const ALL: [StageKind; 6] = [
        StageKind::SourceProvider,
        StageKind::DestinationProvider,
        StageKind::NetworkMap,
        StageKind::StorageMap,
        StageKind::Plan,
        StageKind::Migration,
    ];

    /// Position of this stage in [`StageKind::ALL`]
    pub fn index(&self) -> usize {
        match self {
            Self::SourceProvider => 0,
            Self::DestinationProvider => 1,
            Self::NetworkMap => 2,
            Self::StorageMap => 3,
            Self::Plan => 4,
            Self::Migration => 5,
        }
    }

    /// Resource kind created by this stage
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            Self::SourceProvider | Self::DestinationProvider => ResourceKind::Provider,
            Self::NetworkMap => ResourceKind::NetworkMap,
            Self::StorageMap => ResourceKind::StorageMap,
            Self::Plan => ResourceKind::Plan,
            Self::Migration => ResourceKind::Migration,
        }
    }

    /// Object name this stage uses for `request`
    pub fn object_name(&self, request: &MigrationRequest) -> String {
        match self {
            Self::SourceProvider => request.source_provider_name().to_string(),
            Self::DestinationProvider => request.destination_provider_name().to_string(),
            Self::NetworkMap => request.network_map_name(),
            Self::StorageMap => request.storage_map_name(),
            Self::Plan => request.plan_name(),
            Self::Migration => request.migration_name(),
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SourceProvider => "SourceProvider",
            Self::DestinationProvider => "DestinationProvider",
            Self::NetworkMap => "NetworkMap",
            Self::StorageMap => "StorageMap",
            Self::Plan => "Plan",
            Self::Migration => "Migration",
        };
        f.write_str(s)
    }
}

/// One Forklift object of any workflow kind
#[derive(Clone, Debug, PartialEq)]
pub enum WorkflowObject {
    /// Provider (source or destination)
    Provider(Provider),
    /// NetworkMap
    NetworkMap(NetworkMap),
    /// StorageMap
    StorageMap(StorageMap),
    /// Plan
    Plan(Plan),
    /// Migration
    Migration(Migration),
}

impl WorkflowObject {
    /// Resource kind
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Provider(_) => ResourceKind::Provider,
            Self::NetworkMap(_) => ResourceKind::NetworkMap,
            Self::StorageMap(_) => ResourceKind::StorageMap,
            Self::Plan(_) => ResourceKind::Plan,
            Self::Migration(_) => ResourceKind::Migration,
        }
    }

    fn meta(&self) -> &ObjectMeta {
        match self {
            Self::Provider(o) => &o.metadata,
            Self::NetworkMap(o) => &o.metadata,
            Self::StorageMap(o) => &o.metadata,
            Self::Plan(o) => &o.metadata,
            Self::Migration(o) => &o.metadata,
        }
    }

    /// Object name
    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    /// Object namespace
    pub fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }

    /// Labels
    pub fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.meta().labels.as_ref()
    }

    /// `Kind/namespace/name` identifier for errors and logs
    pub fn object_ref(&self) -> String {
        object_ref(self.kind().as_str(), self.namespace(), self.name())
    }

    /// Controller-written status, if any
    pub fn status(&self) -> Option<&ResourceStatus> {
        match self {
            Self::Provider(o) => o.status.as_ref(),
            Self::NetworkMap(o) => o.status.as_ref(),
            Self::StorageMap(o) => o.status.as_ref(),
            Self::Plan(o) => o.status.as_ref(),
            Self::Migration(o) => o.status.as_ref(),
        }
    }

    /// Replace the status block (used by the in-memory backend's controllers)
    pub fn set_status(&mut self, status: Option<ResourceStatus>) {
        match self {
            Self::Provider(o) => o.status = status,
            Self::NetworkMap(o) => o.status = status,
            Self::StorageMap(o) => o.status = status,
            Self::Plan(o) => o.status = status,
            Self::Migration(o) => o.status = status,
        }
    }

    /// Phase reduced from the status conditions
    pub fn observed_phase(&self) -> ObservedPhase {
        match self {
            Self::Provider(o) => o.observed_phase(),
            Self::NetworkMap(o) => o.observed_phase(),
            Self::StorageMap(o) => o.observed_phase(),
            Self::Plan(o) => o.observed_phase(),
            Self::Migration(o) => o.observed_phase(),
        }
    }

    /// Controller-reported failure message, if any
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Provider(o) => o.failure_reason(),
            Self::NetworkMap(o) => o.failure_reason(),
            Self::StorageMap(o) => o.failure_reason(),
            Self::Plan(o) => o.failure_reason(),
            Self::Migration(o) => o.failure_reason(),
        }
    }

    /// The spec payload as JSON
    pub fn spec_json(&self) -> Result<Value> {
        let spec = match self {
            Self::Provider(o) => serde_json::to_value(&o.spec),
            Self::NetworkMap(o) => serde_json::to_value(&o.spec),
            Self::StorageMap(o) => serde_json::to_value(&o.spec),
            Self::Plan(o) => serde_json::to_value(&o.spec),
            Self::Migration(o) => serde_json::to_value(&o.spec),
        };
        spec.map_err(|e| Error::serialization_for_kind(self.kind().as_str(), e.to_string()))
    }

    /// The full object as JSON
    pub fn to_json(&self) -> Result<Value> {
        let value = match self {
            Self::Provider(o) => serde_json::to_value(o),
            Self::NetworkMap(o) => serde_json::to_value(o),
            Self::StorageMap(o) => serde_json::to_value(o),
            Self::Plan(o) => serde_json::to_value(o),
            Self::Migration(o) => serde_json::to_value(o),
        };
        value.map_err(|e| Error::serialization_for_kind(self.kind().as_str(), e.to_string()))
    }

    /// Parse an object of `kind` from JSON
    pub fn from_json(kind: ResourceKind, value: Value) -> Result<Self> {
        let err = |e: serde_json::Error| Error::serialization_for_kind(kind.as_str(), e.to_string());
        Ok(match kind {
            ResourceKind::Provider => Self::Provider(serde_json::from_value(value).map_err(err)?),
            ResourceKind::NetworkMap => {
                Self::NetworkMap(serde_json::from_value(value).map_err(err)?)
            }
            ResourceKind::StorageMap => {
                Self::StorageMap(serde_json::from_value(value).map_err(err)?)
            }
            ResourceKind::Plan => Self::Plan(serde_json::from_value(value).map_err(err)?),
            ResourceKind::Migration => Self::Migration(serde_json::from_value(value).map_err(err)?),
        })
    }

    /// Convert to a DynamicObject for the dynamic API
    pub fn to_dynamic(&self) -> Result<DynamicObject> {
        serde_json::from_value(self.to_json()?)
            .map_err(|e| Error::serialization_for_kind(self.kind().as_str(), e.to_string()))
    }

    /// Parse a DynamicObject returned by the API server
    pub fn from_dynamic(kind: ResourceKind, obj: DynamicObject) -> Result<Self> {
        let value = serde_json::to_value(&obj)
            .map_err(|e| Error::serialization_for_kind(kind.as_str(), e.to_string()))?;
        Self::from_json(kind, value)
    }
}

/// URL of the source platform API for `provider_type`.
///
/// A host that already carries a scheme is used as-is.
pub fn provider_url(provider_type: ProviderType, host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        return host.to_string();
    }
    match provider_type {
        ProviderType::Vsphere => format!("https://{}/sdk", host),
        ProviderType::Ovirt => format!("https://{}/ovirt-engine/api", host),
        _ => format!("https://{}", host),
    }
}

fn object_meta(request: &MigrationRequest, name: String) -> ObjectMeta {
    let labels = BTreeMap::from([
        (LABEL_NAME.to_string(), name.clone()),
        (LABEL_MANAGED_BY.to_string(), FIELD_MANAGER.to_string()),
        (LABEL_WORKFLOW.to_string(), request.name.clone()),
    ]);
    ObjectMeta {
        name: Some(name),
        namespace: Some(request.namespace.clone()),
        labels: Some(labels),
        ..Default::default()
    }
}

fn provider_pair(request: &MigrationRequest) -> ProviderPair {
    ProviderPair {
        source: ResourceRef::new(request.source_provider_name(), &request.namespace),
        destination: ResourceRef::new(request.destination_provider_name(), &request.namespace),
    }
}

/// Render the object for `stage`.
///
/// Fails with a validation error if the request is incomplete or a derived
/// name is not acceptable to the API server.
pub fn build(stage: StageKind, request: &MigrationRequest) -> Result<WorkflowObject> {
    request.validate()?;
    let name = stage.object_name(request);
    validate_resource_name(&name).map_err(|msg| {
        Error::validation_for_field(
            object_ref(stage.resource_kind().as_str(), &request.namespace, &name),
            "metadata.name",
            msg,
        )
    })?;
    let metadata = object_meta(request, name);

    let obj = match stage {
        StageKind::SourceProvider => {
            let source = &request.source;
            let mut settings = BTreeMap::new();
            if let Some(endpoint) = &source.sdk_endpoint {
                settings.insert("sdkEndpoint".to_string(), endpoint.clone());
            }
            if let Some(image) = &source.vddk_init_image {
                settings.insert("vddkInitImage".to_string(), image.clone());
            }
            let mut provider = Provider {
                metadata,
                spec: ProviderSpec {
                    provider_type: source.provider_type,
                    url: Some(provider_url(source.provider_type, &source.host)),
                    secret: Some(ResourceRef::new(request.secret_name(), &request.namespace)),
                    settings,
                },
                status: None,
            };
            let annotations = provider.annotations_mut();
            if let Some(dc) = &source.datacenter {
                annotations.insert(ANNOTATION_DATACENTER.to_string(), dc.clone());
            }
            if let Some(cluster) = &source.cluster {
                annotations.insert(ANNOTATION_CLUSTER.to_string(), cluster.clone());
            }
            WorkflowObject::Provider(provider)
        }
        StageKind::DestinationProvider => {
            let dest = &request.destination;
            WorkflowObject::Provider(Provider {
                metadata,
                spec: ProviderSpec {
                    provider_type: ProviderType::Openshift,
                    url: dest.url.clone(),
                    secret: dest
                        .secret
                        .as_ref()
                        .map(|s| ResourceRef::new(s, &request.namespace)),
                    settings: BTreeMap::new(),
                },
                status: None,
            })
        }
        StageKind::NetworkMap => WorkflowObject::NetworkMap(NetworkMap {
            metadata,
            spec: NetworkMapSpec {
                provider: provider_pair(request),
                map: request
                    .networks
                    .iter()
                    .map(|n| NetworkPair {
                        source: n.source.clone(),
                        destination: NetworkDestination {
                            network_type: n.network_type,
                            name: n.name.clone(),
                            namespace: n.namespace.clone(),
                        },
                    })
                    .collect(),
            },
            status: None,
        }),
        StageKind::StorageMap => WorkflowObject::StorageMap(StorageMap {
            metadata,
            spec: StorageMapSpec {
                provider: provider_pair(request),
                map: request
                    .storage
                    .iter()
                    .map(|s| StoragePair {
                        source: s.source.clone(),
                        destination: StorageDestination {
                            storage_class: s.storage_class.clone(),
                            access_mode: s.access_mode.clone(),
                            volume_mode: s.volume_mode.clone(),
                        },
                    })
                    .collect(),
            },
            status: None,
        }),
        StageKind::Plan => WorkflowObject::Plan(Plan {
            metadata,
            spec: PlanSpec {
                description: request.description.clone(),
                provider: provider_pair(request),
                target_namespace: request.target_namespace.clone(),
                map: PlanMaps {
                    network: ResourceRef::new(request.network_map_name(), &request.namespace),
                    storage: ResourceRef::new(request.storage_map_name(), &request.namespace),
                },
                vms: request.vms.clone(),
                warm: request.warm,
            },
            status: None,
        }),
        StageKind::Migration => WorkflowObject::Migration(Migration {
            metadata,
            spec: MigrationSpec {
                plan: ResourceRef::new(request.plan_name(), &request.namespace),
            },
            status: None,
        }),
    };
    Ok(obj)
}

/// Render the credential secret for the source provider.
///
/// String fields `user` and `password`, plus `insecureSkipVerify` and
/// `thumbprint` when set.
pub fn build_credentials_secret(request: &MigrationRequest) -> Result<Secret> {
    request.validate()?;
    let source = &request.source;

    let mut data = BTreeMap::from([
        ("user".to_string(), source.credentials.username.clone()),
        ("password".to_string(), source.credentials.password.clone()),
    ]);
    if source.insecure_skip_verify {
        data.insert("insecureSkipVerify".to_string(), "true".to_string());
    }
    if let Some(thumbprint) = &source.thumbprint {
        data.insert("thumbprint".to_string(), thumbprint.clone());
    }

    let mut metadata = object_meta(request, request.secret_name());
    if let Some(labels) = metadata.labels.as_mut() {
        labels.insert(
            LABEL_CREATED_FOR_PROVIDER_TYPE.to_string(),
            source.provider_type.as_str().to_string(),
        );
    }

    Ok(Secret {
        metadata,
        type_: Some("Opaque".to_string()),
        string_data: Some(data),
        ..Default::default()
    })
}

/// Render the secret and every stage object as multi-document YAML.
///
/// The secret's password is left out so the output is safe to print.
pub fn render_manifests(request: &MigrationRequest) -> Result<String> {
    let mut secret = build_credentials_secret(request)?;
    if let Some(data) = secret.string_data.as_mut() {
        data.remove("password");
    }

    let mut docs = Vec::with_capacity(StageKind::ALL.len() + 1);
    docs.push(to_yaml("Secret", &secret)?);
    for stage in StageKind::ALL {
        let obj = build(stage, request)?;
        docs.push(to_yaml(obj.kind().as_str(), &obj.to_json()?)?);
    }
    Ok(docs.join("---\n"))
}

fn to_yaml<T: Serialize>(kind: &str, value: &T) -> Result<String> {
    serde_yaml::to_string(value).map_err(|e| Error::serialization_for_kind(kind, e.to_string()))
}
