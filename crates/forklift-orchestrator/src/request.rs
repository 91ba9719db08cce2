//! Migration request: the single input of a workflow
//!
//! Every parameter the workflow needs lives here; nothing is baked into the
//! orchestration logic. Requests are deserialized from YAML or JSON with
//! camelCase keys and are immutable once submitted.

use serde::{Deserialize, Serialize};

use forklift_common::crd::{NetworkType, ProviderType, SourceRef};
use forklift_common::kube_utils::{validate_namespace_name, validate_resource_name};
use forklift_common::{Error, Result, DEFAULT_DESTINATION_PROVIDER, DEFAULT_FORKLIFT_NAMESPACE};

/// A VM to migrate, by inventory id and/or name
pub type VmRef = SourceRef;

/// Everything needed to migrate a set of VMs into the cluster.
///
/// ```yaml
/// name: demo
/// namespace: openshift-mtv
/// source:
///   name: vmware-demo
///   type: vsphere
///   host: vcenter.example.com
///   datacenter: dc1
///   credentials:
///     username: administrator@vsphere.local
/// targetNamespace: vms
/// vms:
///   - id: vm-12345
/// networks:
///   - source: { id: network-11 }
///     type: pod
/// storage:
///   - source: { id: datastore-1 }
///     storageClass: standard
/// ```
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRequest {
    /// Workflow name; object names are derived from it
    pub name: String,

    /// Namespace the Forklift objects are created in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Source platform connection
    pub source: SourcePlatform,

    /// Destination provider (the local cluster by default)
    #[serde(default)]
    pub destination: DestinationProvider,

    /// Namespace the migrated VMs land in
    pub target_namespace: String,

    /// VMs to migrate
    pub vms: Vec<VmRef>,

    /// Source network mappings
    #[serde(default)]
    pub networks: Vec<NetworkMapping>,

    /// Source datastore mappings
    #[serde(default)]
    pub storage: Vec<StorageMapping>,

    /// Warm migration
    #[serde(default)]
    pub warm: bool,

    /// Free-form plan description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_namespace() -> String {
    DEFAULT_FORKLIFT_NAMESPACE.to_string()
}

fn default_destination_name() -> String {
    DEFAULT_DESTINATION_PROVIDER.to_string()
}

/// Source platform connection descriptor
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourcePlatform {
    /// Provider name; also names the credential secret
    pub name: String,

    /// Platform type
    #[serde(rename = "type", default)]
    pub provider_type: ProviderType,

    /// Host name or full URL of the platform API
    pub host: String,

    /// Login credentials
    pub credentials: Credentials,

    /// Datacenter holding the VMs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,

    /// Compute cluster holding the VMs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,

    /// TLS certificate SHA-1 thumbprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbprint: Option<String>,

    /// Skip TLS verification
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// vSphere SDK endpoint (`vcenter` or `esxi`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_endpoint: Option<String>,

    /// VDDK init image for vSphere disk transfer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vddk_init_image: Option<String>,
}

/// Username and password for the source platform.
///
/// The password is never serialized back out and `Debug` redacts it.
#[derive(Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Credentials {
    /// Login name
    pub username: String,
    /// Password; may be left out of the file and supplied from the environment
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Destination provider
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationProvider {
    /// Provider name
    #[serde(default = "default_destination_name")]
    pub name: String,

    /// API URL of a remote cluster; empty means the local cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Secret holding the remote cluster token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl Default for DestinationProvider {
    fn default() -> Self {
        Self {
            name: default_destination_name(),
            url: None,
            secret: None,
        }
    }
}

/// Source network → destination network
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMapping {
    /// Source network
    pub source: SourceRef,
    /// Destination network type
    #[serde(rename = "type", default)]
    pub network_type: NetworkType,
    /// NetworkAttachmentDefinition name (multus)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// NetworkAttachmentDefinition namespace (multus)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Source datastore → storage class
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageMapping {
    /// Source datastore or storage domain
    pub source: SourceRef,
    /// Destination storage class
    pub storage_class: String,
    /// PVC access mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<String>,
    /// PVC volume mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_mode: Option<String>,
}

impl MigrationRequest {
    /// Name of the credential secret
    pub fn secret_name(&self) -> String {
        format!("{}-secret", self.source.name)
    }

    /// Name of the source Provider
    pub fn source_provider_name(&self) -> &str {
        &self.source.name
    }

    /// Name of the destination Provider
    pub fn destination_provider_name(&self) -> &str {
        &self.destination.name
    }

    /// Name of the NetworkMap
    pub fn network_map_name(&self) -> String {
        format!("{}-networkmap", self.name)
    }

    /// Name of the StorageMap
    pub fn storage_map_name(&self) -> String {
        format!("{}-storagemap", self.name)
    }

    /// Name of the Plan
    pub fn plan_name(&self) -> String {
        format!("{}-plan", self.name)
    }

    /// Name of the Migration
    pub fn migration_name(&self) -> String {
        format!("{}-migration", self.name)
    }

    fn object(&self) -> String {
        format!("MigrationRequest/{}", self.name)
    }

    fn invalid(&self, field: &str, msg: impl Into<String>) -> Error {
        Error::validation_for_field(self.object(), field, msg)
    }

    /// Validate the request.
    ///
    /// Checks required fields and that every name this request derives is
    /// acceptable to the API server.
    pub fn validate(&self) -> Result<()> {
        for (field, namespace) in [
            ("namespace", &self.namespace),
            ("targetNamespace", &self.target_namespace),
        ] {
            validate_namespace_name(namespace).map_err(|msg| self.invalid(field, msg))?;
        }
        let names = [
            ("name", self.name.clone()),
            ("source.name", self.source.name.clone()),
            ("destination.name", self.destination.name.clone()),
            ("source.name", self.secret_name()),
            ("name", self.network_map_name()),
            ("name", self.storage_map_name()),
            ("name", self.plan_name()),
            ("name", self.migration_name()),
        ];
        for (field, name) in &names {
            validate_resource_name(name).map_err(|msg| self.invalid(field, msg))?;
        }

        if self.source.name == self.destination.name {
            return Err(self.invalid(
                "destination.name",
                format!(
                    "source and destination providers are both named '{}'",
                    self.source.name
                ),
            ));
        }
        if self.source.host.trim().is_empty() {
            return Err(self.invalid("source.host", "host must not be empty"));
        }
        if self.source.credentials.username.is_empty() {
            return Err(self.invalid("source.credentials.username", "username must not be empty"));
        }
        if self.source.credentials.password.is_empty() {
            return Err(self.invalid("source.credentials.password", "password must not be empty"));
        }
        if self.destination.secret.is_some() && self.destination.url.is_none() {
            return Err(self.invalid(
                "destination.secret",
                "a destination secret requires a destination url",
            ));
        }
        if let Some(secret) = &self.destination.secret {
            validate_resource_name(secret).map_err(|msg| self.invalid("destination.secret", msg))?;
        }

        if self.vms.is_empty() {
            return Err(self.invalid("vms", "at least one VM is required"));
        }
        if let Some(i) = self.vms.iter().position(SourceRef::is_empty) {
            return Err(self.invalid(&format!("vms[{}]", i), "VM needs an id or a name"));
        }

        for (i, net) in self.networks.iter().enumerate() {
            if net.source.is_empty() {
                return Err(self.invalid(
                    &format!("networks[{}].source", i),
                    "source network needs an id or a name",
                ));
            }
            if net.network_type == NetworkType::Multus
                && net.name.as_deref().map_or(true, str::is_empty)
            {
                return Err(self.invalid(
                    &format!("networks[{}].name", i),
                    "multus mapping needs a network attachment name",
                ));
            }
            if let Some(namespace) = &net.namespace {
                validate_namespace_name(namespace)
                    .map_err(|msg| self.invalid(&format!("networks[{}].namespace", i), msg))?;
            }
        }

        if self.storage.is_empty() {
            return Err(self.invalid("storage", "at least one storage mapping is required"));
        }
        for (i, st) in self.storage.iter().enumerate() {
            if st.source.is_empty() {
                return Err(self.invalid(
                    &format!("storage[{}].source", i),
                    "source datastore needs an id or a name",
                ));
            }
            if st.storage_class.is_empty() {
                return Err(self.invalid(
                    &format!("storage[{}].storageClass", i),
                    "storage class must not be empty",
                ));
            }
        }
        Ok(())
    }
}
