//! Shared Kubernetes utilities using kube-rs
//!
//! Naming validation, `ApiResource` construction for the Forklift kinds,
//! spec comparison for idempotent re-runs, and client construction.

use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use serde_json::Value;

use crate::Error;

/// Maximum length of a Kubernetes object name (DNS-1123 subdomain)
pub const MAX_NAME_LENGTH: usize = 253;

/// Maximum length of a namespace name (DNS-1123 label)
pub const MAX_NAMESPACE_LENGTH: usize = 63;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Check that `name` is acceptable as an object name.
///
/// Allowed: lowercase ASCII letters, digits and `-`, starting and ending
/// with an alphanumeric character, at most 253 characters.
pub fn validate_resource_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(format!(
            "name '{}...' is {} characters, exceeds {}",
            name.chars().take(32).collect::<String>(),
            name.len(),
            MAX_NAME_LENGTH
        ));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(format!(
            "name '{}' contains invalid character '{}' (allowed: a-z, 0-9, '-')",
            name, c
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(format!(
            "name '{}' must start and end with an alphanumeric character",
            name
        ));
    }
    Ok(())
}

/// Check that `name` is acceptable as a namespace: an object name of at
/// most 63 characters.
pub fn validate_namespace_name(name: &str) -> Result<(), String> {
    validate_resource_name(name)?;
    if name.len() > MAX_NAMESPACE_LENGTH {
        return Err(format!(
            "namespace '{}...' is {} characters, exceeds {}",
            name.chars().take(32).collect::<String>(),
            name.len(),
            MAX_NAMESPACE_LENGTH
        ));
    }
    Ok(())
}

/// Format the canonical `Kind/namespace/name` identifier used in errors and logs
pub fn object_ref(kind: &str, namespace: &str, name: &str) -> String {
    format!("{}/{}/{}", kind, namespace, name)
}

/// Build an ApiResource from a known apiVersion and kind.
///
/// # Example
/// ```
/// use forklift_common::kube_utils::build_api_resource;
///
/// let ar = build_api_resource("forklift.konveyor.io/v1beta1", "StorageMap");
/// assert_eq!(ar.plural, "storagemaps");
/// assert_eq!(ar.group, "forklift.konveyor.io");
/// ```
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Parse apiVersion into (group, version)
///
/// # Examples
/// ```
/// use forklift_common::kube_utils::parse_api_version;
///
/// let (group, version) = parse_api_version("forklift.konveyor.io/v1beta1");
/// assert_eq!(group, "forklift.konveyor.io");
/// assert_eq!(version, "v1beta1");
///
/// let (group, version) = parse_api_version("v1");
/// assert_eq!(group, "");
/// assert_eq!(version, "v1");
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Pluralize a Kubernetes resource kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Whether `observed` contains every field of `desired` with an equal value.
///
/// Objects are compared key by key (extra keys in `observed` are allowed,
/// since the API server and controllers add defaults); arrays must have the
/// same length and match element-wise; scalars must be equal. A `null` in
/// `desired` matches a missing key.
pub fn json_contains(observed: &Value, desired: &Value) -> bool {
    match (observed, desired) {
        (Value::Object(obs), Value::Object(want)) => want.iter().all(|(k, v)| match obs.get(k) {
            Some(o) => json_contains(o, v),
            None => v.is_null(),
        }),
        (Value::Array(obs), Value::Array(want)) => {
            obs.len() == want.len() && obs.iter().zip(want).all(|(o, w)| json_contains(o, w))
        }
        (o, w) => o == w,
    }
}

/// Whether `observed` and `desired` describe the same spec.
///
/// Both directions must hold under [`json_contains`], so a field dropped from
/// `desired` is a difference. The one exception is `server_defaulted`: dotted
/// paths (`*` steps into every array element) that the server may fill in.
/// Such a field is ignored only where `desired` leaves it unset.
///
/// ```
/// use forklift_common::kube_utils::json_matches;
/// use serde_json::json;
///
/// let observed = json!({"vms": [{"id": "vm-1", "name": "db"}]});
/// assert!(json_matches(&observed, &json!({"vms": [{"name": "db"}]}), &["vms.*.id"]));
/// assert!(!json_matches(&observed, &json!({"vms": [{"id": "vm-1"}]}), &["vms.*.id"]));
/// ```
pub fn json_matches(observed: &Value, desired: &Value, server_defaulted: &[&str]) -> bool {
    let mut observed = observed.clone();
    for path in server_defaulted {
        let steps: Vec<&str> = path.split('.').collect();
        strip_unset(&mut observed, desired, &steps);
    }
    json_contains(&observed, desired) && json_contains(desired, &observed)
}

/// Remove the field at `path` from `observed` wherever `desired` leaves it unset
fn strip_unset(observed: &mut Value, desired: &Value, path: &[&str]) {
    let Some((step, rest)) = path.split_first() else {
        return;
    };
    match (observed, desired) {
        (Value::Array(obs), Value::Array(want)) if *step == "*" => {
            for (o, w) in obs.iter_mut().zip(want) {
                strip_unset(o, w, rest);
            }
        }
        (Value::Object(obs), Value::Object(want)) => {
            let wanted = want.get(*step).filter(|v| !v.is_null());
            if rest.is_empty() {
                if wanted.is_none() {
                    obs.remove(*step);
                }
            } else if let (Some(o), Some(w)) = (obs.get_mut(*step), wanted) {
                strip_unset(o, w, rest);
            }
        }
        _ => {}
    }
}

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}
