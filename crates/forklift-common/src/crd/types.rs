//! Shared types used across the Forklift CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition category the Forklift controllers use for blocking failures
pub const CATEGORY_CRITICAL: &str = "Critical";

/// Condition status values
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition as written by the Forklift controllers
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., Ready, Succeeded, ConnectionTestFailed)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Severity category (Critical, Error, Warn, Required, Advisory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(type_: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            type_: type_.into(),
            status,
            category: None,
            reason: None,
            message: None,
            last_transition_time: Some(Utc::now()),
        }
    }

    /// Set the category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Best human-readable description: message, then reason, then type
    pub fn describe(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.reason.clone())
            .unwrap_or_else(|| self.type_.clone())
    }
}

/// Status block shared by all Forklift resources.
///
/// Only the fields the orchestrator reads are modelled; everything else the
/// controllers write is ignored on deserialization.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    /// Coarse phase string (Providers report e.g. "Ready", "ConnectionFailed")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Generation most recently observed by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ResourceStatus {
    /// Find a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Find a condition by type, only if its status is True
    pub fn true_condition(&self, type_: &str) -> Option<&Condition> {
        self.condition(type_)
            .filter(|c| c.status == ConditionStatus::True)
    }

    /// Whether a condition of the given type has status True
    pub fn is_true(&self, type_: &str) -> bool {
        self.true_condition(type_).is_some()
    }

    /// First True condition in the Critical category, if any
    pub fn critical(&self) -> Option<&Condition> {
        self.conditions.iter().find(|c| {
            c.status == ConditionStatus::True && c.category.as_deref() == Some(CATEGORY_CRITICAL)
        })
    }

    /// Upsert a condition by type
    pub fn set_condition(&mut self, condition: Condition) {
        match self.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
    }
}

/// Reference to another namespaced object by name
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceRef {
    /// Object name
    pub name: String,
    /// Object namespace
    pub namespace: String,
}

impl ResourceRef {
    /// Create a new reference
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

/// Source/destination provider pair referenced by maps and plans
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ProviderPair {
    /// Source provider
    pub source: ResourceRef,
    /// Destination provider
    pub destination: ResourceRef,
}

/// Reference to an object in the source provider's inventory
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SourceRef {
    /// Inventory identifier (e.g., "vm-12345", "network-11")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Inventory name or path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SourceRef {
    /// Whether neither id nor name is set
    pub fn is_empty(&self) -> bool {
        self.id.as_deref().map_or(true, str::is_empty)
            && self.name.as_deref().map_or(true, str::is_empty)
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.id, &self.name) {
            (Some(id), _) => write!(f, "{}", id),
            (None, Some(name)) => write!(f, "{}", name),
            (None, None) => write!(f, "<empty>"),
        }
    }
}

/// Lifecycle phase reduced from a resource's status conditions.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum ObservedPhase {
    /// Not yet processed by its controller
    #[default]
    Pending,
    /// Validated and usable
    Ready,
    /// Executing (plans and migrations)
    Running,
    /// Finished successfully (plans and migrations)
    Succeeded,
    /// The controller reported a failure
    Failed,
}

impl std::fmt::Display for ObservedPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Ready => "Ready",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}
