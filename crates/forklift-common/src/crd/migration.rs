//! Migration CRD: triggers execution of a Plan

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ObservedPhase, ResourceRef, ResourceStatus};

/// Migration starts the execution of the referenced plan.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "forklift.konveyor.io",
    version = "v1beta1",
    kind = "Migration",
    namespaced,
    status = "ResourceStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSpec {
    /// Plan to execute
    pub plan: ResourceRef,
}

impl Migration {
    /// Reduce the migration's status conditions to an [`ObservedPhase`]
    pub fn observed_phase(&self) -> ObservedPhase {
        let Some(status) = self.status.as_ref() else {
            return ObservedPhase::Pending;
        };
        if status.is_true("Failed") || status.is_true("Canceled") || status.critical().is_some() {
            ObservedPhase::Failed
        } else if status.is_true("Succeeded") {
            ObservedPhase::Succeeded
        } else if status.is_true("Running") || status.is_true("Executing") {
            ObservedPhase::Running
        } else {
            ObservedPhase::Pending
        }
    }

    /// Message describing why the migration failed, if it did
    pub fn failure_reason(&self) -> Option<String> {
        let status = self.status.as_ref()?;
        status
            .critical()
            .or_else(|| status.true_condition("Failed"))
            .or_else(|| status.true_condition("Canceled"))
            .map(|c| c.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::types::{Condition, ConditionStatus};

    fn migration(conditions: &[(&str, ConditionStatus)]) -> Migration {
        let mut m = Migration::new(
            "demo-migration",
            MigrationSpec {
                plan: ResourceRef::new("demo-plan", "openshift-mtv"),
            },
        );
        if !conditions.is_empty() {
            let mut status = ResourceStatus::default();
            for (t, s) in conditions {
                status.set_condition(Condition::new(*t, *s).with_message(format!("{} set", t)));
            }
            m.status = Some(status);
        }
        m
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(migration(&[])).expect("serialize");
        assert_eq!(json["kind"], "Migration");
        assert_eq!(json["spec"]["plan"]["name"], "demo-plan");
    }

    #[test]
    fn test_phases() {
        assert_eq!(migration(&[]).observed_phase(), ObservedPhase::Pending);
        assert_eq!(
            migration(&[("Running", ConditionStatus::True)]).observed_phase(),
            ObservedPhase::Running
        );
        assert_eq!(
            migration(&[("Succeeded", ConditionStatus::True)]).observed_phase(),
            ObservedPhase::Succeeded
        );
        assert_eq!(
            migration(&[("Failed", ConditionStatus::False), ("Running", ConditionStatus::True)])
                .observed_phase(),
            ObservedPhase::Running
        );
    }

    #[test]
    fn test_canceled_counts_as_failure() {
        let m = migration(&[("Canceled", ConditionStatus::True)]);
        assert_eq!(m.observed_phase(), ObservedPhase::Failed);
        assert_eq!(m.failure_reason().as_deref(), Some("Canceled set"));
    }
}
