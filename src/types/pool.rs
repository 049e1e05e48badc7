// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::types::condition::Condition;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named group of machines sharing one rendered configuration and rollout policy.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfigPool",
    shortname = "mcp"
)]
#[kube(status = "MachineConfigPoolStatus")]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolSpec {
    /// Label selector over MachineConfig fragments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_config_selector: Option<LabelSelector>,
    /// Label selector over Nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<LabelSelector>,
    /// Suppresses admission of members while set
    #[serde(default)]
    pub paused: bool,
    /// Absolute count or percentage of members allowed to be unavailable at once (default 1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,
    /// Target rendered configuration the members move towards
    #[serde(default)]
    pub configuration: PoolConfiguration,
}

/// Reference to a rendered configuration plus the fragments it was produced from.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct PoolConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source: Vec<ObjectReference>,
}

impl PoolConfiguration {
    /// Names of the source objects, in stored order
    pub fn source_names(&self) -> Vec<&str> {
        self.source
            .iter()
            .filter_map(|r| r.name.as_deref())
            .collect()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolStatus {
    #[serde(default)]
    pub observed_generation: i64,
    /// Rendered configuration every member has converged to
    #[serde(default)]
    pub configuration: PoolConfiguration,
    #[serde(default)]
    pub machine_count: i32,
    #[serde(default)]
    pub updated_machine_count: i32,
    #[serde(default)]
    pub ready_machine_count: i32,
    #[serde(default)]
    pub unavailable_machine_count: i32,
    #[serde(default)]
    pub degraded_machine_count: i32,
    #[serde(default)]
    pub conditions: Vec<Condition<PoolConditionType>>,
}

/// Pool condition types. `Degraded` is true iff `NodeDegraded` or `RenderDegraded` is.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, schemars::JsonSchema)]
pub enum PoolConditionType {
    Updated,
    Updating,
    NodeDegraded,
    RenderDegraded,
    Degraded,
}

impl PoolConditionType {
    /// Order in which conditions are written to status
    pub const ALL: [PoolConditionType; 5] = [
        Self::Updated,
        Self::Updating,
        Self::NodeDegraded,
        Self::RenderDegraded,
        Self::Degraded,
    ];
}

impl fmt::Display for PoolConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Updated => "Updated",
            Self::Updating => "Updating",
            Self::NodeDegraded => "NodeDegraded",
            Self::RenderDegraded => "RenderDegraded",
            Self::Degraded => "Degraded",
        };
        write!(f, "{}", s)
    }
}

impl MachineConfigPool {
    /// Name of the rendered configuration members should move to
    pub fn target_config(&self) -> Option<&str> {
        self.spec.configuration.name.as_deref()
    }

    /// Name of the rendered configuration all members have converged to
    pub fn current_config(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.configuration.name.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn make_pool(target: Option<&str>, status: Option<MachineConfigPoolStatus>) -> MachineConfigPool {
        MachineConfigPool {
            metadata: ObjectMeta {
                name: Some("worker".to_string()),
                ..Default::default()
            },
            spec: MachineConfigPoolSpec {
                configuration: PoolConfiguration {
                    name: target.map(str::to_string),
                    source: vec![],
                },
                ..Default::default()
            },
            status,
        }
    }

    #[test]
    fn test_target_and_current_config() {
        let pool = make_pool(
            Some("rendered-worker-b"),
            Some(MachineConfigPoolStatus {
                configuration: PoolConfiguration {
                    name: Some("rendered-worker-a".to_string()),
                    source: vec![],
                },
                ..Default::default()
            }),
        );

        assert_eq!(pool.target_config(), Some("rendered-worker-b"));
        assert_eq!(pool.current_config(), Some("rendered-worker-a"));
    }

    #[test]
    fn test_unreconciled_pool_has_no_configs() {
        let pool = make_pool(None, None);
        assert_eq!(pool.target_config(), None);
        assert_eq!(pool.current_config(), None);
    }

    #[test]
    fn test_source_names() {
        let configuration = PoolConfiguration {
            name: Some("rendered-worker-a".to_string()),
            source: vec![
                ObjectReference {
                    name: Some("00-base".to_string()),
                    ..Default::default()
                },
                ObjectReference {
                    name: Some("99-ssh".to_string()),
                    ..Default::default()
                },
            ],
        };

        assert_eq!(configuration.source_names(), vec!["00-base", "99-ssh"]);
    }

    #[test]
    fn test_status_deserializes_camel_case_fields() {
        let status: MachineConfigPoolStatus = serde_json::from_value(serde_json::json!({
            "observedGeneration": 3,
            "configuration": {"name": "rendered-worker-a"},
            "machineCount": 5,
            "updatedMachineCount": 2,
            "readyMachineCount": 2,
            "unavailableMachineCount": 1,
            "degradedMachineCount": 0,
            "conditions": [{"type": "Updating", "status": "True", "lastTransitionTime": null, "reason": "", "message": ""}]
        }))
        .unwrap();

        assert_eq!(status.machine_count, 5);
        assert_eq!(status.conditions[0].condition_type, PoolConditionType::Updating);
        assert!(status.conditions[0].last_transition_time.is_none());
    }
}
