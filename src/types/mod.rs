// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resources of the `machineconfiguration.openshift.io/v1` API group.

pub mod condition;
pub mod container_runtime_config;
pub mod controller_config;
pub mod kubelet_config;
pub mod machine_config;
pub mod pool;

pub use condition::{Condition, ConditionStatus};
pub use container_runtime_config::{
    ContainerRuntimeConfig, ContainerRuntimeConfigSpec, ContainerRuntimeConfigStatus,
    ContainerRuntimeConfiguration,
};
pub use controller_config::{ControllerConfig, ControllerConfigSpec};
pub use kubelet_config::{KubeletConfig, KubeletConfigSpec, KubeletConfigStatus};
pub use machine_config::{IgnitionConfig, MachineConfig, MachineConfigSpec};
pub use pool::{
    MachineConfigPool, MachineConfigPoolSpec, MachineConfigPoolStatus, PoolConditionType,
    PoolConfiguration,
};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of validating and applying an overlay (KubeletConfig or ContainerRuntimeConfig)
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum OverlayConditionType {
    Success,
    Failure,
}

impl fmt::Display for OverlayConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::Failure => write!(f, "Failure"),
        }
    }
}

/// Schema for free-form objects the API server must store untouched
pub(crate) fn preserve_unknown_fields(_: &mut schemars::gen::SchemaGenerator) -> Schema {
    Schema::Object(SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        extensions: [(
            "x-kubernetes-preserve-unknown-fields".to_string(),
            serde_json::Value::Bool(true),
        )]
        .into_iter()
        .collect(),
        ..Default::default()
    })
}

/// All CustomResourceDefinitions served by this controller
pub fn crds() -> Vec<CustomResourceDefinition> {
    vec![
        MachineConfig::crd(),
        MachineConfigPool::crd(),
        ControllerConfig::crd(),
        KubeletConfig::crd(),
        ContainerRuntimeConfig::crd(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crds_are_cluster_scoped_in_api_group() {
        for crd in crds() {
            assert_eq!(crd.spec.group, "machineconfiguration.openshift.io");
            assert_eq!(crd.spec.scope, "Cluster");
        }
    }

    #[test]
    fn test_crd_names() {
        let names: Vec<String> = crds().into_iter().map(|c| c.spec.names.kind).collect();
        assert_eq!(
            names,
            vec![
                "MachineConfig",
                "MachineConfigPool",
                "ControllerConfig",
                "KubeletConfig",
                "ContainerRuntimeConfig"
            ]
        );
    }
}
