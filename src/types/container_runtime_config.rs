// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::types::condition::Condition;
use crate::types::OverlayConditionType;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Pool-scoped container runtime tunables overlaid on the rendered configuration.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "ContainerRuntimeConfig",
    shortname = "ctrcfg"
)]
#[kube(status = "ContainerRuntimeConfigStatus")]
#[serde(rename_all = "camelCase")]
pub struct ContainerRuntimeConfigSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_config_pool_selector: Option<LabelSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_runtime_config: Option<ContainerRuntimeConfiguration>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRuntimeConfiguration {
    /// Maximum number of processes allowed in a container
    #[serde(default, skip_serializing_if = "is_zero")]
    pub pids_limit: i64,
    /// One of fatal, panic, error, warn, info or debug
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_level: String,
    /// Maximum container log size; negative means unlimited, otherwise at least 8K
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_size_max: Option<Quantity>,
    /// Maximum size of a container image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_size: Option<Quantity>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRuntimeConfigStatus {
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub conditions: Vec<Condition<OverlayConditionType>>,
}
