// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::types::condition::Condition;
use crate::types::preserve_unknown_fields;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::ByteString;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cluster-wide parameters consumed by the renderer.
///
/// Owned by the installer; the controller only reads it.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "ControllerConfig"
)]
#[kube(status = "ControllerConfigStatus")]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfigSpec {
    #[serde(rename = "clusterDNSIP", default)]
    pub cluster_dns_ip: String,
    #[serde(default)]
    pub cloud_provider_config: String,
    /// e.g. "libvirt", "openstack", "gcp", "baremetal", "aws" or "none"
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub etcd_discovery_domain: String,
    #[serde(rename = "etcdCAData", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub etcd_ca_data: Option<ByteString>,
    #[serde(rename = "etcdMetricCAData", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub etcd_metric_ca_data: Option<ByteString>,
    #[serde(rename = "rootCAData", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub root_ca_data: Option<ByteString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_secret: Option<ObjectReference>,
    #[serde(default)]
    pub images: BTreeMap<String, String>,
    /// Default OS image used when no fragment sets one
    #[serde(rename = "osImageURL", default)]
    pub os_image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub infra: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxyStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfigStatus {
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub conditions: Vec<Condition<ControllerConfigConditionType>>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum ControllerConfigConditionType {
    TemplateControllerRunning,
    TemplateControllerCompleted,
    TemplateControllerFailing,
}
