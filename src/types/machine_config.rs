// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::rendered;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

/// A named, immutable configuration fragment for a machine.
///
/// Fragments are authored by operators. The controller merges all fragments
/// selected by a pool into a single rendered `MachineConfig`, which it owns.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfig",
    shortname = "mc"
)]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigSpec {
    /// Remote location of the OS image for the machine
    #[serde(rename = "osImageURL", default)]
    pub os_image_url: String,
    #[serde(default)]
    pub config: IgnitionConfig,
    #[serde(default)]
    pub kernel_arguments: Vec<String>,
    #[serde(default)]
    pub fips: bool,
}

impl MachineConfig {
    /// Check if this config was produced by the renderer rather than authored
    pub fn is_rendered(&self) -> bool {
        let owned_by_pool = self
            .owner_references()
            .iter()
            .any(|o| o.kind == "MachineConfigPool");
        owned_by_pool || self.name_any().starts_with(rendered::NAME_PREFIX)
    }

    /// Name of the pool owning this rendered config, if any
    pub fn owning_pool(&self) -> Option<&str> {
        self.owner_references()
            .iter()
            .find(|o| o.kind == "MachineConfigPool")
            .map(|o| o.name.as_str())
    }
}

/// Declarative file and unit specification applied by the node agent.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct IgnitionConfig {
    #[serde(default)]
    pub ignition: IgnitionMeta,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub systemd: Systemd,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct IgnitionMeta {
    #[serde(default)]
    pub version: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct Storage {
    #[serde(default)]
    pub files: Vec<File>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct Systemd {
    #[serde(default)]
    pub units: Vec<Unit>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct File {
    pub path: String,
    #[serde(default)]
    pub contents: FileContents,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct FileContents {
    /// Data URL (or remote URL) holding the file body
    #[serde(default)]
    pub source: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct Unit {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropins: Vec<Dropin>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct Dropin {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
}

impl File {
    pub fn new(path: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: FileContents {
                source: source.into(),
            },
            mode: Some(0o644),
            overwrite: Some(true),
            filesystem: Some("root".to_string()),
        }
    }
}
