// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Overlay resolvers.
//!
//! KubeletConfig and ContainerRuntimeConfig objects are pool-scoped partial
//! overrides. Each resolver validates its payload and turns it into an
//! [`OverlayFragment`]: a restricted fragment the renderer merges after all
//! MachineConfig fragments. An invalid overlay is reported on its own status
//! and left out of rendering; it never blocks other overlays or fragments.

pub mod container_runtime;
pub mod kubelet;
pub mod quantity;

use crate::constants::overlay_paths;
use crate::render::dataurl;
use crate::selector::{self, SelectorError};
use crate::types::machine_config::File;
use crate::types::{ContainerRuntimeConfig, KubeletConfig, MachineConfigPool, MachineConfigSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverlayError {
    #[error("spec.machineConfigPoolSelector is empty")]
    NoPoolSelector,

    #[error("invalid pool selector: {0}")]
    Selector(#[from] SelectorError),

    #[error("payload is missing")]
    MissingPayload,

    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("{0} is not allowed to be set")]
    ForbiddenField(String),

    #[error("{0} must be an integer")]
    NotAnInteger(String),

    #[error("{field} must not be negative, got {value}")]
    Negative { field: String, value: i64 },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("invalid pidsLimit {0}, cannot be less than 20")]
    PidsLimitTooLow(i64),

    #[error("invalid logLevel {0:?}, must be one of fatal, panic, error, warn, info or debug")]
    InvalidLogLevel(String),

    #[error("invalid logSizeMax {0:?}, cannot be less than 8K")]
    LogSizeTooSmall(String),

    #[error("invalid overlaySize {0:?}, cannot be less than 0")]
    NegativeOverlaySize(String),

    #[error("invalid quantity {0:?}")]
    InvalidQuantity(String),

    #[error("failed to encode payload: {0}")]
    Encoding(String),
}

/// Kind of overlay, which fixes the files it may write and how it merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OverlayKind {
    Kubelet,
    ContainerRuntime,
}

impl OverlayKind {
    /// Kind name used in source references
    pub fn resource_kind(&self) -> &'static str {
        match self {
            Self::Kubelet => "KubeletConfig",
            Self::ContainerRuntime => "ContainerRuntimeConfig",
        }
    }

    /// Check whether an overlay of this kind may write the given path
    pub fn allows_path(&self, path: &str) -> bool {
        match self {
            Self::Kubelet => path == overlay_paths::KUBELET_CONF,
            Self::ContainerRuntime => {
                path == overlay_paths::STORAGE_CONF
                    || path
                        .strip_prefix(overlay_paths::CRIO_DROPIN_DIR)
                        .and_then(|rest| rest.strip_prefix('/'))
                        .is_some_and(|file| {
                            file.starts_with(overlay_paths::CRIO_DROPIN_PREFIX) && !file.contains('/')
                        })
            }
        }
    }

    /// Merge an overlay file over whatever the fragments put at the same path.
    ///
    /// Kubelet settings are deep-merged into an existing kubelet config, which
    /// may be JSON or YAML; everything else replaces the file outright.
    pub fn merge_file(&self, base: Option<&File>, overlay: &File) -> Result<File, String> {
        match self {
            Self::ContainerRuntime => Ok(overlay.clone()),
            Self::Kubelet => {
                let settings = decode_object(&overlay.contents.source)
                    .ok_or_else(|| "kubelet settings are not a JSON object data URL".to_string())?;

                let merged = match base.and_then(|b| decode_object(&b.contents.source)) {
                    Some(mut existing) => {
                        deep_merge(&mut existing, settings);
                        existing
                    }
                    None => {
                        if base.is_some() {
                            debug!("Existing {} is not a config object, replacing it", overlay.path);
                        }
                        settings
                    }
                };

                let body = serde_json::to_vec(&serde_json::Value::Object(merged))
                    .map_err(|e| e.to_string())?;
                let mut file = base.cloned().unwrap_or_else(|| overlay.clone());
                file.contents.source = dataurl::encode(&body);
                Ok(file)
            }
        }
    }
}

/// Decode a data URL holding a JSON or YAML mapping.
fn decode_object(source: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let bytes = dataurl::decode(source)?;
    match serde_yaml::from_slice(&bytes).ok()? {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Recursively merge `patch` into `target`; objects merge key by key, anything else is replaced.
pub fn deep_merge(
    target: &mut serde_json::Map<String, serde_json::Value>,
    patch: serde_json::Map<String, serde_json::Value>,
) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// A validated overlay payload ready to be merged by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayFragment {
    pub name: String,
    pub kind: OverlayKind,
    pub spec: MachineConfigSpec,
}

/// Overlays resolved for one pool.
#[derive(Debug, Default)]
pub struct ResolvedOverlays {
    /// Valid overlays, ordered by kind then name
    pub fragments: Vec<OverlayFragment>,
    /// Overlays that select the pool but failed validation
    pub rejected: Vec<(String, OverlayError)>,
}

fn selects_pool(
    selector: Option<&LabelSelector>,
    pool: &MachineConfigPool,
) -> Result<bool, OverlayError> {
    Ok(selector::matches(selector, pool.labels())?)
}

/// Collect the overlays that apply to a pool, validating each one independently.
pub fn resolve_for_pool<'a>(
    pool: &MachineConfigPool,
    kubelet_configs: impl IntoIterator<Item = &'a KubeletConfig>,
    runtime_configs: impl IntoIterator<Item = &'a ContainerRuntimeConfig>,
) -> ResolvedOverlays {
    let mut resolved = ResolvedOverlays::default();

    for kc in kubelet_configs {
        match selects_pool(kc.spec.machine_config_pool_selector.as_ref(), pool) {
            Ok(true) => match kubelet::resolve(kc) {
                Ok(fragment) => resolved.fragments.push(fragment),
                Err(e) => resolved.rejected.push((kc.name_any(), e)),
            },
            Ok(false) => {}
            Err(e) => resolved.rejected.push((kc.name_any(), e)),
        }
    }

    for cc in runtime_configs {
        match selects_pool(cc.spec.machine_config_pool_selector.as_ref(), pool) {
            Ok(true) => match container_runtime::resolve(cc) {
                Ok(fragment) => resolved.fragments.push(fragment),
                Err(e) => resolved.rejected.push((cc.name_any(), e)),
            },
            Ok(false) => {}
            Err(e) => resolved.rejected.push((cc.name_any(), e)),
        }
    }

    resolved
        .fragments
        .sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));
    resolved.rejected.sort_by(|a, b| a.0.cmp(&b.0));
    resolved
}

/// Check that an overlay's pool selector is present and well formed
pub fn check_pool_selector(selector: Option<&LabelSelector>) -> Result<(), OverlayError> {
    let Some(selector) = selector else {
        return Err(OverlayError::NoPoolSelector);
    };
    match selector::Selector::parse(selector)? {
        Some(_) => Ok(()),
        None => Err(OverlayError::NoPoolSelector),
    }
}
