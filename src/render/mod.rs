// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Config renderer.
//!
//! Merges the MachineConfig fragments selected by a pool, followed by the
//! pool's overlays, into one canonical configuration. The result is a pure
//! function of its inputs: fragments are merged in name order, so the same
//! fragment set always renders to the same bytes and the same content hash.

pub mod dataurl;

use crate::constants::{rendered, API_GROUP, API_VERSION};
use crate::overlay::OverlayFragment;
use crate::types::machine_config::{File, IgnitionMeta, Storage, Systemd, Unit};
use crate::types::{ControllerConfigSpec, IgnitionConfig, MachineConfig, MachineConfigSpec};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::ResourceExt;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

const MAX_FILE_MODE: i32 = 0o7777;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("invalid MachineConfig {name}: {reason}")]
    InvalidFragment { name: String, reason: String },

    #[error("invalid overlay {name}: {reason}")]
    InvalidOverlay { name: String, reason: String },

    #[error("overlay {name} is not allowed to set {field}")]
    ScopeViolation { name: String, field: String },

    #[error("failed to encode rendered configuration: {0}")]
    Encoding(String),
}

/// Output of a successful render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedConfiguration {
    pub spec: MachineConfigSpec,
    /// Fragments followed by overlays, in merge order
    pub sources: Vec<ObjectReference>,
    /// Hex digest over the canonical JSON of `spec`
    pub hash: String,
}

impl RenderedConfiguration {
    /// Name under which this configuration is published for the given pool
    pub fn name_for(&self, pool: &str) -> String {
        format!("{}{}-{}", rendered::NAME_PREFIX, pool, self.hash)
    }
}

fn source_ref(kind: &str, name: &str) -> ObjectReference {
    ObjectReference {
        api_version: Some(format!("{}/{}", API_GROUP, API_VERSION)),
        kind: Some(kind.to_string()),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

/// Accumulates fragments in merge order.
#[derive(Default)]
struct Merged {
    os_image_url: String,
    files: BTreeMap<String, File>,
    units: BTreeMap<String, Unit>,
    kernel_arguments: Vec<String>,
    seen_arguments: BTreeSet<String>,
    fips: bool,
}

impl Merged {
    fn apply_fragment(&mut self, spec: &MachineConfigSpec) {
        if !spec.os_image_url.is_empty() {
            self.os_image_url = spec.os_image_url.clone();
        }
        for file in &spec.config.storage.files {
            self.files.insert(file.path.clone(), file.clone());
        }
        for unit in &spec.config.systemd.units {
            self.units.insert(unit.name.clone(), unit.clone());
        }
        for arg in &spec.kernel_arguments {
            if self.seen_arguments.insert(arg.clone()) {
                self.kernel_arguments.push(arg.clone());
            }
        }
        self.fips |= spec.fips;
    }

    fn apply_overlay(&mut self, overlay: &OverlayFragment) -> Result<(), RenderError> {
        check_scope(overlay)?;
        validate_spec(&overlay.spec).map_err(|reason| RenderError::InvalidOverlay {
            name: overlay.name.clone(),
            reason,
        })?;

        for file in &overlay.spec.config.storage.files {
            let merged = overlay
                .kind
                .merge_file(self.files.get(&file.path), file)
                .map_err(|reason| RenderError::InvalidOverlay {
                    name: overlay.name.clone(),
                    reason,
                })?;
            self.files.insert(file.path.clone(), merged);
        }
        Ok(())
    }

    fn finish(self, params: &ControllerConfigSpec) -> MachineConfigSpec {
        let os_image_url = if self.os_image_url.is_empty() {
            params.os_image_url.clone()
        } else {
            self.os_image_url
        };

        MachineConfigSpec {
            os_image_url,
            config: IgnitionConfig {
                ignition: IgnitionMeta {
                    version: rendered::IGNITION_VERSION.to_string(),
                },
                storage: Storage {
                    files: self.files.into_values().collect(),
                },
                systemd: Systemd {
                    units: self.units.into_values().collect(),
                },
            },
            kernel_arguments: self.kernel_arguments,
            fips: self.fips,
        }
    }
}

/// Overlays may only write the files their kind owns.
fn check_scope(overlay: &OverlayFragment) -> Result<(), RenderError> {
    let violation = |field: String| RenderError::ScopeViolation {
        name: overlay.name.clone(),
        field,
    };
    let spec = &overlay.spec;

    if !spec.os_image_url.is_empty() {
        return Err(violation("osImageURL".to_string()));
    }
    if !spec.kernel_arguments.is_empty() {
        return Err(violation("kernelArguments".to_string()));
    }
    if spec.fips {
        return Err(violation("fips".to_string()));
    }
    if !spec.config.systemd.units.is_empty() {
        return Err(violation("systemd.units".to_string()));
    }
    if let Some(file) = spec
        .config
        .storage
        .files
        .iter()
        .find(|f| !overlay.kind.allows_path(&f.path))
    {
        return Err(violation(format!("storage.files[{}]", file.path)));
    }
    Ok(())
}

fn validate_spec(spec: &MachineConfigSpec) -> Result<(), String> {
    let version = &spec.config.ignition.version;
    if !version.is_empty() && !version.starts_with("2.") {
        return Err(format!("unsupported ignition version {:?}", version));
    }

    let mut paths = BTreeSet::new();
    for file in &spec.config.storage.files {
        let path = &file.path;
        if !path.starts_with('/') || path.ends_with('/') {
            return Err(format!("file path {:?} must be an absolute file path", path));
        }
        if path.split('/').any(|c| c == "..") {
            return Err(format!("file path {:?} must not contain '..'", path));
        }
        if !paths.insert(path.as_str()) {
            return Err(format!("file path {:?} is listed more than once", path));
        }
        if let Some(mode) = file.mode {
            if !(0..=MAX_FILE_MODE).contains(&mode) {
                return Err(format!("file {:?} has invalid mode {:o}", path, mode));
            }
        }
    }

    let mut units = BTreeSet::new();
    for unit in &spec.config.systemd.units {
        let name = &unit.name;
        if name.is_empty() || !name.contains('.') || name.contains('/') {
            return Err(format!("invalid unit name {:?}", name));
        }
        if !units.insert(name.as_str()) {
            return Err(format!("unit {:?} is listed more than once", name));
        }
    }

    if spec.kernel_arguments.iter().any(|a| a.trim().is_empty()) {
        return Err("kernel arguments must not be empty".to_string());
    }
    Ok(())
}

/// Hex encoded truncated SHA-256 of the canonical JSON form of `spec`.
pub fn content_hash(spec: &MachineConfigSpec) -> Result<String, RenderError> {
    let bytes = serde_json::to_vec(spec).map_err(|e| RenderError::Encoding(e.to_string()))?;
    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(&digest[..rendered::HASH_BYTES]))
}

/// Merge fragments and overlays into one rendered configuration.
///
/// Fragments are applied in name order: files and units are keyed by path and
/// name with the last writer winning, kernel arguments are concatenated
/// without duplicates, the last non-empty OS image wins (falling back to the
/// cluster default) and fips is enabled if any fragment enables it. Overlays
/// are applied afterwards and may only touch the files their kind owns.
///
/// Any invalid input fails the whole render; nothing partial is returned.
pub fn render<'a>(
    fragments: impl IntoIterator<Item = &'a MachineConfig>,
    overlays: &[OverlayFragment],
    params: &ControllerConfigSpec,
) -> Result<RenderedConfiguration, RenderError> {
    let mut fragments: Vec<&MachineConfig> = fragments.into_iter().collect();
    fragments.sort_by_key(|mc| mc.name_any());

    let mut overlays: Vec<&OverlayFragment> = overlays.iter().collect();
    overlays.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));

    let mut merged = Merged::default();
    let mut sources = Vec::with_capacity(fragments.len() + overlays.len());

    for mc in &fragments {
        let name = mc.name_any();
        validate_spec(&mc.spec).map_err(|reason| RenderError::InvalidFragment {
            name: name.clone(),
            reason,
        })?;
        merged.apply_fragment(&mc.spec);
        sources.push(source_ref("MachineConfig", &name));
    }

    for overlay in &overlays {
        merged.apply_overlay(overlay)?;
        sources.push(source_ref(overlay.kind.resource_kind(), &overlay.name));
    }

    let spec = merged.finish(params);
    let hash = content_hash(&spec)?;
    Ok(RenderedConfiguration { spec, sources, hash })
}
