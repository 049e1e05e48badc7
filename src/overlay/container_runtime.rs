// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! ContainerRuntimeConfig payload validation and CRI-O drop-in generation.

use crate::constants::overlay_paths;
use crate::overlay::{check_pool_selector, quantity, OverlayError, OverlayFragment, OverlayKind};
use crate::render::dataurl;
use crate::types::machine_config::{File, IgnitionConfig, Storage};
use crate::types::{ContainerRuntimeConfig, ContainerRuntimeConfiguration, MachineConfigSpec};
use kube::ResourceExt;
use serde::Serialize;

const LOG_LEVELS: [&str; 6] = ["fatal", "panic", "error", "warn", "info", "debug"];
const MIN_PIDS_LIMIT: i64 = 20;
const MIN_LOG_SIZE_MAX: i64 = 8192;

/// Validated container runtime tunables. `None` leaves the runtime default alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeTunables {
    pub pids_limit: Option<i64>,
    pub log_level: Option<String>,
    pub log_size_max: Option<i64>,
    /// Overlay size as written by the user, e.g. "10G"
    pub overlay_size: Option<String>,
}

#[derive(Serialize)]
struct CrioDropin {
    crio: CrioSection,
}

#[derive(Serialize)]
struct CrioSection {
    runtime: CrioRuntime,
}

#[derive(Serialize)]
struct CrioRuntime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pids_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_size_max: Option<i64>,
}

#[derive(Serialize)]
struct StorageConf {
    storage: StorageSection,
}

#[derive(Serialize)]
struct StorageSection {
    driver: String,
    options: StorageOptions,
}

#[derive(Serialize)]
struct StorageOptions {
    overlay: OverlayOptions,
}

#[derive(Serialize)]
struct OverlayOptions {
    size: String,
}

/// Check the tunables against the runtime's accepted bounds.
pub fn validate(cfg: &ContainerRuntimeConfiguration) -> Result<RuntimeTunables, OverlayError> {
    let mut tunables = RuntimeTunables::default();

    if cfg.pids_limit != 0 {
        if cfg.pids_limit < MIN_PIDS_LIMIT {
            return Err(OverlayError::PidsLimitTooLow(cfg.pids_limit));
        }
        tunables.pids_limit = Some(cfg.pids_limit);
    }

    if !cfg.log_level.is_empty() {
        if !LOG_LEVELS.contains(&cfg.log_level.as_str()) {
            return Err(OverlayError::InvalidLogLevel(cfg.log_level.clone()));
        }
        tunables.log_level = Some(cfg.log_level.clone());
    }

    if let Some(q) = cfg.log_size_max.as_ref() {
        let bytes = quantity::to_i64(q)?;
        if bytes > 0 && bytes < MIN_LOG_SIZE_MAX {
            return Err(OverlayError::LogSizeTooSmall(q.0.clone()));
        }
        if bytes != 0 {
            tunables.log_size_max = Some(bytes);
        }
    }

    if let Some(q) = cfg.overlay_size.as_ref() {
        let bytes = quantity::to_i64(q)?;
        if bytes < 0 {
            return Err(OverlayError::NegativeOverlaySize(q.0.clone()));
        }
        if bytes > 0 {
            tunables.overlay_size = Some(q.0.trim().to_string());
        }
    }

    Ok(tunables)
}

fn to_toml<T: Serialize>(value: &T) -> Result<String, OverlayError> {
    toml::to_string(value).map_err(|e| OverlayError::Encoding(e.to_string()))
}

/// Files implementing the tunables, named after the overlay.
pub fn render_files(name: &str, tunables: &RuntimeTunables) -> Result<Vec<File>, OverlayError> {
    let mut files = Vec::new();

    if tunables.pids_limit.is_some() || tunables.log_level.is_some() || tunables.log_size_max.is_some() {
        let dropin = CrioDropin {
            crio: CrioSection {
                runtime: CrioRuntime {
                    pids_limit: tunables.pids_limit,
                    log_level: tunables.log_level.clone(),
                    log_size_max: tunables.log_size_max,
                },
            },
        };
        let path = format!(
            "{}/{}{}",
            overlay_paths::CRIO_DROPIN_DIR,
            overlay_paths::CRIO_DROPIN_PREFIX,
            name
        );
        files.push(File::new(path, dataurl::encode(to_toml(&dropin)?.as_bytes())));
    }

    if let Some(size) = tunables.overlay_size.as_ref() {
        let storage = StorageConf {
            storage: StorageSection {
                driver: "overlay".to_string(),
                options: StorageOptions {
                    overlay: OverlayOptions { size: size.clone() },
                },
            },
        };
        files.push(File::new(
            overlay_paths::STORAGE_CONF,
            dataurl::encode(to_toml(&storage)?.as_bytes()),
        ));
    }

    Ok(files)
}

/// Turn a ContainerRuntimeConfig into a fragment writing runtime drop-ins.
pub fn resolve(cc: &ContainerRuntimeConfig) -> Result<OverlayFragment, OverlayError> {
    check_pool_selector(cc.spec.machine_config_pool_selector.as_ref())?;
    let Some(cfg) = cc.spec.container_runtime_config.as_ref() else {
        return Err(OverlayError::MissingPayload);
    };

    let name = cc.name_any();
    let tunables = validate(cfg)?;
    let files = render_files(&name, &tunables)?;

    Ok(OverlayFragment {
        name,
        kind: OverlayKind::ContainerRuntime,
        spec: MachineConfigSpec {
            config: IgnitionConfig {
                storage: Storage { files },
                ..Default::default()
            },
            ..Default::default()
        },
    })
}
