// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! KubeletConfig payload validation.

use crate::constants::overlay_paths;
use crate::overlay::{check_pool_selector, OverlayError, OverlayFragment, OverlayKind};
use crate::render::dataurl;
use crate::types::machine_config::{File, IgnitionConfig, Storage};
use crate::types::{KubeletConfig, MachineConfigSpec};
use kube::ResourceExt;
use serde_json::{Map, Value};

/// Settings the controller owns on every node; overlays may not change them
const FORBIDDEN_FIELDS: [&str; 5] = [
    "cgroupDriver",
    "clusterDNS",
    "clusterDomain",
    "runtimeRequestTimeout",
    "staticPodPath",
];

const NON_NEGATIVE_FIELDS: [&str; 5] = [
    "maxPods",
    "podsPerCore",
    "kubeAPIQPS",
    "kubeAPIBurst",
    "podPidsLimit",
];

const PERCENT_FIELDS: [&str; 2] = [
    "imageGCHighThresholdPercent",
    "imageGCLowThresholdPercent",
];

/// Validate the raw kubelet payload and return it as a JSON object.
pub fn validate(kc: &KubeletConfig) -> Result<Map<String, Value>, OverlayError> {
    check_pool_selector(kc.spec.machine_config_pool_selector.as_ref())?;

    let Some(raw) = kc.spec.kubelet_config.as_ref() else {
        return Err(OverlayError::MissingPayload);
    };
    let Value::Object(settings) = &raw.0 else {
        return Err(OverlayError::NotAnObject);
    };

    if let Some(field) = FORBIDDEN_FIELDS.iter().find(|f| settings.contains_key(**f)) {
        return Err(OverlayError::ForbiddenField(field.to_string()));
    }

    for field in NON_NEGATIVE_FIELDS {
        if let Some(value) = integer_field(settings, field)? {
            if value < 0 {
                return Err(OverlayError::Negative {
                    field: field.to_string(),
                    value,
                });
            }
        }
    }

    for field in PERCENT_FIELDS {
        if let Some(value) = integer_field(settings, field)? {
            if !(0..=100).contains(&value) {
                return Err(OverlayError::OutOfRange {
                    field: field.to_string(),
                    value,
                    min: 0,
                    max: 100,
                });
            }
        }
    }

    if let (Some(high), Some(low)) = (
        integer_field(settings, PERCENT_FIELDS[0])?,
        integer_field(settings, PERCENT_FIELDS[1])?,
    ) {
        if low > high {
            return Err(OverlayError::OutOfRange {
                field: PERCENT_FIELDS[1].to_string(),
                value: low,
                min: 0,
                max: high,
            });
        }
    }

    Ok(settings.clone())
}

fn integer_field(settings: &Map<String, Value>, field: &str) -> Result<Option<i64>, OverlayError> {
    match settings.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| OverlayError::NotAnInteger(field.to_string())),
    }
}

/// Turn a KubeletConfig into a fragment writing the kubelet configuration file.
pub fn resolve(kc: &KubeletConfig) -> Result<OverlayFragment, OverlayError> {
    let settings = validate(kc)?;
    let body = serde_json::to_vec(&Value::Object(settings))
        .map_err(|e| OverlayError::Encoding(e.to_string()))?;

    Ok(OverlayFragment {
        name: kc.name_any(),
        kind: OverlayKind::Kubelet,
        spec: MachineConfigSpec {
            config: IgnitionConfig {
                storage: Storage {
                    files: vec![File::new(overlay_paths::KUBELET_CONF, dataurl::encode(&body))],
                },
                ..Default::default()
            },
            ..Default::default()
        },
    })
}
