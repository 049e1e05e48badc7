// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Parsing of Kubernetes resource quantities ("8Ki", "10G", "-1").

use crate::overlay::OverlayError;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const SUFFIXES: [(&str, f64); 13] = [
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Ei", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Integer value of a quantity, rounded up like the API server does.
pub fn to_i64(quantity: &Quantity) -> Result<i64, OverlayError> {
    let raw = quantity.0.trim();
    let invalid = || OverlayError::InvalidQuantity(quantity.0.clone());

    let (number, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, mult)| raw.strip_suffix(suffix).map(|n| (n, *mult)))
        .unwrap_or((raw, 1.0));

    if number.is_empty() {
        return Err(invalid());
    }
    let value: f64 = number.parse().map_err(|_| invalid())?;
    let scaled = (value * multiplier).ceil();
    if !scaled.is_finite() || scaled > i64::MAX as f64 || scaled < i64::MIN as f64 {
        return Err(invalid());
    }
    Ok(scaled as i64)
}
