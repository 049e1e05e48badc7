// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes API access: CRD discovery, node annotations and pool writes.

use crate::constants::OPERATOR_NAME;
use kube::api::{PatchParams, PostParams};

pub mod crd;
pub mod nodes;
pub mod store;

pub use crd::wait_for_crds;
pub use nodes::set_desired_config;
pub use store::{ensure_rendered, prune_rendered, publish_status, publish_target};

/// Patch parameters naming this controller as the field manager
pub fn patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(OPERATOR_NAME.to_string()),
        ..Default::default()
    }
}

/// Create parameters naming this controller as the field manager
pub fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(OPERATOR_NAME.to_string()),
        ..Default::default()
    }
}
