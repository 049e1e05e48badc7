// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Writes to Nodes: the desired configuration handed to the node agent.

use crate::constants::annotations;
use crate::error::Result;
use crate::kubernetes::patch_params;
use k8s_openapi::api::core::v1::Node;
use kube::{api::Patch, Api, Client};
use tracing::{info, instrument};

/// Point a node's agent at a rendered configuration.
///
/// With a `resource_version` the write only lands on the node version the
/// admission decision was made from; a node that moved since fails with a
/// conflict.
#[instrument(skip(client))]
pub async fn set_desired_config(
    client: &Client,
    node: &str,
    resource_version: Option<&str>,
    config: &str,
) -> Result<()> {
    let nodes: Api<Node> = Api::all(client.clone());
    let mut patch = serde_json::json!({
        "metadata": {
            "annotations": {
                (annotations::DESIRED_CONFIG): config
            }
        }
    });
    if let Some(rv) = resource_version {
        patch["metadata"]["resourceVersion"] = rv.into();
    }

    nodes.patch(node, &patch_params(), &Patch::Merge(&patch)).await?;
    info!("Node {} admitted to update to {}", node, config);
    Ok(())
}
