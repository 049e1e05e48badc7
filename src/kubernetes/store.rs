// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Writes of rendered configurations and pool state.
//!
//! Pool writes carry the `resourceVersion` the pass started from, so a pass
//! working on a stale pool loses with a conflict instead of overwriting a
//! newer pass.

use crate::constants::annotations;
use crate::error::{ControllerError, Result};
use crate::kubernetes::{patch_params, post_params};
use crate::render::RenderedConfiguration;
use crate::types::{MachineConfig, MachineConfigPool, MachineConfigPoolStatus, PoolConfiguration};
use crate::version;
use kube::{
    api::{DeleteParams, ObjectMeta, Patch},
    Api, Client, Resource,
};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Build the MachineConfig a pool publishes for a rendered configuration
pub fn rendered_machine_config(
    pool: &MachineConfigPool,
    name: &str,
    rendered: &RenderedConfiguration,
) -> Result<MachineConfig> {
    let owner = pool
        .controller_owner_ref(&())
        .ok_or(ControllerError::MissingField("metadata.uid"))?;

    Ok(MachineConfig {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            owner_references: Some(vec![owner]),
            annotations: Some(BTreeMap::from([(
                annotations::GENERATED_BY_VERSION.to_string(),
                version::version(),
            )])),
            ..Default::default()
        },
        spec: rendered.spec.clone(),
    })
}

/// Create the rendered MachineConfig unless it already exists.
///
/// Names are content addressed, so an existing object already holds the same
/// configuration. Returns whether the object was created.
#[instrument(skip(client, pool, rendered))]
pub async fn ensure_rendered(
    client: &Client,
    pool: &MachineConfigPool,
    name: &str,
    rendered: &RenderedConfiguration,
) -> Result<bool> {
    let configs: Api<MachineConfig> = Api::all(client.clone());

    if configs.get_opt(name).await?.is_some() {
        debug!("Rendered config {} already exists", name);
        return Ok(false);
    }

    let mc = rendered_machine_config(pool, name, rendered)?;
    match configs.create(&post_params(), &mc).await {
        Ok(_) => {
            info!("Created rendered config {}", name);
            Ok(true)
        }
        Err(kube::Error::Api(err)) if err.code == 409 => {
            debug!("Rendered config {} was created concurrently", name);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn resource_version(pool: &MachineConfigPool) -> Result<String> {
    pool.meta()
        .resource_version
        .clone()
        .ok_or(ControllerError::MissingField("metadata.resourceVersion"))
}

/// Publish a new target configuration on the pool spec.
#[instrument(skip(client, pool, configuration), fields(pool = %pool.meta().name.as_deref().unwrap_or_default()))]
pub async fn publish_target(
    client: &Client,
    pool: &MachineConfigPool,
    configuration: &PoolConfiguration,
) -> Result<MachineConfigPool> {
    let pools: Api<MachineConfigPool> = Api::all(client.clone());
    let name = pool.meta().name.clone().unwrap_or_default();
    let patch = serde_json::json!({
        "metadata": { "resourceVersion": resource_version(pool)? },
        "spec": { "configuration": configuration }
    });

    let updated = pools
        .patch(&name, &patch_params(), &Patch::Merge(&patch))
        .await?;
    info!(
        "Pool {} now targets {}",
        name,
        configuration.name.as_deref().unwrap_or_default()
    );
    Ok(updated)
}

/// Write the pool status computed by a pass.
#[instrument(skip(client, pool, status), fields(pool = %pool.meta().name.as_deref().unwrap_or_default()))]
pub async fn publish_status(
    client: &Client,
    pool: &MachineConfigPool,
    status: &MachineConfigPoolStatus,
) -> Result<MachineConfigPool> {
    let pools: Api<MachineConfigPool> = Api::all(client.clone());
    let name = pool.meta().name.clone().unwrap_or_default();
    let patch = serde_json::json!({
        "metadata": { "resourceVersion": resource_version(pool)? },
        "status": status
    });

    let updated = pools
        .patch_status(&name, &patch_params(), &Patch::Merge(&patch))
        .await?;
    debug!("Updated status of pool {}", name);
    Ok(updated)
}

/// Delete rendered configurations no longer referenced. Already deleted ones are skipped.
#[instrument(skip(client))]
pub async fn prune_rendered(client: &Client, names: &[String]) -> Result<()> {
    let configs: Api<MachineConfig> = Api::all(client.clone());

    for name in names {
        match configs.delete(name, &DeleteParams::default()).await {
            Ok(_) => info!("Pruned rendered config {}", name),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                debug!("Rendered config {} already gone", name)
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
