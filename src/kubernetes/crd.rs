// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::constants::{API_GROUP, API_VERSION};
use crate::error::Result;
use kube::{discovery::Discovery, Client};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Kinds the controllers watch; all must be served before they start
pub const REQUIRED_KINDS: [&str; 5] = [
    "MachineConfig",
    "MachineConfigPool",
    "ControllerConfig",
    "KubeletConfig",
    "ContainerRuntimeConfig",
];

/// Wait for the machine config CRDs to become available in the cluster.
/// This uses exponential backoff starting at POLL_INTERVAL_SECS seconds.
pub async fn wait_for_crds(client: &Client) -> Result<()> {
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        match served_kinds(client).await {
            Ok(served) => {
                let missing = missing_kinds(served.iter().map(String::as_str));
                if missing.is_empty() {
                    info!("Machine config CRDs ({}/{}) are available", API_GROUP, API_VERSION);
                    return Ok(());
                }
                info!(
                    "CRDs {} not yet available, waiting {} seconds...",
                    missing.join(", "),
                    interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for machine config CRDs: {}, retrying in {} seconds...",
                    e, interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        // Exponential backoff with max cap
        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

/// Kinds served under the machine config group and version.
async fn served_kinds(client: &Client) -> Result<Vec<String>> {
    let discovery = Discovery::new(client.clone())
        .filter(&[API_GROUP])
        .run()
        .await?;

    let mut kinds = Vec::new();
    for group in discovery.groups() {
        if group.name() == API_GROUP {
            for (ar, _) in group.recommended_resources() {
                if ar.version == API_VERSION {
                    kinds.push(ar.kind);
                }
            }
        }
    }

    Ok(kinds)
}

fn missing_kinds<'a>(served: impl Iterator<Item = &'a str> + Clone) -> Vec<&'static str> {
    REQUIRED_KINDS
        .into_iter()
        .filter(|kind| !served.clone().any(|s| s == *kind))
        .collect()
}
