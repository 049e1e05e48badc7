// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! ControllerConfig reconciler - watches the singleton ControllerConfig and
//! forwards its spec to the cluster params manager.

use crate::config::Config;
use crate::error::{ControllerError, Result};
use crate::params::{ClusterParamsHandle, ParamsEvent};
use crate::types::ControllerConfig;
use futures::StreamExt;
use kube::{
    runtime::{controller::Action, Controller},
    Api, Client, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct ControllerConfigReconciler {
    client: Client,
    config: Config,
    params_handle: ClusterParamsHandle,
}

impl ControllerConfigReconciler {
    pub fn new(client: Client, config: Config, params_handle: ClusterParamsHandle) -> Self {
        Self {
            client,
            config,
            params_handle,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let configs: Api<ControllerConfig> = Api::all(self.client.clone());
        let watcher_config =
            WatcherConfig::default().fields(&format!("metadata.name={}", self.config.controller_config_name));
        info!(
            "Watching ControllerConfig {} for cluster parameters",
            self.config.controller_config_name
        );
        let context = Arc::new(self);

        Controller::new(configs, watcher_config)
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled controller config: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile(cc: Arc<ControllerConfig>, ctx: Arc<ControllerConfigReconciler>) -> Result<Action> {
    let name = cc.name_any();
    if name != ctx.config.controller_config_name {
        debug!("Ignoring ControllerConfig {}", name);
        return Ok(Action::await_change());
    }

    debug!("Observed ControllerConfig {}", name);
    ctx.params_handle
        .send(ParamsEvent::Observed {
            spec: Box::new(cc.spec.clone()),
        })
        .await;

    Ok(Action::await_change())
}

fn error_policy(
    _cc: Arc<ControllerConfig>,
    error: &ControllerError,
    ctx: Arc<ControllerConfigReconciler>,
) -> Action {
    error!("Reconciliation error: {}", error);
    Action::requeue(ctx.config.error_requeue)
}
