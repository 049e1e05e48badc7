// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pool reconciler - renders each pool's configuration and rolls it out to its nodes.
//!
//! Fragments, nodes and overlays are read from reflector stores fed by the
//! same watches that trigger pool passes, so a pass makes no LIST calls.

use crate::config::Config;
use crate::error::{ControllerError, Result};
use crate::kubernetes::{ensure_rendered, prune_rendered, publish_status, publish_target, set_desired_config};
use crate::params::ClusterParams;
use crate::pool::{plan_pass, prepare};
use crate::selector;
use crate::types::{ContainerRuntimeConfig, KubeletConfig, MachineConfig, MachineConfigPool};
use chrono::Utc;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Node;
use kube::{
    runtime::{
        controller::Action,
        reflector::{self, store::Writer, ObjectRef, Store},
        watcher, Controller, WatchStreamExt,
    },
    Api, Client, Resource, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, instrument, warn};

pub struct PoolReconciler {
    client: Client,
    config: Config,
    params: ClusterParams,
}

/// Cached views of every kind a pool pass reads besides the pool itself
#[derive(Clone)]
struct PoolCaches {
    configs: Store<MachineConfig>,
    nodes: Store<Node>,
    kubelet_configs: Store<KubeletConfig>,
    runtime_configs: Store<ContainerRuntimeConfig>,
}

impl PoolCaches {
    /// Wait until every store holds a complete initial listing
    async fn wait_until_ready(&self) -> Result<()> {
        self.configs
            .wait_until_ready()
            .await
            .map_err(|_| ControllerError::CacheUnavailable("MachineConfig"))?;
        self.nodes
            .wait_until_ready()
            .await
            .map_err(|_| ControllerError::CacheUnavailable("Node"))?;
        self.kubelet_configs
            .wait_until_ready()
            .await
            .map_err(|_| ControllerError::CacheUnavailable("KubeletConfig"))?;
        self.runtime_configs
            .wait_until_ready()
            .await
            .map_err(|_| ControllerError::CacheUnavailable("ContainerRuntimeConfig"))?;
        Ok(())
    }
}

/// Shared state of a running pool controller
struct Context {
    client: Client,
    config: Config,
    params: ClusterParams,
    caches: PoolCaches,
}

impl PoolReconciler {
    pub fn new(client: Client, config: Config, params: ClusterParams) -> Self {
        Self {
            client,
            config,
            params,
        }
    }

    /// Run the controller until shutdown. Every message on `resync` requeues all pools.
    pub async fn run(self, resync: mpsc::Receiver<()>) -> anyhow::Result<()> {
        let pools: Api<MachineConfigPool> = Api::all(self.client.clone());
        let (configs, configs_writer) = reflector::store();
        let (nodes, nodes_writer) = reflector::store();
        let (kubelet_configs, kubelet_writer) = reflector::store();
        let (runtime_configs, runtime_writer) = reflector::store();

        let configs_trigger = cached(configs_writer, Api::<MachineConfig>::all(self.client.clone()));
        let nodes_trigger = cached(nodes_writer, Api::<Node>::all(self.client.clone()));
        let kubelet_trigger = cached(kubelet_writer, Api::<KubeletConfig>::all(self.client.clone()));
        let runtime_trigger = cached(runtime_writer, Api::<ContainerRuntimeConfig>::all(self.client.clone()));

        let context = Arc::new(Context {
            client: self.client,
            config: self.config,
            params: self.params,
            caches: PoolCaches {
                configs,
                nodes,
                kubelet_configs,
                runtime_configs,
            },
        });

        let controller = Controller::new(pools, WatcherConfig::default());
        let store = controller.store();

        controller
            .watches_stream(configs_trigger, {
                let store = store.clone();
                move |mc: MachineConfig| pools_for_config(&store.state(), &mc)
            })
            .watches_stream(nodes_trigger, {
                let store = store.clone();
                move |node: Node| pools_for_node(&store.state(), &node)
            })
            .watches_stream(kubelet_trigger, {
                let store = store.clone();
                move |_: KubeletConfig| all_pools(&store.state())
            })
            .watches_stream(runtime_trigger, {
                let store = store.clone();
                move |_: ContainerRuntimeConfig| all_pools(&store.state())
            })
            .reconcile_all_on(ReceiverStream::new(resync))
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled pool: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

/// Keep `writer` in sync with every object of the kind and yield each object that changed
fn cached<K>(writer: Writer<K>, api: Api<K>) -> impl Stream<Item = std::result::Result<K, watcher::Error>> + Send + 'static
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    reflector::reflector(writer, watcher::watcher(api, WatcherConfig::default()))
        .default_backoff()
        .touched_objects()
}

fn all_pools(pools: &[Arc<MachineConfigPool>]) -> Vec<ObjectRef<MachineConfigPool>> {
    pools.iter().map(|p| ObjectRef::from_obj(p.as_ref())).collect()
}

/// Rendered configs only concern their owner; authored fragments may concern any pool.
fn pools_for_config(pools: &[Arc<MachineConfigPool>], mc: &MachineConfig) -> Vec<ObjectRef<MachineConfigPool>> {
    match mc.owning_pool() {
        Some(owner) => vec![ObjectRef::new(owner)],
        None => all_pools(pools),
    }
}

/// Pools whose node selector matches the node. A pool with a broken selector
/// is included so its failure stays visible in status.
fn pools_for_node(pools: &[Arc<MachineConfigPool>], node: &Node) -> Vec<ObjectRef<MachineConfigPool>> {
    pools
        .iter()
        .filter(|p| selector::matches(p.spec.node_selector.as_ref(), node.labels()).unwrap_or(true))
        .map(|p| ObjectRef::from_obj(p.as_ref()))
        .collect()
}

fn snapshot<K>(store: &Store<K>) -> Vec<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    store.state().iter().map(|obj| obj.as_ref().clone()).collect()
}

#[instrument(skip(pool, ctx), fields(pool = %pool.name_any()))]
async fn reconcile(pool: Arc<MachineConfigPool>, ctx: Arc<Context>) -> Result<Action> {
    let name = pool.name_any();
    let Some(params) = ctx.params.snapshot() else {
        return Err(ControllerError::ClusterParamsUnavailable(
            ctx.config.controller_config_name.clone(),
        ));
    };
    ctx.caches.wait_until_ready().await?;

    debug!("Reconciling pool: {}", name);

    let configs = snapshot(&ctx.caches.configs);
    let nodes = snapshot(&ctx.caches.nodes);
    let kubelet_configs = snapshot(&ctx.caches.kubelet_configs);
    let runtime_configs = snapshot(&ctx.caches.runtime_configs);

    let input = prepare(&pool, &configs, &nodes, &kubelet_configs, &runtime_configs, &params);
    for (overlay, err) in &input.rejected_overlays {
        warn!("Overlay {} left out of pool {}: {}", overlay, name, err);
    }
    if let Err(failure) = &input.outcome {
        warn!("Pool {} not rendered ({}): {}", name, failure.reason, failure.message);
    }

    let plan = plan_pass(&input, Utc::now());
    if plan.is_noop() {
        debug!("Pool {} is {}, nothing to do", name, plan.phase);
        return Ok(Action::requeue(ctx.config.resync_interval));
    }
    info!(
        "Pool {} is {}: {}/{} unavailable, admitting {}",
        name,
        plan.phase,
        plan.admission.unavailable,
        plan.admission.max_unavailable,
        plan.admission.admitted.len()
    );

    if let Some((rendered_name, rendered)) = &plan.rendered {
        ensure_rendered(&ctx.client, &pool, rendered_name, rendered).await?;
    }

    let mut current = (*pool).clone();
    if let Some(configuration) = &plan.retarget {
        current = publish_target(&ctx.client, &current, configuration).await?;
    }

    if let Some(target) = &plan.target {
        for node in &plan.admission.admitted {
            // Admission was decided against this node version
            let observed = input
                .members
                .iter()
                .find(|m| &m.name == node)
                .and_then(|m| m.resource_version.as_deref());
            set_desired_config(&ctx.client, node, observed, target).await?;
        }
    }

    if plan.status_changed {
        publish_status(&ctx.client, &current, &plan.status).await?;
    }

    if !plan.prune.is_empty() {
        prune_rendered(&ctx.client, &plan.prune).await?;
    }

    Ok(Action::requeue(ctx.config.resync_interval))
}

fn error_policy(pool: Arc<MachineConfigPool>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    if error.is_conflict() {
        debug!("Pool {} changed during the pass, retrying", pool.name_any());
        return Action::requeue(Duration::ZERO);
    }
    error!("Reconciliation error for pool {}: {}", pool.name_any(), error);
    Action::requeue(ctx.config.error_requeue)
}
