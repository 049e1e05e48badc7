// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::Client;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use machine_config_controller::config::Config;
use machine_config_controller::kubernetes::wait_for_crds;
use machine_config_controller::params::ClusterParamsManager;
use machine_config_controller::reconcilers::{
    ControllerConfigReconciler, OverlayReconciler, PoolReconciler,
};
use machine_config_controller::types::{self, ContainerRuntimeConfig, KubeletConfig};
use machine_config_controller::version;

/// Machine config controller - renders pool configurations and rolls them out to nodes
#[derive(Parser, Debug)]
#[command(name = "machine-config-controller", about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run all controllers (default mode)
    Start,

    /// Print the program version and exit
    Version,

    /// Print the CustomResourceDefinitions as a YAML stream and exit
    Crds,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Version => {
            println!("{}", version::version_line());
            Ok(())
        }
        Commands::Crds => print_crds(),
        Commands::Start => start().await,
    }
}

fn print_crds() -> Result<()> {
    for crd in types::crds() {
        let yaml = serde_yaml::to_string(&crd).context("failed to serialize CRD")?;
        println!("---\n{}", yaml.trim_end());
    }
    Ok(())
}

async fn start() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting {}", version::version_line());
    info!(
        "Configuration loaded: controller_config={}, resync_interval={:?}",
        config.controller_config_name, config.resync_interval
    );

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    if config.wait_for_crds {
        info!("Waiting for machine config CRDs to become available...");
        wait_for_crds(&client).await?;
    }

    // Parameter changes requeue every pool; one pending resync is enough
    let (resync_tx, resync_rx) = mpsc::channel(1);
    let (params_manager, params_handle) = ClusterParamsManager::new(resync_tx);

    let pool_reconciler = PoolReconciler::new(client.clone(), config.clone(), params_manager.params());
    let controller_config_reconciler =
        ControllerConfigReconciler::new(client.clone(), config.clone(), params_handle);
    let kubelet_reconciler = OverlayReconciler::<KubeletConfig>::new(client.clone(), config.clone());
    let runtime_reconciler = OverlayReconciler::<ContainerRuntimeConfig>::new(client, config);

    info!("Starting reconcilers...");

    tokio::try_join!(
        params_manager.run(),
        controller_config_reconciler.run(),
        pool_reconciler.run(resync_rx),
        kubelet_reconciler.run(),
        runtime_reconciler.run()
    )?;

    warn!("All reconcilers stopped");
    Ok(())
}
