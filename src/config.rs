// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

const DEFAULT_CONTROLLER_CONFIG_NAME: &str = "machine-config-controller";
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 600;
const DEFAULT_ERROR_REQUEUE_SECS: u64 = 60;

/// Controller configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the singleton ControllerConfig holding the cluster parameters
    pub controller_config_name: String,
    /// Periodic safety resync applied to every pool
    pub resync_interval: Duration,
    /// Requeue delay after a non-conflict reconcile error
    pub error_requeue: Duration,
    pub log_level: String,
    pub wait_for_crds: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            controller_config_name: DEFAULT_CONTROLLER_CONFIG_NAME.to_string(),
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            error_requeue: Duration::from_secs(DEFAULT_ERROR_REQUEUE_SECS),
            log_level: "info".to_string(),
            wait_for_crds: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let controller_config_name = env::var("CONTROLLER_CONFIG_NAME")
            .unwrap_or(defaults.controller_config_name);
        let resync_interval = match env::var("RESYNC_INTERVAL_SECS") {
            Ok(v) => Duration::from_secs(
                v.parse()
                    .context("RESYNC_INTERVAL_SECS must be a whole number of seconds")?,
            ),
            Err(_) => defaults.resync_interval,
        };
        let error_requeue = match env::var("ERROR_REQUEUE_SECS") {
            Ok(v) => Duration::from_secs(
                v.parse()
                    .context("ERROR_REQUEUE_SECS must be a whole number of seconds")?,
            ),
            Err(_) => defaults.error_requeue,
        };
        let log_level = env::var("LOG_LEVEL").unwrap_or(defaults.log_level);
        let wait_for_crds: bool = env::var("WAIT_FOR_CRDS")
            .unwrap_or("true".to_string())
            .parse()
            .unwrap_or(true);

        Ok(Config {
            controller_config_name,
            resync_interval,
            error_requeue,
            log_level,
            wait_for_crds,
        })
    }
}
