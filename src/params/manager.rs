// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Owner of the process-wide cluster parameter snapshot.

use crate::types::ControllerConfigSpec;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Events the ControllerConfig reconciler sends to the manager
#[derive(Debug, Clone)]
pub enum ParamsEvent {
    /// The ControllerConfig was observed with this spec
    Observed { spec: Box<ControllerConfigSpec> },
}

/// Read-only view of the current cluster parameters.
#[derive(Clone, Default)]
pub struct ClusterParams {
    current: Arc<RwLock<Option<ControllerConfigSpec>>>,
}

impl ClusterParams {
    /// Copy of the latest parameters, `None` until a ControllerConfig was seen
    pub fn snapshot(&self) -> Option<ControllerConfigSpec> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Parameters that never change, for exercising consumers in tests
    #[cfg(test)]
    pub(crate) fn fixed(spec: ControllerConfigSpec) -> Self {
        let params = Self::default();
        params.replace(spec);
        params
    }

    /// Store `spec`, returning whether it differs from what was held before.
    fn replace(&self, spec: ControllerConfigSpec) -> bool {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if current.as_ref() == Some(&spec) {
            return false;
        }
        *current = Some(spec);
        true
    }
}

/// Handle to send events to the ClusterParamsManager
#[derive(Clone)]
pub struct ClusterParamsHandle {
    event_tx: mpsc::Sender<ParamsEvent>,
}

impl ClusterParamsHandle {
    pub async fn send(&self, event: ParamsEvent) {
        if let Err(e) = self.event_tx.send(event).await {
            error!("Failed to send event to ClusterParamsManager: {}", e);
        }
    }
}

/// Applies ControllerConfig changes to the shared snapshot and asks the pool
/// controller to resync every pool when the parameters actually changed.
pub struct ClusterParamsManager {
    params: ClusterParams,
    event_rx: mpsc::Receiver<ParamsEvent>,
    resync_tx: mpsc::Sender<()>,
}

impl ClusterParamsManager {
    pub fn new(resync_tx: mpsc::Sender<()>) -> (Self, ClusterParamsHandle) {
        let (event_tx, event_rx) = mpsc::channel(16);

        let manager = Self {
            params: ClusterParams::default(),
            event_rx,
            resync_tx,
        };

        (manager, ClusterParamsHandle { event_tx })
    }

    pub fn params(&self) -> ClusterParams {
        self.params.clone()
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        info!("ClusterParamsManager started, waiting for ControllerConfig...");

        while let Some(event) = self.event_rx.recv().await {
            self.handle_event(event);
        }

        Ok(())
    }

    fn handle_event(&mut self, event: ParamsEvent) {
        match event {
            ParamsEvent::Observed { spec } => {
                if !self.params.replace(*spec) {
                    debug!("Cluster parameters unchanged");
                    return;
                }
                info!("Cluster parameters changed, resyncing all pools");
                // A full buffer already holds a pending resync
                if let Err(mpsc::error::TrySendError::Closed(_)) = self.resync_tx.try_send(()) {
                    error!("Pool controller is no longer listening for resyncs");
                }
            }
        }
    }
}
