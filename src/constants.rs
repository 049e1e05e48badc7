// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// API group served by the machine config CRDs
pub const API_GROUP: &str = "machineconfiguration.openshift.io";

/// API version served by the machine config CRDs
pub const API_VERSION: &str = "v1";

/// Field manager recorded on every write the controller makes
pub const OPERATOR_NAME: &str = "machine-config-controller";

/// Program name printed by the `version` command
pub const PROGRAM_NAME: &str = "MachineConfigController";

/// Node annotation keys shared with the node-local agent
pub mod annotations {
    /// Rendered configuration currently applied to the node (written by the agent)
    pub const CURRENT_CONFIG: &str = "machineconfiguration.openshift.io/currentConfig";
    /// Rendered configuration the node should move to (written by the controller)
    pub const DESIRED_CONFIG: &str = "machineconfiguration.openshift.io/desiredConfig";
    /// Agent state: Done, Working, Degraded or Unreconcilable
    pub const STATE: &str = "machineconfiguration.openshift.io/state";
    /// Human readable detail for a degraded agent state
    pub const REASON: &str = "machineconfiguration.openshift.io/reason";
    /// Set on rendered configurations to record which controller produced them
    pub const GENERATED_BY_VERSION: &str =
        "machineconfiguration.openshift.io/generated-by-controller-version";
}

/// Rendered configuration naming
pub mod rendered {
    /// Every rendered configuration name starts with this prefix
    pub const NAME_PREFIX: &str = "rendered-";
    /// Number of digest bytes kept in the rendered name
    pub const HASH_BYTES: usize = 16;
    /// Ignition spec version stamped on every rendered configuration
    pub const IGNITION_VERSION: &str = "2.2.0";
}

/// Files written by overlay resolvers
pub mod overlay_paths {
    pub const KUBELET_CONF: &str = "/etc/kubernetes/kubelet.conf";
    pub const CRIO_DROPIN_DIR: &str = "/etc/crio/crio.conf.d";
    pub const CRIO_DROPIN_PREFIX: &str = "01-ctrcfg-";
    pub const STORAGE_CONF: &str = "/etc/containers/storage.conf";
}

/// Condition reasons written to pool and overlay status
pub mod reasons {
    pub const ALL_UPDATED: &str = "AllNodesUpdated";
    pub const UPDATING: &str = "Updating";
    pub const PAUSED: &str = "Paused";
    pub const NODES_DEGRADED: &str = "NodesDegraded";
    pub const RENDER_FAILED: &str = "RenderFailed";
    pub const INVALID_SELECTOR: &str = "InvalidSelector";
    pub const AS_EXPECTED: &str = "AsExpected";
    pub const NO_POOL_SELECTOR: &str = "NoPoolSelector";
    pub const INVALID_PAYLOAD: &str = "InvalidPayload";
    pub const APPLIED: &str = "Applied";
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}
