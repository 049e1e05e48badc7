// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The pure part of a pool pass: select, render, admit and aggregate.
//!
//! [`prepare`] turns listed objects into a [`PassInput`]; [`plan_pass`]
//! decides every write the pass should make. Neither touches the API, so a
//! pass can be replayed in tests against any snapshot of the cluster.

use crate::constants::reasons;
use crate::overlay::{self, OverlayError};
use crate::pool::phase::{PhaseEvent, PoolPhase};
use crate::render::{self, RenderedConfiguration};
use crate::rollout::{plan_admission, resolve_max_unavailable, Admission};
use crate::selector;
use crate::status::{aggregate, MachineCounts, MemberObservation, RenderFailure, StatusInput};
use crate::types::{
    ContainerRuntimeConfig, ControllerConfigSpec, KubeletConfig, MachineConfig, MachineConfigPool,
    MachineConfigPoolStatus, PoolConfiguration,
};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use std::collections::BTreeSet;

/// Everything a pass observed about one pool.
#[derive(Debug, Clone)]
pub struct PassInput<'a> {
    pub pool: &'a MachineConfigPool,
    pub outcome: Result<RenderedConfiguration, RenderFailure>,
    pub members: Vec<MemberObservation>,
    /// Overlays selecting this pool that failed validation and were left out
    pub rejected_overlays: Vec<(String, OverlayError)>,
    /// Rendered configurations owned by this pool
    pub owned_rendered: Vec<String>,
}

/// Writes a pass should perform, in order.
#[derive(Debug, Clone)]
pub struct PassPlan {
    pub phase: PoolPhase,
    /// Rendered configuration that must exist under the given name
    pub rendered: Option<(String, RenderedConfiguration)>,
    /// New `spec.configuration`, when the target moved
    pub retarget: Option<PoolConfiguration>,
    /// Target rendered configuration name after this pass
    pub target: Option<String>,
    pub admission: Admission,
    pub status: MachineConfigPoolStatus,
    pub status_changed: bool,
    /// Owned rendered configurations nothing refers to any more
    pub prune: Vec<String>,
}

impl PassPlan {
    /// Whether the pass has nothing to write
    pub fn is_noop(&self) -> bool {
        self.retarget.is_none()
            && self.admission.admitted.is_empty()
            && !self.status_changed
            && self.prune.is_empty()
    }
}

fn selector_failure(field: &str, err: selector::SelectorError) -> RenderFailure {
    RenderFailure {
        reason: reasons::INVALID_SELECTOR,
        message: format!("invalid {}: {}", field, err),
    }
}

/// Select fragments, members and overlays for `pool` and render its configuration.
pub fn prepare<'a>(
    pool: &'a MachineConfigPool,
    configs: &[MachineConfig],
    nodes: &[Node],
    kubelet_configs: &[KubeletConfig],
    runtime_configs: &[ContainerRuntimeConfig],
    params: &ControllerConfigSpec,
) -> PassInput<'a> {
    let pool_name = pool.name_any();
    let owned_rendered = configs
        .iter()
        .filter(|mc| mc.owning_pool() == Some(pool_name.as_str()))
        .map(|mc| mc.name_any())
        .collect();

    let mut input = PassInput {
        pool,
        outcome: Err(RenderFailure {
            reason: reasons::RENDER_FAILED,
            message: String::new(),
        }),
        members: Vec::new(),
        rejected_overlays: Vec::new(),
        owned_rendered,
    };

    match selector::select(pool.spec.node_selector.as_ref(), nodes) {
        Ok(selected) => {
            input.members = selected.into_iter().map(MemberObservation::from_node).collect();
        }
        Err(e) => {
            input.outcome = Err(selector_failure("nodeSelector", e));
            return input;
        }
    }

    let authored = configs.iter().filter(|mc| !mc.is_rendered());
    let fragments = match selector::select(pool.spec.machine_config_selector.as_ref(), authored) {
        Ok(fragments) => fragments,
        Err(e) => {
            input.outcome = Err(selector_failure("machineConfigSelector", e));
            return input;
        }
    };

    let overlays = overlay::resolve_for_pool(pool, kubelet_configs, runtime_configs);
    input.rejected_overlays = overlays.rejected;

    input.outcome = render::render(fragments, &overlays.fragments, params).map_err(|e| RenderFailure {
        reason: reasons::RENDER_FAILED,
        message: e.to_string(),
    });
    input
}

/// Decide what this pass writes.
///
/// A failed render keeps the last published target and still reports
/// status, but admits nobody until the failure is corrected.
pub fn plan_pass(input: &PassInput<'_>, now: DateTime<Utc>) -> PassPlan {
    let pool = input.pool;
    let pool_name = pool.name_any();
    let mut phase = PoolPhase::Idle;

    let (rendered, failure) = match &input.outcome {
        Ok(r) => (Some((r.name_for(&pool_name), r.clone())), None),
        Err(f) => (None, Some(f.clone())),
    };

    let target_ref = match &rendered {
        Some((name, r)) => Some(PoolConfiguration {
            name: Some(name.clone()),
            source: r.sources.clone(),
        }),
        None => pool
            .target_config()
            .map(|_| pool.spec.configuration.clone()),
    };
    let target = target_ref.as_ref().and_then(|r| r.name.clone());

    let retarget = match (&rendered, &target_ref) {
        (Some(_), Some(reference)) if *reference != pool.spec.configuration => Some(reference.clone()),
        _ => None,
    };
    // Inputs only count as changed when they no longer render to the published target
    if failure.is_some() || retarget.is_some() {
        phase = phase.on(PhaseEvent::InputsChanged);
        phase = match &failure {
            None => phase.on(PhaseEvent::Rendered {
                changed: target.as_deref() != pool.target_config(),
            }),
            Some(_) => phase.on(PhaseEvent::RenderFailed),
        };
    }

    let mut members = input.members.clone();
    let max_unavailable = resolve_max_unavailable(pool.spec.max_unavailable.as_ref(), members.len());
    let admission = match (&target, &failure) {
        (Some(t), None) => plan_admission(&members, t, max_unavailable, pool.spec.paused),
        _ => Admission {
            max_unavailable,
            ..Default::default()
        },
    };
    for member in members.iter_mut() {
        if admission.admitted.contains(&member.name) {
            member.desired_config = target.clone();
        }
    }

    let counts = MachineCounts::observe(&members, target.as_deref());
    if counts.degraded > 0 {
        phase = phase.on(PhaseEvent::NodesDegraded);
    }
    phase = if counts.all_updated() {
        phase.on(PhaseEvent::RolloutComplete)
    } else {
        phase.on(PhaseEvent::RolloutPending)
    };

    let status = aggregate(
        &StatusInput {
            members: &members,
            target: target.as_deref(),
            target_ref: target_ref.as_ref(),
            paused: pool.spec.paused,
            render_failure: failure.as_ref(),
            generation: pool.metadata.generation.unwrap_or_default(),
        },
        pool.status.as_ref(),
        now,
    );
    let status_changed = pool.status.as_ref() != Some(&status);

    let prune = if rendered.is_some() {
        let mut keep: BTreeSet<&str> = BTreeSet::new();
        keep.extend(target.as_deref());
        keep.extend(pool.target_config());
        keep.extend(pool.current_config());
        keep.extend(status.configuration.name.as_deref());
        for m in &members {
            keep.extend(m.current_config.as_deref());
            keep.extend(m.desired_config.as_deref());
        }
        input
            .owned_rendered
            .iter()
            .filter(|name| !keep.contains(name.as_str()))
            .cloned()
            .collect()
    } else {
        Vec::new()
    };

    PassPlan {
        phase,
        rendered,
        retarget,
        target,
        admission,
        status,
        status_changed,
        prune,
    }
}
