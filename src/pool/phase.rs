// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-pool reconciliation phase.

use std::fmt;

/// Where a pool is in its reconciliation lifecycle.
///
/// The phase is not persisted. Every pass starts `Idle` and is driven through
/// the events observed during that pass. Paused is not a phase: a paused pool
/// moves through the same phases but admits nobody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolPhase {
    #[default]
    Idle,
    Rendering,
    RolloutInProgress,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Fragments, overlays or cluster params no longer render to the published target
    InputsChanged,
    /// Rendering succeeded; `changed` when the result differs from the current target
    Rendered { changed: bool },
    RenderFailed,
    /// At least one member reports a degraded agent
    NodesDegraded,
    /// Members are still moving to the target
    RolloutPending,
    /// Every member runs the target
    RolloutComplete,
}

impl PoolPhase {
    pub fn on(self, event: PhaseEvent) -> Self {
        use PhaseEvent::*;
        use PoolPhase::*;

        match (self, event) {
            (_, InputsChanged) => Rendering,
            (_, NodesDegraded) => Degraded,
            (Rendering, Rendered { changed: true }) => RolloutInProgress,
            (Rendering, Rendered { changed: false }) => Idle,
            (Rendering, RenderFailed) => Degraded,
            (Idle, RolloutPending) => RolloutInProgress,
            (RolloutInProgress, RolloutComplete) => Idle,
            (phase, _) => phase,
        }
    }
}

impl fmt::Display for PoolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Rendering => write!(f, "Rendering"),
            Self::RolloutInProgress => write!(f, "RolloutInProgress"),
            Self::Degraded => write!(f, "Degraded"),
        }
    }
}
