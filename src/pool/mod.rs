// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pool reconciliation logic, independent of the API server.

pub mod phase;
pub mod plan;

pub use phase::{PhaseEvent, PoolPhase};
pub use plan::{plan_pass, prepare, PassInput, PassPlan};
