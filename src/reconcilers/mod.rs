// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes reconcilers that react to watch events.

pub mod controller_config;
pub mod overlay;
pub mod pool;

pub use controller_config::ControllerConfigReconciler;
pub use overlay::{Overlay, OverlayReconciler};
pub use pool::PoolReconciler;
