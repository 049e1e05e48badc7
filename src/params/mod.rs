// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster-wide render parameters taken from the singleton ControllerConfig.

pub mod manager;

pub use manager::{ClusterParams, ClusterParamsHandle, ClusterParamsManager, ParamsEvent};
