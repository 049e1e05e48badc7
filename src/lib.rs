// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod config;
pub mod constants;
pub mod error;
pub mod kubernetes;
pub mod overlay;
pub mod params;
pub mod pool;
pub mod reconcilers;
pub mod render;
pub mod rollout;
pub mod selector;
pub mod status;
pub mod types;
pub mod version;

#[cfg(test)]
pub mod test_utils;
