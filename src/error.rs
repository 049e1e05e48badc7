// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("ControllerConfig {0} is not available yet")]
    ClusterParamsUnavailable(String),

    #[error("Object is missing {0}")]
    MissingField(&'static str),

    #[error("Watch cache for {0} stopped before it was populated")]
    CacheUnavailable(&'static str),
}

impl ControllerError {
    /// Whether a conditional write lost against a newer version of the object
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::KubeError(kube::Error::Api(e)) if e.code == StatusCode::CONFLICT.as_u16())
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
