//! Operator-facing deployment report.

use serde::Serialize;
use std::path::PathBuf;

use crate::cloud::ControlPlaneRef;

use super::Target;
use super::context::DeploymentContext;

/// What a deployment produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    /// Target the gateway was deployed to.
    pub target: Target,
    /// Whether the invocations were only printed.
    pub dry_run: bool,
    /// Control plane the gateway registers with.
    pub control_plane: ControlPlaneRef,
    /// Merged configuration file handed to the target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Instance identifier (container and bare-metal targets).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Started container (container target).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// Gateway deployment (cluster target).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
    /// Gateway service (cluster target).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Gateway pods (cluster target).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pods: Vec<PodReport>,
}

/// A gateway pod and the instance identifier it reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodReport {
    /// Pod name.
    pub name: String,
    /// Instance identifier read from the pod, if it could be read.
    pub instance_id: Option<String>,
}

impl DeployReport {
    /// Starts a report from the pre-run context.
    #[must_use]
    pub fn new(target: Target, ctx: &DeploymentContext, dry_run: bool) -> Self {
        Self {
            target,
            dry_run,
            control_plane: ctx.control_plane.clone(),
            config_file: ctx.config_file.clone(),
            instance_id: ctx.instance_id.clone(),
            container_id: None,
            deployment: None,
            service: None,
            pods: Vec::new(),
        }
    }
}
