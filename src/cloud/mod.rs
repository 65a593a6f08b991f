//! Control-plane integration module.
//!
//! This module provides the narrow contract the deployment engine needs from
//! the control plane, plus the HTTP client that implements it.

mod client;
mod types;

use async_trait::async_trait;

use crate::error::ControlPlaneError;

pub use client::CloudClient;
pub use types::{ConfigKind, ControlPlaneRef, TlsBundle, User};

/// Operations the deployment engine consumes from the control plane.
///
/// Implementations own authentication and transport; callers get a value or
/// an error and never retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Resolves the control plane the instance registers with.
    async fn default_cluster(&self) -> Result<ControlPlaneRef, ControlPlaneError>;

    /// Fetches the certificate triple issued for a control plane.
    async fn tls_bundle(&self, cluster_id: &str) -> Result<TlsBundle, ControlPlaneError>;

    /// Downloads the gzip-compressed cloud lua module archive.
    async fn script_archive(&self) -> Result<Vec<u8>, ControlPlaneError>;

    /// Fetches the startup configuration template for a target kind.
    async fn startup_config_template(
        &self,
        cluster_id: &str,
        kind: ConfigKind,
    ) -> Result<String, ControlPlaneError>;
}
