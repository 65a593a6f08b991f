//! Control-plane API types and data structures.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the control plane an instance registers with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlPlaneRef {
    /// Control-plane identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Domain the gateway connects to.
    #[serde(default)]
    pub domain: String,
    /// Organization owning the control plane.
    #[serde(default)]
    pub org_id: String,
}

/// PEM-encoded certificate triple issued for a control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TlsBundle {
    /// Client certificate.
    pub certificate: String,
    /// Private key of the client certificate.
    pub private_key: String,
    /// Certificate authority the control plane trusts.
    pub ca_certificate: String,
}

/// Kind of startup configuration template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    /// Raw gateway configuration (container and bare-metal targets).
    Gateway,
    /// Helm chart values (cluster target).
    Helm,
}

impl ConfigKind {
    /// Query value used by the control-plane API.
    #[must_use]
    pub const fn as_query(self) -> &'static str {
        match self {
            Self::Gateway => "apisix",
            Self::Helm => "helm",
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

/// The authenticated user.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: String,
    /// Organizations the user belongs to.
    #[serde(default)]
    pub org_ids: Vec<String>,
}

/// A page of control planes.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ControlPlaneList {
    #[serde(default)]
    pub list: Vec<ControlPlaneRef>,
}

/// Startup configuration template payload.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StartupConfig {
    pub configuration: String,
}

/// Response envelope shared by every API call.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub status: EnvelopeStatus,
    pub payload: Option<T>,
}

/// Status block of the response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct EnvelopeStatus {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}
