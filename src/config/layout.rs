//! On-disk layout of the tool's home directory.
//!
//! Other tooling depends on these paths, so they stay stable across versions.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Default home directory name under the user's home.
pub const HOME_DIR_NAME: &str = ".api7cloud";

/// Directory holding per-control-plane certificate triples.
const TLS_DIR: &str = "tls";

/// Name of the extracted cloud lua module directory.
pub const CLOUD_MODULE_DIR_NAME: &str = "cloud_lua_module";

/// Instance identifier file name.
pub const INSTANCE_ID_FILE: &str = "apisix.uid";

/// Certificate file name.
pub const CERT_FILE: &str = "tls.crt";

/// Private key file name.
pub const KEY_FILE: &str = "tls.key";

/// CA certificate file name.
pub const CA_FILE: &str = "ca.crt";

/// Paths under the tool's home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeLayout {
    /// Root of the home directory.
    root: PathBuf,
}

impl HomeLayout {
    /// Creates a layout rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves the layout from an explicit override or the user's home.
    ///
    /// # Errors
    ///
    /// Returns an error if no override is given and the home directory
    /// cannot be determined.
    pub fn discover(root_override: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = root_override {
            return Ok(Self::new(root));
        }

        dirs::home_dir()
            .map(|home| Self::new(home.join(HOME_DIR_NAME)))
            .ok_or_else(|| ConfigError::NoHomeDirectory.into())
    }

    /// Root of the home directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Profile file path.
    #[must_use]
    pub fn profile_file(&self) -> PathBuf {
        self.root.join("config")
    }

    /// Certificate directory for a control plane.
    #[must_use]
    pub fn tls_dir(&self, control_plane_id: &str) -> PathBuf {
        self.root.join(TLS_DIR).join(control_plane_id)
    }

    /// Directory the module archive is extracted into.
    #[must_use]
    pub fn cloud_module_root(&self) -> &Path {
        &self.root
    }

    /// Extracted cloud lua module directory.
    #[must_use]
    pub fn cloud_module_dir(&self) -> PathBuf {
        self.root.join(CLOUD_MODULE_DIR_NAME)
    }

    /// Instance identifier file.
    #[must_use]
    pub fn instance_id_file(&self) -> PathBuf {
        self.root.join(INSTANCE_ID_FILE)
    }

    /// Rendered bare-metal installer script.
    #[must_use]
    pub fn install_script(&self) -> PathBuf {
        self.root.join("scripts").join("install.sh")
    }

    /// Merged bare-metal gateway configuration.
    #[must_use]
    pub fn bare_config_file(&self) -> PathBuf {
        self.root.join("apisix").join("config.yaml")
    }
}
