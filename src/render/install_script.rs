//! Bare-metal install script rendering.

use std::path::Path;
use tracing::debug;

use crate::config::set_mode;
use crate::error::Result;

use super::template::{TemplateFields, render};

/// Bundled install script template.
const INSTALL_SCRIPT_TEMPLATE: &str = include_str!("../../templates/install.sh");

/// Mode of the rendered script.
const SCRIPT_MODE: u32 = 0o755;

/// Default package repository installer.
pub const DEFAULT_INSTALLER_REPO_URL: &str =
    "https://repos.apiseven.com/packages/centos/apache-apisix-repo-1.0-1.noarch.rpm";

/// Values substituted into the install script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallScriptFields {
    /// Package repository installer URL.
    pub installer_repo_url: String,
    /// Host directory holding the certificate triple.
    pub tls_dir: String,
    /// Optional directory holding etcd client certificates.
    pub etcd_cert_dir: Option<String>,
    /// Rendered gateway configuration file.
    pub config_file: String,
    /// Host directory holding the cloud lua module.
    pub cloud_module_dir: String,
    /// Gateway package version.
    pub version: String,
    /// Optional pre-assigned instance identifier.
    pub instance_id: Option<String>,
    /// Reload an existing installation instead of installing.
    pub reload: bool,
}

impl TemplateFields for InstallScriptFields {
    /// Values are returned as single-quoted shell words.
    fn lookup(&self, name: &str) -> Option<String> {
        let value = match name {
            "InstallerRepoURL" => self.installer_repo_url.as_str(),
            "TLSDir" => self.tls_dir.as_str(),
            "EtcdCertDir" => self.etcd_cert_dir.as_deref().unwrap_or_default(),
            "ConfigFile" => self.config_file.as_str(),
            "CloudModuleDir" => self.cloud_module_dir.as_str(),
            "Version" => self.version.as_str(),
            "InstanceID" => self.instance_id.as_deref().unwrap_or_default(),
            "Reload" => {
                if self.reload {
                    "true"
                } else {
                    "false"
                }
            }
            _ => return None,
        };
        Some(shell_quote(value))
    }
}

/// Quotes `value` as a single shell word with no expansion.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Renders the bundled install script.
///
/// # Errors
///
/// Returns an error if the template cannot be rendered.
pub fn render_install_script(fields: &InstallScriptFields) -> Result<String> {
    Ok(render(INSTALL_SCRIPT_TEMPLATE, fields)?)
}

/// Renders the install script and writes it, executable, to `path`.
///
/// # Errors
///
/// Returns an error if rendering or writing fails.
pub fn write_install_script(fields: &InstallScriptFields, path: &Path) -> Result<()> {
    let script = render_install_script(fields)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, script)?;
    set_mode(path, SCRIPT_MODE)?;

    debug!("Wrote install script to {}", path.display());
    Ok(())
}
