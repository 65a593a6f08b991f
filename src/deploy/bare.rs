//! Bare-metal driver.
//!
//! Everything host-specific happens in the rendered install script; the
//! driver only persists it and hands it to the shell.

use tracing::info;

use crate::command::ExternalCommand;
use crate::config::HomeLayout;
use crate::error::{DeployError, Result};
use crate::render::{InstallScriptFields, write_install_script};

use super::context::DeploymentContext;
use super::options::{BareOptions, BareStopOptions};
use super::report::DeployReport;
use super::{Target, ToolRunner};

/// Gateway package name.
const PACKAGE: &str = "apisix";

/// Installs or reloads the gateway on the local host.
#[derive(Debug, Clone, Copy)]
pub struct BareDriver<'a> {
    /// External tool runner.
    runner: &'a ToolRunner,
    /// Home directory layout.
    layout: &'a HomeLayout,
}

impl<'a> BareDriver<'a> {
    /// Creates a driver.
    #[must_use]
    pub const fn new(runner: &'a ToolRunner, layout: &'a HomeLayout) -> Self {
        Self { runner, layout }
    }

    /// Renders the install script and runs it.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be written or exits
    /// unsuccessfully.
    pub async fn deploy(&self, ctx: &DeploymentContext, opts: &BareOptions) -> Result<DeployReport> {
        let mut cmd = self.install_command(ctx, opts)?;
        self.runner.execute(&mut cmd).await?;

        if opts.reload {
            info!("Reloaded gateway");
        } else {
            info!("Installed gateway {}", opts.version);
        }
        Ok(DeployReport::new(Target::Bare, ctx, self.runner.is_dry_run()))
    }

    /// Persists the install script and assembles its invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the context has no merged configuration file or
    /// the script cannot be written.
    pub fn install_command(&self, ctx: &DeploymentContext, opts: &BareOptions) -> Result<ExternalCommand> {
        let config_file = ctx
            .config_file
            .as_ref()
            .ok_or_else(|| DeployError::internal("merged configuration file is missing"))?;

        let fields = InstallScriptFields {
            installer_repo_url: opts.installer_repo_url.clone(),
            tls_dir: ctx.tls_dir.display().to_string(),
            etcd_cert_dir: opts.etcd_cert_dir.as_ref().map(|d| d.display().to_string()),
            config_file: config_file.display().to_string(),
            cloud_module_dir: ctx.asset_dir.display().to_string(),
            version: opts.version.clone(),
            instance_id: ctx.instance_id.clone(),
            reload: opts.reload,
        };

        let script = self.layout.install_script();
        write_install_script(&fields, &script)?;

        let mut cmd = self.runner.command(&self.runner.tools().bash);
        cmd.append_args([String::from("-c"), script.display().to_string()]);
        Ok(cmd)
    }

    /// Stops the gateway and optionally removes its package.
    ///
    /// # Errors
    ///
    /// Returns the first failing invocation.
    pub async fn stop(runner: &ToolRunner, opts: &BareStopOptions) -> Result<()> {
        let mut stop = runner.command(&runner.tools().apisix);
        stop.append_args(["stop"]);
        runner.execute(&mut stop).await?;

        if opts.uninstall {
            let mut remove = runner.command(&runner.tools().yum);
            remove.append_args(["remove", "-y", PACKAGE]);
            runner.execute(&mut remove).await?;
        }

        info!("Stopped gateway");
        Ok(())
    }
}
