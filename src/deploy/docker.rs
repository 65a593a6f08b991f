//! Container runtime driver.

use std::path::Path;
use tracing::info;

use crate::command::ExternalCommand;
use crate::error::{ConfigError, DeployError, Result};

use super::context::{CONTAINER_MODULE_DIR, CONTAINER_TLS_DIR, DeploymentContext};
use super::options::{DockerOptions, DockerStopOptions};
use super::report::DeployReport;
use super::{Target, ToolRunner};

/// Gateway configuration path inside the container.
const CONTAINER_CONFIG_FILE: &str = "/usr/local/apisix/conf/config.yaml";

/// Instance identifier path inside the container.
const CONTAINER_INSTANCE_ID_FILE: &str = "/usr/local/apisix/conf/apisix.uid";

/// Gateway CLI scripts replaced by their cloud lua module versions.
const CLI_OVERRIDES: [(&str, &str); 2] = [
    ("apisix/cli/ops.lua", "/usr/local/apisix/apisix/cli/ops.lua"),
    ("apisix/cli/env.lua", "/usr/local/apisix/apisix/cli/env.lua"),
];

/// HTTP listener port inside the container.
const CONTAINER_HTTP_PORT: u16 = 9080;

/// HTTPS listener port inside the container.
const CONTAINER_HTTPS_PORT: u16 = 9443;

/// Drives the container runtime CLI.
#[derive(Debug, Clone, Copy)]
pub struct DockerDriver<'a> {
    /// External tool runner.
    runner: &'a ToolRunner,
}

impl<'a> DockerDriver<'a> {
    /// Creates a driver.
    #[must_use]
    pub const fn new(runner: &'a ToolRunner) -> Self {
        Self { runner }
    }

    /// Starts the gateway container and looks up its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be started.
    pub async fn deploy(&self, ctx: &DeploymentContext, opts: &DockerOptions) -> Result<DeployReport> {
        let mut run = self.run_command(ctx, opts)?;
        self.runner.execute(&mut run).await?;

        let name = opts.container_name();
        let mut report = DeployReport::new(Target::Docker, ctx, self.runner.is_dry_run());

        let mut ps = self.ps_command(name);
        let output = self.runner.run(&mut ps).await?;

        if let Some(id) = output.stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
            info!("Started container {name} ({id})");
            report.container_id = Some(id.to_string());
        }
        Ok(report)
    }

    /// Assembles the `docker ps` lookup of the container named exactly `name`.
    #[must_use]
    pub fn ps_command(&self, name: &str) -> ExternalCommand {
        let mut ps = self.runner.command(&self.runner.tools().docker);
        ps.append_args([
            String::from("ps"),
            String::from("--filter"),
            format!("name=^{name}$"),
            String::from("--format"),
            String::from("{{.ID}}"),
        ]);
        ps
    }

    /// Assembles the `docker run` invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if an extra run argument is not `flag=value`.
    pub fn run_command(&self, ctx: &DeploymentContext, opts: &DockerOptions) -> Result<ExternalCommand> {
        let mut cmd = self.runner.command(&self.runner.tools().docker);
        cmd.append_args(["run", "--detach"]);

        if let Some(config) = ctx.config_file.as_deref().filter(|_| ctx.merged_config.is_some()) {
            add_mount(&mut cmd, config, CONTAINER_CONFIG_FILE, true);
        }
        add_mount(&mut cmd, &ctx.asset_dir, CONTAINER_MODULE_DIR, true);
        add_mount(&mut cmd, &ctx.tls_dir, CONTAINER_TLS_DIR, true);

        let instance_id_file = ctx
            .instance_id_file
            .as_deref()
            .ok_or_else(|| DeployError::internal("instance id file is missing"))?;
        add_mount(&mut cmd, instance_id_file, CONTAINER_INSTANCE_ID_FILE, false);

        for (source, target) in CLI_OVERRIDES {
            add_mount(&mut cmd, &ctx.asset_dir.join(source), target, true);
        }

        for arg in &opts.run_args {
            let (flag, value) = arg.split_once('=').ok_or_else(|| {
                ConfigError::invalid_option(
                    "docker-run-arg",
                    format!("expected flag=value, got '{arg}'"),
                )
            })?;
            cmd.append_args([flag, value]);
        }

        let name = opts.container_name();
        cmd.append_args([
            String::from("-p"),
            format!("{}:{CONTAINER_HTTP_PORT}", opts.http_port),
            String::from("-p"),
            format!("{}:{CONTAINER_HTTPS_PORT}", opts.https_port),
        ]);
        cmd.append_args(["--name", name, "--hostname", name, opts.image.as_str()]);

        Ok(cmd)
    }

    /// Stops, and optionally removes, the gateway container.
    ///
    /// # Errors
    ///
    /// Returns the first failing invocation.
    pub async fn stop(&self, opts: &DockerStopOptions) -> Result<()> {
        let docker = &self.runner.tools().docker;
        let name = opts.container_name();

        let mut stop = self.runner.command(docker);
        stop.append_args(["stop", name]);
        self.runner.execute(&mut stop).await?;

        if opts.remove {
            let mut rm = self.runner.command(docker);
            rm.append_args(["rm", name]);
            self.runner.execute(&mut rm).await?;
        }

        info!("Stopped container {name}");
        Ok(())
    }
}

fn add_mount(cmd: &mut ExternalCommand, source: &Path, target: &str, readonly: bool) {
    let mut spec = format!("type=bind,source={},target={target}", source.display());
    if readonly {
        spec.push_str(",readonly");
    }
    cmd.append_args([String::from("--mount"), spec]);
}
