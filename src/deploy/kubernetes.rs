//! Cluster driver.
//!
//! Installs the gateway chart with the merged values file and manages the
//! namespace, certificate secret and module config map it depends on.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command::ExternalCommand;
use crate::config::{CA_FILE, CERT_FILE, KEY_FILE};
use crate::error::{CommandError, ConfigError, DeployError, Result};

use super::context::DeploymentContext;
use super::options::{
    CLOUD_MODULE_CONFIG_MAP_NAME, KubernetesOptions, KubernetesStopOptions, TLS_SECRET_NAME,
};
use super::report::{DeployReport, PodReport};
use super::{Target, ToolRunner};

/// Chart repository name.
const CHART_REPO_NAME: &str = "apisix";

/// Chart repository URL.
const CHART_REPO_URL: &str = "https://charts.apiseven.com";

/// Gateway chart reference.
const CHART: &str = "apisix/apisix";

/// Instance identifier file inside gateway pods.
const POD_INSTANCE_ID_FILE: &str = "/usr/local/apisix/conf/apisix.uid";

/// Name of the values flag that is replaced by the merged values file.
const VALUES_FLAG: &str = "--values";

/// Kind of cluster object managed around the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterResource {
    /// The target namespace.
    Namespace,
    /// The certificate secret.
    Secret,
    /// The module config map.
    ConfigMap,
}

impl ClusterResource {
    /// Resource name as understood by the cluster CLI.
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::Namespace => "ns",
            Self::Secret => "secret",
            Self::ConfigMap => "configmap",
        }
    }
}

impl fmt::Display for ClusterResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Namespace => write!(f, "namespace"),
            Self::Secret => write!(f, "secret"),
            Self::ConfigMap => write!(f, "config map"),
        }
    }
}

/// Operation applied to a cluster object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterAction {
    /// Create the object.
    Create,
    /// Delete the object.
    Delete,
}

/// Returns true if a failed `action` left the cluster in the wanted state
/// anyway, judging by the CLI's standard error.
#[must_use]
pub fn is_idempotent_outcome(action: ClusterAction, stderr: &str) -> bool {
    match action {
        ClusterAction::Create => stderr.contains("AlreadyExists"),
        ClusterAction::Delete => stderr.contains("NotFound"),
    }
}

/// Separates a `--values` argument from the other install arguments.
///
/// Both `--values=<file>` and `--values <file>` are recognized; the last
/// one wins.
///
/// # Errors
///
/// Returns an error if a `--values` flag carries no path.
pub fn split_values_arg(
    args: &[String],
) -> std::result::Result<(Option<PathBuf>, Vec<String>), ConfigError> {
    let mut values = None;
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let path = if let Some(path) = arg.strip_prefix("--values=") {
            Some(path)
        } else if arg == VALUES_FLAG {
            iter.next().map(String::as_str)
        } else {
            rest.push(arg.clone());
            continue;
        };

        match path {
            Some(path) if !path.is_empty() => values = Some(PathBuf::from(path)),
            _ => {
                return Err(ConfigError::invalid_option(
                    VALUES_FLAG,
                    "expects a values file path",
                ));
            }
        }
    }

    Ok((values, rest))
}

/// Bounded retries with a fixed backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    /// Total number of attempts.
    pub attempts: u32,
    /// Delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_secs(3),
        }
    }
}

/// Creates and deletes the cluster objects the chart depends on.
pub(crate) struct ClusterObjects<'a> {
    runner: &'a ToolRunner,
    namespace: &'a str,
}

impl<'a> ClusterObjects<'a> {
    pub(crate) const fn new(runner: &'a ToolRunner, namespace: &'a str) -> Self {
        Self { runner, namespace }
    }

    pub(crate) async fn create_namespace(&self) -> Result<()> {
        self.apply(
            ClusterAction::Create,
            ClusterResource::Namespace,
            self.namespace,
            Vec::new(),
        )
        .await
    }

    pub(crate) async fn create_tls_secret(&self, name: &str, tls_dir: &Path) -> Result<()> {
        let args = [CERT_FILE, KEY_FILE, CA_FILE]
            .iter()
            .map(|file| format!("--from-file={file}={}", tls_dir.join(file).display()))
            .collect();

        self.apply(ClusterAction::Create, ClusterResource::Secret, name, args)
            .await
    }

    pub(crate) async fn create_module_config_map(&self, name: &str, module_dir: &Path) -> Result<()> {
        let mut files = Vec::new();
        collect_files(module_dir, &mut files)?;
        files.sort();

        let args = files
            .iter()
            .filter_map(|path| {
                let relative = path.strip_prefix(module_dir).ok()?;
                Some(format!(
                    "--from-file={}={}",
                    config_map_key(relative),
                    path.display()
                ))
            })
            .collect();

        self.apply(ClusterAction::Create, ClusterResource::ConfigMap, name, args)
            .await
    }

    pub(crate) async fn delete(&self, resource: ClusterResource, name: &str) -> Result<()> {
        self.apply(ClusterAction::Delete, resource, name, Vec::new())
            .await
    }

    async fn apply(
        &self,
        action: ClusterAction,
        resource: ClusterResource,
        name: &str,
        extra: Vec<String>,
    ) -> Result<()> {
        let verb = match action {
            ClusterAction::Create => "create",
            ClusterAction::Delete => "delete",
        };

        let mut cmd = self.runner.command(&self.runner.tools().kubectl);
        cmd.append_args([verb, resource.kind()]);
        if resource == ClusterResource::Secret && action == ClusterAction::Create {
            cmd.append_args(["generic"]);
        }
        cmd.append_args([name]);
        if resource != ClusterResource::Namespace {
            cmd.append_args(["--namespace", self.namespace]);
        }
        cmd.append_args(extra);

        match self.runner.run(&mut cmd).await {
            Ok(output) => {
                debug!("{}", output.stdout.trim_end());
                Ok(())
            }
            Err(e) if e.stderr().is_some_and(|s| is_idempotent_outcome(action, s)) => {
                match action {
                    ClusterAction::Create => info!("{resource} {name} already exists"),
                    ClusterAction::Delete => info!("{resource} {name} does not exist"),
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Config map key for a module file: the relative path with `/` replaced.
fn config_map_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("__")
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// Drives the cluster package manager and CLI.
#[derive(Debug, Clone)]
pub struct KubernetesDriver<'a> {
    /// External tool runner.
    runner: &'a ToolRunner,
    /// Retries for post-install discovery.
    retry: RetryPolicy,
}

impl<'a> KubernetesDriver<'a> {
    /// Creates a driver.
    #[must_use]
    pub fn new(runner: &'a ToolRunner) -> Self {
        Self {
            runner,
            retry: RetryPolicy::default(),
        }
    }

    #[cfg(test)]
    pub(crate) const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Installs the chart and reports the resulting cluster objects.
    ///
    /// # Errors
    ///
    /// Returns an error if adding the repository or installing the chart
    /// fails. Discovery failures after the install are only logged.
    pub async fn deploy(&self, ctx: &DeploymentContext, opts: &KubernetesOptions) -> Result<DeployReport> {
        let helm = &self.runner.tools().helm;

        let mut repo_add = self.runner.command(helm);
        repo_add.append_args(["repo", "add", CHART_REPO_NAME, CHART_REPO_URL]);
        self.runner.execute(&mut repo_add).await?;

        let mut repo_update = self.runner.command(helm);
        repo_update.append_args(["repo", "update"]);
        self.runner.execute(&mut repo_update).await?;

        let mut install = self.install_command(ctx, opts)?;
        self.runner.execute(&mut install).await?;
        info!("Installed release {} in namespace {}", opts.release, opts.namespace);

        let mut report = DeployReport::new(Target::Kubernetes, ctx, self.runner.is_dry_run());
        if !self.runner.is_dry_run() {
            self.discover(opts, &mut report).await;
        }
        Ok(report)
    }

    /// Assembles the `helm install` invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the context carries no merged values file or the
    /// install arguments hold a dangling `--values`.
    pub fn install_command(
        &self,
        ctx: &DeploymentContext,
        opts: &KubernetesOptions,
    ) -> Result<ExternalCommand> {
        let values = ctx
            .config_file
            .as_ref()
            .ok_or_else(|| DeployError::internal("merged values file is missing"))?;
        let (_, extra) = split_values_arg(&opts.install_args)?;

        let mut cmd = self.runner.command(&self.runner.tools().helm);
        cmd.append_args(["install", opts.release.as_str(), CHART])
            .append_args(["--namespace", opts.namespace.as_str()])
            .append_args([String::from(VALUES_FLAG), values.display().to_string()])
            .append_args(extra);
        Ok(cmd)
    }

    /// Uninstalls the chart and deletes the objects created for it.
    ///
    /// # Errors
    ///
    /// Returns the first failing invocation.
    pub async fn stop(&self, opts: &KubernetesStopOptions) -> Result<()> {
        let mut uninstall = self.runner.command(&self.runner.tools().helm);
        uninstall.append_args(["uninstall", opts.release.as_str(), "--namespace", opts.namespace.as_str()]);
        self.runner.execute(&mut uninstall).await?;

        let cluster = ClusterObjects::new(self.runner, &opts.namespace);
        cluster
            .delete(ClusterResource::ConfigMap, CLOUD_MODULE_CONFIG_MAP_NAME)
            .await?;
        cluster.delete(ClusterResource::Secret, TLS_SECRET_NAME).await?;

        info!("Uninstalled release {} from namespace {}", opts.release, opts.namespace);
        Ok(())
    }

    /// Fills the report with the deployment, service and pods of the release.
    async fn discover(&self, opts: &KubernetesOptions, report: &mut DeployReport) {
        let selector = format!("app.kubernetes.io/instance={}", opts.release);

        match self.get_names(opts, "deployment", &selector, "{.items[0].metadata.name}").await {
            Ok(name) => report.deployment = Some(name),
            Err(e) => warn!("Could not find gateway deployment: {e}"),
        }

        match self.get_names(opts, "service", &selector, "{.items[0].metadata.name}").await {
            Ok(name) => report.service = Some(name),
            Err(e) => warn!("Could not find gateway service: {e}"),
        }

        let pods = match self.get_names(opts, "pods", &selector, "{.items[*].metadata.name}").await {
            Ok(names) => names,
            Err(e) => {
                warn!("Could not list gateway pods: {e}");
                return;
            }
        };

        for pod in pods.split_whitespace() {
            let instance_id = match self.pod_instance_id(opts, pod).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("Could not read instance id of pod {pod}: {e}");
                    None
                }
            };
            report.pods.push(PodReport {
                name: pod.to_string(),
                instance_id,
            });
        }
    }

    /// Queries object names with a jsonpath, retrying until one shows up.
    async fn get_names(
        &self,
        opts: &KubernetesOptions,
        kind: &str,
        selector: &str,
        jsonpath: &str,
    ) -> std::result::Result<String, CommandError> {
        self.retrying(move || async move {
            let mut cmd = self.runner.command(&self.runner.tools().kubectl);
            cmd.append_args(["get", kind, "--namespace", opts.namespace.as_str(), "-l", selector])
                .append_args([String::from("-o"), format!("jsonpath={jsonpath}")]);
            let output = self.runner.run(&mut cmd).await?;
            non_empty(&cmd, output.stdout)
        })
        .await
    }

    /// Waits for a pod to be ready and reads its instance identifier.
    async fn pod_instance_id(
        &self,
        opts: &KubernetesOptions,
        pod: &str,
    ) -> std::result::Result<String, CommandError> {
        let kubectl = &self.runner.tools().kubectl;

        let mut wait = self.runner.command(kubectl);
        wait.append_args([
            String::from("wait"),
            String::from("--for=condition=Ready"),
            format!("pod/{pod}"),
            String::from("--namespace"),
            opts.namespace.clone(),
            format!("--timeout={}s", opts.wait_timeout.as_secs()),
        ]);
        self.runner.execute(&mut wait).await?;

        self.retrying(move || async move {
            let mut cat = self.runner.command(kubectl);
            cat.append_args(["exec", pod, "--namespace", opts.namespace.as_str(), "--"])
                .append_args(["cat", POD_INSTANCE_ID_FILE]);
            let output = self.runner.run(&mut cat).await?;
            non_empty(&cat, output.stdout)
        })
        .await
    }

    /// Runs `attempt` until it succeeds, the policy is exhausted or the
    /// context is cancelled.
    async fn retrying<F, Fut, T>(&self, mut attempt: F) -> std::result::Result<T, CommandError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, CommandError>>,
    {
        let mut tries = 1;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e @ (CommandError::Cancelled { .. } | CommandError::TimedOut { .. })) => {
                    return Err(e);
                }
                Err(e) if tries >= self.retry.attempts => return Err(e),
                Err(e) => {
                    debug!("Attempt {tries}/{} failed: {e}", self.retry.attempts);
                    tries += 1;

                    let token = self.runner.exec().token();
                    tokio::select! {
                        () = tokio::time::sleep(self.retry.backoff) => {}
                        () = token.cancelled() => {
                            return Err(CommandError::Cancelled {
                                program: self.runner.tools().kubectl.clone(),
                            });
                        }
                    }
                }
            }
        }
    }
}

fn non_empty(
    cmd: &ExternalCommand,
    stdout: String,
) -> std::result::Result<String, CommandError> {
    let value = stdout.trim().to_string();
    if value.is_empty() {
        return Err(CommandError::NonZeroExit {
            program: cmd.program().to_string(),
            status: String::from("empty output"),
            stdout,
            stderr: String::from("no matching object yet"),
        });
    }
    Ok(value)
}
