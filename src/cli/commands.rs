//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::{
    BareOptions, BareStopOptions, DEFAULT_IMAGE, DEFAULT_NAMESPACE, DEFAULT_RELEASE,
    DEFAULT_VERSION, DeployRequest, DockerOptions, DockerStopOptions, KubernetesOptions,
    KubernetesStopOptions, StopRequest, ToolPaths,
};
use crate::render::DEFAULT_INSTALLER_REPO_URL;

/// Environment variable overriding the home directory.
pub const HOME_ENV: &str = "API7_CLOUD_HOME";

/// cloud-cli - Deploy API gateway instances connected to the cloud control plane.
#[derive(Parser, Debug)]
#[command(name = "cloud-cli")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Home directory holding profiles, certificates and modules.
    #[arg(long, global = true, env = HOME_ENV)]
    pub home: Option<PathBuf>,

    /// Print external commands instead of running them.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Timeout in seconds for each external command.
    #[arg(long, global = true, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// External tool locations.
    #[command(flatten)]
    pub tools: ToolArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy a gateway instance.
    Deploy {
        /// Deployment target.
        #[command(subcommand)]
        target: DeployTarget,
    },

    /// Stop a deployed gateway instance.
    Stop {
        /// Deployment target.
        #[command(subcommand)]
        target: StopTarget,
    },

    /// Save control plane credentials to a profile.
    Configure {
        /// Profile name.
        #[arg(long, default_value = "default")]
        profile: String,

        /// Control plane API address.
        #[arg(long)]
        addr: Option<String>,

        /// Access token.
        #[arg(long)]
        token: String,

        /// Make this the default profile.
        #[arg(long)]
        default: bool,
    },
}

/// Deployment targets.
#[derive(Subcommand, Debug)]
pub enum DeployTarget {
    /// Run the gateway in a Docker container.
    Docker(DockerArgs),
    /// Install the gateway on this host.
    Bare(BareArgs),
    /// Install the gateway into a Kubernetes cluster with Helm.
    Kubernetes(KubernetesArgs),
}

/// Teardown targets.
#[derive(Subcommand, Debug)]
pub enum StopTarget {
    /// Stop the gateway container.
    Docker {
        /// Container name.
        #[arg(long)]
        name: Option<String>,

        /// Remove the container after stopping it.
        #[arg(long)]
        rm: bool,
    },
    /// Stop the gateway on this host.
    Bare {
        /// Remove the gateway package.
        #[arg(long)]
        uninstall: bool,
    },
    /// Uninstall the gateway release from the cluster.
    Kubernetes {
        /// Helm release name.
        #[arg(long, default_value = DEFAULT_RELEASE)]
        name: String,

        /// Namespace the release lives in.
        #[arg(long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },
}

/// Arguments of `deploy docker`.
#[derive(Args, Debug)]
pub struct DockerArgs {
    /// Gateway image.
    #[arg(long, default_value = DEFAULT_IMAGE)]
    pub apisix_image: String,

    /// Container and host name.
    #[arg(long)]
    pub name: Option<String>,

    /// Host port for HTTP traffic.
    #[arg(long, default_value_t = 9080)]
    pub http_host_port: u16,

    /// Host port for HTTPS traffic.
    #[arg(long, default_value_t = 9443)]
    pub https_host_port: u16,

    /// Extra `docker run` argument as flag=value; repeatable.
    #[arg(long = "docker-run-arg", allow_hyphen_values = true)]
    pub docker_run_args: Vec<String>,

    /// Instance identifier.
    #[arg(long)]
    pub instance_id: Option<String>,

    /// Gateway configuration merged over the control plane defaults.
    #[arg(long)]
    pub apisix_config: Option<PathBuf>,
}

/// Arguments of `deploy bare`.
#[derive(Args, Debug)]
pub struct BareArgs {
    /// Gateway package version.
    #[arg(long, default_value = DEFAULT_VERSION)]
    pub apisix_version: String,

    /// Package repository installer URL.
    #[arg(long, default_value = DEFAULT_INSTALLER_REPO_URL)]
    pub installer_repo_url: String,

    /// Directory holding etcd client certificates.
    #[arg(long)]
    pub etcd_cert_dir: Option<PathBuf>,

    /// Instance identifier.
    #[arg(long)]
    pub instance_id: Option<String>,

    /// Reload an already installed gateway.
    #[arg(long)]
    pub reload: bool,

    /// Gateway configuration merged over the control plane defaults.
    #[arg(long)]
    pub apisix_config: Option<PathBuf>,
}

/// Arguments of `deploy kubernetes`.
#[derive(Args, Debug)]
pub struct KubernetesArgs {
    /// Helm release name.
    #[arg(long, default_value = DEFAULT_RELEASE)]
    pub name: String,

    /// Namespace to deploy into.
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Gateway image repository.
    #[arg(long, default_value = "apache/apisix")]
    pub apisix_image_repo: String,

    /// Gateway image tag.
    #[arg(long, default_value = "2.15.0-centos")]
    pub apisix_image_tag: String,

    /// Number of gateway replicas.
    #[arg(long, default_value_t = 1)]
    pub replica_count: u32,

    /// Extra `helm install` argument; repeatable.
    #[arg(long = "helm-install-arg", allow_hyphen_values = true)]
    pub helm_install_args: Vec<String>,

    /// Helm values merged over the control plane defaults.
    #[arg(long)]
    pub apisix_config: Option<PathBuf>,

    /// Seconds to wait for each gateway pod to become ready.
    #[arg(long, default_value_t = 60)]
    pub wait_timeout: u64,
}

/// Locations of the external tools.
#[derive(Args, Debug, Clone)]
pub struct ToolArgs {
    /// Docker CLI.
    #[arg(long = "docker-cli", global = true, default_value = "docker")]
    pub docker: String,

    /// Kubernetes CLI.
    #[arg(long = "kubectl-cli", global = true, default_value = "kubectl")]
    pub kubectl: String,

    /// Helm CLI.
    #[arg(long = "helm-cli", global = true, default_value = "helm")]
    pub helm: String,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Per-command timeout, if one was given.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

impl From<ToolArgs> for ToolPaths {
    fn from(args: ToolArgs) -> Self {
        Self {
            docker: args.docker,
            kubectl: args.kubectl,
            helm: args.helm,
            ..Self::default()
        }
    }
}

impl From<DeployTarget> for DeployRequest {
    fn from(target: DeployTarget) -> Self {
        match target {
            DeployTarget::Docker(args) => Self::Docker(DockerOptions {
                image: args.apisix_image,
                name: args.name,
                http_port: args.http_host_port,
                https_port: args.https_host_port,
                run_args: args.docker_run_args,
                instance_id: args.instance_id,
                override_config: args.apisix_config,
            }),
            DeployTarget::Bare(args) => Self::Bare(BareOptions {
                version: args.apisix_version,
                installer_repo_url: args.installer_repo_url,
                etcd_cert_dir: args.etcd_cert_dir,
                instance_id: args.instance_id,
                reload: args.reload,
                override_config: args.apisix_config,
            }),
            DeployTarget::Kubernetes(args) => Self::Kubernetes(KubernetesOptions {
                release: args.name,
                namespace: args.namespace,
                image_repository: args.apisix_image_repo,
                image_tag: args.apisix_image_tag,
                replicas: args.replica_count,
                install_args: args.helm_install_args,
                override_config: args.apisix_config,
                wait_timeout: Duration::from_secs(args.wait_timeout),
            }),
        }
    }
}

impl From<StopTarget> for StopRequest {
    fn from(target: StopTarget) -> Self {
        match target {
            StopTarget::Docker { name, rm } => {
                Self::Docker(DockerStopOptions { name, remove: rm })
            }
            StopTarget::Bare { uninstall } => Self::Bare(BareStopOptions { uninstall }),
            StopTarget::Kubernetes { name, namespace } => {
                Self::Kubernetes(KubernetesStopOptions {
                    release: name,
                    namespace,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("cloud-cli").chain(args.iter().copied()))
            .expect("parse")
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_deploy_docker_defaults() {
        let cli = parse(&["deploy", "docker", "--name", "gw"]);
        let Commands::Deploy { target } = cli.command else {
            panic!("expected deploy");
        };

        let DeployRequest::Docker(opts) = DeployRequest::from(target) else {
            panic!("expected docker request");
        };
        assert_eq!(opts.image, DEFAULT_IMAGE);
        assert_eq!(opts.container_name(), "gw");
        assert_eq!((opts.http_port, opts.https_port), (9080, 9443));
    }

    #[test]
    fn test_helm_install_args_keep_hyphens() {
        let cli = parse(&[
            "--dry-run",
            "deploy",
            "kubernetes",
            "--helm-install-arg",
            "--values=/tmp/v.yaml",
            "--helm-install-arg",
            "--atomic",
        ]);
        assert!(cli.dry_run);

        let Commands::Deploy { target } = cli.command else {
            panic!("expected deploy");
        };
        let DeployRequest::Kubernetes(opts) = DeployRequest::from(target) else {
            panic!("expected kubernetes request");
        };
        assert_eq!(opts.install_args, vec!["--values=/tmp/v.yaml", "--atomic"]);
        assert_eq!(opts.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_zero_timeout_means_none() {
        assert_eq!(parse(&["--timeout", "0", "stop", "bare"]).command_timeout(), None);
        assert_eq!(
            parse(&["--timeout", "5", "stop", "bare"]).command_timeout(),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_stop_docker_maps_rm() {
        let cli = parse(&["stop", "docker", "--rm"]);
        let Commands::Stop { target } = cli.command else {
            panic!("expected stop");
        };
        let StopRequest::Docker(opts) = StopRequest::from(target) else {
            panic!("expected docker request");
        };
        assert!(opts.remove);
        assert_eq!(opts.container_name(), "apisix");
    }
}
