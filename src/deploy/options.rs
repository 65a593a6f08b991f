//! Per-target deployment options.

use std::path::PathBuf;
use std::time::Duration;

use crate::render::DEFAULT_INSTALLER_REPO_URL;

/// Container and host name used when none is given.
pub const DEFAULT_CONTAINER_NAME: &str = "apisix";

/// Default gateway image for the container target.
pub const DEFAULT_IMAGE: &str = "apache/apisix:2.15.0-centos";

/// Default gateway package version for the bare-metal target.
pub const DEFAULT_VERSION: &str = "2.15.0";

/// Default Helm release name.
pub const DEFAULT_RELEASE: &str = "apisix";

/// Default cluster namespace.
pub const DEFAULT_NAMESPACE: &str = "apisix";

/// Secret holding the certificate triple in the cluster.
pub const TLS_SECRET_NAME: &str = "cloud-ssl";

/// Config map holding the cloud lua module in the cluster.
pub const CLOUD_MODULE_CONFIG_MAP_NAME: &str = "cloud-module";

/// Program names of the external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// Container runtime CLI.
    pub docker: String,
    /// Cluster CLI.
    pub kubectl: String,
    /// Cluster package manager.
    pub helm: String,
    /// Shell used for the install script.
    pub bash: String,
    /// Gateway CLI on bare-metal hosts.
    pub apisix: String,
    /// Host package manager.
    pub yum: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            docker: String::from("docker"),
            kubectl: String::from("kubectl"),
            helm: String::from("helm"),
            bash: String::from("bash"),
            apisix: String::from("apisix"),
            yum: String::from("yum"),
        }
    }
}

/// Options of the container target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerOptions {
    /// Gateway image.
    pub image: String,
    /// Container and host name.
    pub name: Option<String>,
    /// Host port published to the HTTP listener.
    pub http_port: u16,
    /// Host port published to the HTTPS listener.
    pub https_port: u16,
    /// Extra `flag=value` run arguments.
    pub run_args: Vec<String>,
    /// Operator-supplied instance identifier.
    pub instance_id: Option<String>,
    /// Operator override configuration file.
    pub override_config: Option<PathBuf>,
}

impl Default for DockerOptions {
    fn default() -> Self {
        Self {
            image: String::from(DEFAULT_IMAGE),
            name: None,
            http_port: 9080,
            https_port: 9443,
            run_args: Vec::new(),
            instance_id: None,
            override_config: None,
        }
    }
}

impl DockerOptions {
    /// The container name, falling back to the default.
    #[must_use]
    pub fn container_name(&self) -> &str {
        container_name(self.name.as_deref())
    }
}

/// Options of the bare-metal target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BareOptions {
    /// Gateway package version.
    pub version: String,
    /// Package repository installer URL.
    pub installer_repo_url: String,
    /// Directory holding etcd client certificates.
    pub etcd_cert_dir: Option<PathBuf>,
    /// Operator-supplied instance identifier.
    pub instance_id: Option<String>,
    /// Reload an existing installation instead of installing.
    pub reload: bool,
    /// Operator override configuration file.
    pub override_config: Option<PathBuf>,
}

impl Default for BareOptions {
    fn default() -> Self {
        Self {
            version: String::from(DEFAULT_VERSION),
            installer_repo_url: String::from(DEFAULT_INSTALLER_REPO_URL),
            etcd_cert_dir: None,
            instance_id: None,
            reload: false,
            override_config: None,
        }
    }
}

/// Options of the cluster target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubernetesOptions {
    /// Helm release name.
    pub release: String,
    /// Namespace to deploy into.
    pub namespace: String,
    /// Gateway image repository.
    pub image_repository: String,
    /// Gateway image tag.
    pub image_tag: String,
    /// Number of gateway replicas.
    pub replicas: u32,
    /// Extra `helm install` arguments.
    pub install_args: Vec<String>,
    /// Operator override values file.
    pub override_config: Option<PathBuf>,
    /// How long to wait for each pod to become ready.
    pub wait_timeout: Duration,
}

impl Default for KubernetesOptions {
    fn default() -> Self {
        Self {
            release: String::from(DEFAULT_RELEASE),
            namespace: String::from(DEFAULT_NAMESPACE),
            image_repository: String::from("apache/apisix"),
            image_tag: String::from("2.15.0-centos"),
            replicas: 1,
            install_args: Vec::new(),
            override_config: None,
            wait_timeout: Duration::from_secs(60),
        }
    }
}

/// Options of the container teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DockerStopOptions {
    /// Container name.
    pub name: Option<String>,
    /// Remove the container after stopping it.
    pub remove: bool,
}

impl DockerStopOptions {
    /// The container name, falling back to the default.
    #[must_use]
    pub fn container_name(&self) -> &str {
        container_name(self.name.as_deref())
    }
}

/// Options of the bare-metal teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BareStopOptions {
    /// Remove the gateway package after stopping it.
    pub uninstall: bool,
}

/// Options of the cluster teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubernetesStopOptions {
    /// Helm release name.
    pub release: String,
    /// Namespace the release lives in.
    pub namespace: String,
}

impl Default for KubernetesStopOptions {
    fn default() -> Self {
        Self {
            release: String::from(DEFAULT_RELEASE),
            namespace: String::from(DEFAULT_NAMESPACE),
        }
    }
}

fn container_name(name: Option<&str>) -> &str {
    name.filter(|n| !n.is_empty()).unwrap_or(DEFAULT_CONTAINER_NAME)
}
