//! Pre-run phase: builds the per-target deployment context.

use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::assets::{AssetFetcher, CertificateManager, InstanceIdStore};
use crate::cloud::{ConfigKind, ControlPlane, ControlPlaneRef};
use crate::config::{CLOUD_MODULE_DIR_NAME, ConfigMerger, ConfigTree, HomeLayout};
use crate::error::{DeployError, MergeError, PrepareStep, Result};
use crate::render::{GatewayFields, HelmFields, TemplateFields, render};

use super::kubernetes::{ClusterObjects, split_values_arg};
use super::options::{
    BareOptions, CLOUD_MODULE_CONFIG_MAP_NAME, DockerOptions, KubernetesOptions, TLS_SECRET_NAME,
};
use super::ToolRunner;

/// Cloud lua module path inside the gateway container.
pub(crate) const CONTAINER_MODULE_DIR: &str = "/usr/local/apisix/cloud_lua_module";

/// Certificate directory inside the gateway container or pod.
pub(crate) const CONTAINER_TLS_DIR: &str = "/cloud/tls";

/// Cloud lua module path inside gateway pods.
const POD_MODULE_DIR: &str = "/cloud_lua_module";

/// Everything a target driver needs to launch the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentContext {
    /// Control plane the instance registers with.
    pub control_plane: ControlPlaneRef,
    /// Host directory holding the certificate triple.
    pub tls_dir: PathBuf,
    /// Host directory holding the extracted cloud lua module.
    pub asset_dir: PathBuf,
    /// Serialized merged configuration, if any.
    pub merged_config: Option<Vec<u8>>,
    /// File the merged configuration was saved to.
    pub config_file: Option<PathBuf>,
    /// Gateway instance identifier (container and bare-metal targets).
    pub instance_id: Option<String>,
    /// File the instance identifier is persisted to.
    pub instance_id_file: Option<PathBuf>,
}

/// Runs the pre-run phase for a target.
#[derive(Clone, Copy)]
pub struct ContextBuilder<'a> {
    /// Control-plane collaborator.
    client: &'a dyn ControlPlane,
    /// Home directory layout.
    layout: &'a HomeLayout,
    /// External tool runner.
    runner: &'a ToolRunner,
}

/// Output of the steps shared by every target.
struct Fetched {
    control_plane: ControlPlaneRef,
    tls_dir: PathBuf,
    asset_dir: PathBuf,
    template: String,
}

impl<'a> ContextBuilder<'a> {
    /// Creates a builder.
    #[must_use]
    pub fn new(client: &'a dyn ControlPlane, layout: &'a HomeLayout, runner: &'a ToolRunner) -> Self {
        Self {
            client,
            layout,
            runner,
        }
    }

    /// Builds the context of the container target.
    ///
    /// # Errors
    ///
    /// Returns the first failing step, prefixed with its name.
    pub async fn for_docker(&self, opts: &DockerOptions) -> Result<DeploymentContext> {
        let fetched = self.fetch(ConfigKind::Gateway).await?;

        let fields = GatewayFields {
            cloud_module_dir: String::from(CONTAINER_MODULE_DIR),
            tls_dir: String::from(CONTAINER_TLS_DIR),
        };
        let tree = self.render_and_merge(&fetched.template, &fields, opts.override_config.as_deref())?;

        let merger = ConfigMerger::new();
        let (merged_config, config_file) = if tree.is_empty() {
            (None, None)
        } else {
            let bytes = merger
                .render(&tree)
                .map_err(|e| DeployError::at_step(PrepareStep::SaveConfig, e))?;
            let path = merger
                .save_to_temp_file(&tree, "apisix-config-")
                .map_err(|e| DeployError::at_step(PrepareStep::SaveConfig, e))?;
            (Some(bytes), Some(path))
        };

        let instance_id = self.instance_id(opts.instance_id.as_deref())?;

        Ok(DeploymentContext {
            control_plane: fetched.control_plane,
            tls_dir: fetched.tls_dir,
            asset_dir: fetched.asset_dir,
            merged_config,
            config_file,
            instance_id: Some(instance_id),
            instance_id_file: Some(self.layout.instance_id_file()),
        })
    }

    /// Builds the context of the bare-metal target.
    ///
    /// # Errors
    ///
    /// Returns the first failing step, prefixed with its name.
    pub async fn for_bare(&self, opts: &BareOptions) -> Result<DeploymentContext> {
        let fetched = self.fetch(ConfigKind::Gateway).await?;

        let fields = GatewayFields {
            cloud_module_dir: fetched.asset_dir.display().to_string(),
            tls_dir: fetched.tls_dir.display().to_string(),
        };
        let tree = self.render_and_merge(&fetched.template, &fields, opts.override_config.as_deref())?;

        let merger = ConfigMerger::new();
        let path = self.layout.bare_config_file();
        let bytes = merger
            .render(&tree)
            .map_err(|e| DeployError::at_step(PrepareStep::SaveConfig, e))?;
        merger
            .save_to_file(&tree, &path)
            .map_err(|e| DeployError::at_step(PrepareStep::SaveConfig, e))?;

        let instance_id = self.instance_id(opts.instance_id.as_deref())?;

        Ok(DeploymentContext {
            control_plane: fetched.control_plane,
            tls_dir: fetched.tls_dir,
            asset_dir: fetched.asset_dir,
            merged_config: Some(bytes),
            config_file: Some(path),
            instance_id: Some(instance_id),
            instance_id_file: Some(self.layout.instance_id_file()),
        })
    }

    /// Builds the context of the cluster target, creating the namespace,
    /// certificate secret and module config map along the way.
    ///
    /// # Errors
    ///
    /// Returns the first failing step, prefixed with its name.
    pub async fn for_kubernetes(&self, opts: &KubernetesOptions) -> Result<DeploymentContext> {
        let (values_arg, _) = split_values_arg(&opts.install_args)?;
        let fetched = self.fetch(ConfigKind::Helm).await?;

        let fields = HelmFields {
            cloud_module_dir: String::from(POD_MODULE_DIR),
            tls_dir: String::from(CONTAINER_TLS_DIR),
            tls_secret_name: String::from(TLS_SECRET_NAME),
            cloud_module_config_map_name: String::from(CLOUD_MODULE_CONFIG_MAP_NAME),
            image_repository: opts.image_repository.clone(),
            image_tag: opts.image_tag.clone(),
            replicas: opts.replicas,
        };

        let override_path = opts.override_config.clone().or(values_arg);
        let tree = self.render_and_merge(&fetched.template, &fields, override_path.as_deref())?;

        let merger = ConfigMerger::new();
        let bytes = merger
            .render(&tree)
            .map_err(|e| DeployError::at_step(PrepareStep::SaveConfig, e))?;
        let path = merger
            .save_to_temp_file(&tree, "helm-values-")
            .map_err(|e| DeployError::at_step(PrepareStep::SaveConfig, e))?;

        let cluster = ClusterObjects::new(self.runner, &opts.namespace);
        cluster
            .create_namespace()
            .await
            .map_err(|e| DeployError::at_step(PrepareStep::CreateNamespace, e))?;
        cluster
            .create_tls_secret(TLS_SECRET_NAME, &fetched.tls_dir)
            .await
            .map_err(|e| DeployError::at_step(PrepareStep::CreateSecret, e))?;
        cluster
            .create_module_config_map(CLOUD_MODULE_CONFIG_MAP_NAME, &fetched.asset_dir)
            .await
            .map_err(|e| DeployError::at_step(PrepareStep::CreateConfigMap, e))?;

        Ok(DeploymentContext {
            control_plane: fetched.control_plane,
            tls_dir: fetched.tls_dir,
            asset_dir: fetched.asset_dir,
            merged_config: Some(bytes),
            config_file: Some(path),
            instance_id: None,
            instance_id_file: None,
        })
    }

    /// Resolves the control plane, ensures the certificate and module, and
    /// fetches the startup configuration template.
    ///
    /// Each step is abandoned as soon as the run is cancelled.
    async fn fetch(&self, kind: ConfigKind) -> Result<Fetched> {
        let control_plane = self
            .step(PrepareStep::GetDefaultCluster, async {
                self.client.default_cluster().await
            })
            .await?;
        info!(id = %control_plane.id, domain = %control_plane.domain, "Using control plane");

        let certificates = CertificateManager::new(self.layout.clone());
        let tls_dir = self
            .step(
                PrepareStep::PrepareCertificate,
                certificates.ensure(self.client, &control_plane.id),
            )
            .await?;

        let assets = AssetFetcher::new(self.layout.clone());
        let asset_root = self
            .step(PrepareStep::DownloadModule, assets.fetch_and_extract(self.client))
            .await?;
        let asset_dir = asset_root.join(CLOUD_MODULE_DIR_NAME);

        let template = self
            .step(
                PrepareStep::GetStartupConfig,
                async { self.client.startup_config_template(&control_plane.id, kind).await },
            )
            .await?;
        debug!("Fetched {kind} startup config template ({} bytes)", template.len());

        Ok(Fetched {
            control_plane,
            tls_dir,
            asset_dir,
            template,
        })
    }

    /// Runs one pre-run step, racing it against cancellation.
    async fn step<T, E>(
        &self,
        step: PrepareStep,
        fut: impl Future<Output = std::result::Result<T, E>>,
    ) -> Result<T>
    where
        E: Into<DeployError>,
    {
        let token = self.runner.exec().token();
        tokio::select! {
            biased;
            () = token.cancelled() => Err(DeployError::at_step(step, DeployError::Cancelled)),
            result = fut => result.map_err(|e| DeployError::at_step(step, e)),
        }
    }

    /// Renders the essential configuration and merges the override over it.
    fn render_and_merge(
        &self,
        template: &str,
        fields: &dyn TemplateFields,
        override_path: Option<&Path>,
    ) -> Result<ConfigTree> {
        let essential =
            render(template, fields).map_err(|e| DeployError::at_step(PrepareStep::RenderConfig, e))?;

        let override_doc = override_path
            .map(|path| {
                debug!("Reading override configuration from {}", path.display());
                std::fs::read(path).map_err(|e| MergeError::Override {
                    message: format!("{}: {e}", path.display()),
                })
            })
            .transpose()
            .map_err(|e| DeployError::at_step(PrepareStep::MergeConfig, e))?;

        ConfigMerger::new()
            .merge(override_doc.as_deref(), Some(essential.as_bytes()))
            .map_err(|e| DeployError::at_step(PrepareStep::MergeConfig, e))
    }

    fn instance_id(&self, supplied: Option<&str>) -> Result<String> {
        InstanceIdStore::new(self.layout.instance_id_file())
            .resolve(supplied)
            .map_err(|e| DeployError::at_step(PrepareStep::PrepareInstanceId, e))
    }
}
