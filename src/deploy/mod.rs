//! Deployment orchestration.
//!
//! A deployment runs in two phases. The pre-run phase ([`ContextBuilder`])
//! fetches and caches everything the gateway needs from the control plane
//! and renders the target configuration. The run phase hands the resulting
//! [`DeploymentContext`] to one of the target drivers, which translate it
//! into external tool invocations.

mod bare;
mod context;
mod docker;
mod kubernetes;
mod options;
mod report;

use serde::Serialize;
use std::fmt;
use tracing::info;

use crate::cloud::ControlPlane;
use crate::command::{CommandOutput, ExecContext, ExternalCommand};
use crate::config::HomeLayout;
use crate::error::{CommandError, Result};

pub use bare::BareDriver;
pub use context::{ContextBuilder, DeploymentContext};
pub use docker::DockerDriver;
pub use kubernetes::{
    ClusterAction, ClusterResource, KubernetesDriver, is_idempotent_outcome, split_values_arg,
};
pub use options::{
    BareOptions, BareStopOptions, CLOUD_MODULE_CONFIG_MAP_NAME, DEFAULT_CONTAINER_NAME,
    DEFAULT_IMAGE, DEFAULT_NAMESPACE, DEFAULT_RELEASE, DEFAULT_VERSION, DockerOptions,
    DockerStopOptions, KubernetesOptions, KubernetesStopOptions, TLS_SECRET_NAME, ToolPaths,
};
pub use report::{DeployReport, PodReport};

/// Deployment target environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Container runtime.
    Docker,
    /// Raw host.
    Bare,
    /// Container orchestration cluster.
    Kubernetes,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::Bare => write!(f, "bare"),
            Self::Kubernetes => write!(f, "kubernetes"),
        }
    }
}

/// A deployment request for one target.
#[derive(Debug, Clone)]
pub enum DeployRequest {
    /// Deploy into the container runtime.
    Docker(DockerOptions),
    /// Install on the local host.
    Bare(BareOptions),
    /// Install into the cluster.
    Kubernetes(KubernetesOptions),
}

/// A teardown request for one target.
#[derive(Debug, Clone)]
pub enum StopRequest {
    /// Stop the container.
    Docker(DockerStopOptions),
    /// Stop the host gateway.
    Bare(BareStopOptions),
    /// Uninstall from the cluster.
    Kubernetes(KubernetesStopOptions),
}

/// Creates and runs external tool invocations.
///
/// In dry-run mode every invocation is printed instead of executed.
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    /// Program names of the external tools.
    tools: ToolPaths,
    /// Cancellation and deadline.
    exec: ExecContext,
    /// Print instead of execute.
    dry_run: bool,
}

impl ToolRunner {
    /// Creates a runner.
    #[must_use]
    pub const fn new(tools: ToolPaths, exec: ExecContext, dry_run: bool) -> Self {
        Self {
            tools,
            exec,
            dry_run,
        }
    }

    /// Program names of the external tools.
    #[must_use]
    pub const fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// The execution context.
    #[must_use]
    pub const fn exec(&self) -> &ExecContext {
        &self.exec
    }

    /// Returns true in dry-run mode.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Starts a new invocation of `program`.
    #[must_use]
    pub fn command(&self, program: &str) -> ExternalCommand {
        ExternalCommand::new(program, self.dry_run)
    }

    /// Runs `cmd` and returns its output.
    ///
    /// # Errors
    ///
    /// Returns the invocation error.
    pub async fn run(&self, cmd: &mut ExternalCommand) -> std::result::Result<CommandOutput, CommandError> {
        if cmd.is_dry_run() {
            eprintln!("{cmd}");
        }
        cmd.run(&self.exec).await
    }

    /// Runs `cmd`, logging its output.
    ///
    /// # Errors
    ///
    /// Returns the invocation error.
    pub async fn execute(&self, cmd: &mut ExternalCommand) -> std::result::Result<(), CommandError> {
        if cmd.is_dry_run() {
            eprintln!("{cmd}");
        }
        cmd.execute(&self.exec).await
    }
}

/// Runs the pre-run phase and the target driver for `request`.
///
/// # Errors
///
/// Returns the first failing step; nothing after it runs.
pub async fn deploy(
    client: &dyn ControlPlane,
    layout: &HomeLayout,
    runner: &ToolRunner,
    request: &DeployRequest,
) -> Result<DeployReport> {
    let builder = ContextBuilder::new(client, layout, runner);

    match request {
        DeployRequest::Docker(opts) => {
            let ctx = builder.for_docker(opts).await?;
            info!("Pre-run phase complete, starting container");
            DockerDriver::new(runner).deploy(&ctx, opts).await
        }
        DeployRequest::Bare(opts) => {
            let ctx = builder.for_bare(opts).await?;
            info!("Pre-run phase complete, running installer");
            BareDriver::new(runner, layout).deploy(&ctx, opts).await
        }
        DeployRequest::Kubernetes(opts) => {
            let ctx = builder.for_kubernetes(opts).await?;
            info!("Pre-run phase complete, installing chart");
            KubernetesDriver::new(runner).deploy(&ctx, opts).await
        }
    }
}

/// Runs the teardown sequence for `request`.
///
/// # Errors
///
/// Returns the first failing invocation.
pub async fn stop(runner: &ToolRunner, request: &StopRequest) -> Result<()> {
    match request {
        StopRequest::Docker(opts) => DockerDriver::new(runner).stop(opts).await,
        StopRequest::Bare(opts) => BareDriver::stop(runner, opts).await,
        StopRequest::Kubernetes(opts) => KubernetesDriver::new(runner).stop(opts).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::testing::module_archive;
    use crate::cloud::CloudClient;
    use crate::config::{CA_FILE, Credentials};
    use rcgen::{CertificateParams, KeyPair};
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ok(payload: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "status": { "code": 0, "message": "OK" },
            "payload": payload,
        }))
    }

    async fn control_plane_server() -> MockServer {
        let server = MockServer::start().await;

        let mut params =
            CertificateParams::new(vec![String::from("gateway.local")]).expect("params");
        params.not_after = rcgen::date_time_ymd(2099, 1, 1);
        let key = KeyPair::generate().expect("key");
        let certificate = params.self_signed(&key).expect("cert").pem();

        Mock::given(method("GET"))
            .and(path("/api/v1/user/me"))
            .respond_with(ok(json!({ "id": "u1", "org_ids": ["org-1"] })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/orgs/org-1/controlplanes"))
            .respond_with(ok(json!({
                "list": [{ "id": "cp-1", "name": "default", "domain": "cp-1.example.com", "org_id": "org-1" }],
                "count": 1
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/controlplanes/cp-1/dp_certificate"))
            .respond_with(ok(json!({
                "certificate": certificate,
                "private_key": key.serialize_pem(),
                "ca_certificate": "CA",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/assets/cloud_lua_module.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(module_archive()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/controlplanes/cp-1/startup_config_tem"))
            .and(query_param("task_type", "apisix"))
            .respond_with(ok(json!({
                "configuration": "apisix:\n  ssl:\n    ssl_trusted_certificate: {{ .TLSDir }}/ca.crt\n  extra_lua_path: {{ .CloudModuleDir }}/?.lua\n"
            })))
            .mount(&server)
            .await;

        server
    }

    #[test]
    fn test_target_display() {
        assert_eq!(Target::Docker.to_string(), "docker");
        assert_eq!(Target::Bare.to_string(), "bare");
        assert_eq!(
            serde_json::to_value(Target::Kubernetes).expect("json"),
            json!("kubernetes")
        );
    }

    #[tokio::test]
    async fn test_bare_dry_run_end_to_end() {
        let server = control_plane_server().await;
        let home = TempDir::new().expect("tempdir");
        let layout = HomeLayout::new(home.path());
        let client = CloudClient::new(&Credentials {
            profile: String::from("test"),
            address: server.uri(),
            token: String::from("secret"),
        })
        .expect("client");
        let runner = ToolRunner::new(ToolPaths::default(), ExecContext::default(), true);

        let request = DeployRequest::Bare(BareOptions {
            instance_id: Some(String::from("gw-1")),
            ..BareOptions::default()
        });
        let report = deploy(&client, &layout, &runner, &request).await.expect("deploy");

        assert_eq!(report.target, Target::Bare);
        assert!(report.dry_run);
        assert_eq!(report.control_plane.id, "cp-1");
        assert_eq!(report.instance_id.as_deref(), Some("gw-1"));

        let config = std::fs::read_to_string(layout.bare_config_file()).expect("config");
        let doc: serde_yaml::Value = serde_yaml::from_str(&config).expect("yaml");
        let expected = layout.tls_dir("cp-1").join(CA_FILE).display().to_string();
        assert_eq!(
            doc["apisix"]["ssl"]["ssl_trusted_certificate"].as_str(),
            Some(expected.as_str())
        );

        assert!(layout.install_script().exists());
        assert!(layout.cloud_module_dir().join("apisix/cli/ops.lua").exists());

        // Cached certificate and module are reused.
        deploy(&client, &layout, &runner, &request).await.expect("redeploy");
    }

    #[tokio::test]
    async fn test_stop_dry_run_runs_nothing() {
        let tools = ToolPaths {
            docker: String::from("/nonexistent/docker"),
            ..ToolPaths::default()
        };
        let runner = ToolRunner::new(tools, ExecContext::default(), true);
        let request = StopRequest::Docker(DockerStopOptions {
            name: None,
            remove: true,
        });
        stop(&runner, &request).await.expect("stop");
    }
}
