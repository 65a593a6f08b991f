//! cloud-cli entrypoint.
//!
//! This is the main entrypoint for the cloud-cli command-line tool.

use std::path::Path;
use std::process::ExitCode;

use apisix_cloud_deploy::cli::{Cli, Commands, OutputFormatter};
use apisix_cloud_deploy::cloud::CloudClient;
use apisix_cloud_deploy::command::ExecContext;
use apisix_cloud_deploy::config::{
    DEFAULT_ADDRESS, HomeLayout, MODULE_URL_ENV, Profile, ProfileStore, load_dotenv,
};
use apisix_cloud_deploy::deploy::{self, DeployRequest, StopRequest, ToolRunner};
use apisix_cloud_deploy::error::Result;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code reported when the run was interrupted.
const EXIT_CANCELLED: u8 = 130;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_cancellation() => {
            warn!("Interrupted: {e}");
            ExitCode::from(EXIT_CANCELLED)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    load_dotenv(Path::new("."))?;

    let layout = HomeLayout::discover(cli.home.clone())?;
    debug!("Using home directory: {}", layout.root().display());

    let formatter = OutputFormatter::new(cli.output);
    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    let exec = ExecContext::new(token, cli.command_timeout());
    let runner = ToolRunner::new(cli.tools.into(), exec, cli.dry_run);

    match cli.command {
        Commands::Deploy { target } => {
            cmd_deploy(&layout, &runner, &target.into(), &formatter).await
        }
        Commands::Stop { target } => cmd_stop(&runner, &target.into(), &formatter).await,
        Commands::Configure {
            profile,
            addr,
            token,
            default,
        } => cmd_configure(&layout, profile, addr, token, default, &formatter),
    }
}

/// Deploy a gateway instance.
async fn cmd_deploy(
    layout: &HomeLayout,
    runner: &ToolRunner,
    request: &DeployRequest,
    formatter: &OutputFormatter,
) -> Result<()> {
    let credentials = ProfileStore::new(layout.profile_file()).resolve()?;
    info!(
        "Deploying with profile '{}' against {}",
        credentials.profile, credentials.address
    );

    let client = CloudClient::new(&credentials)?.with_module_url(std::env::var(MODULE_URL_ENV).ok());
    let report = deploy::deploy(&client, layout, runner, request).await?;

    eprintln!("{}", formatter.format_report(&report));
    Ok(())
}

/// Stop a gateway instance.
async fn cmd_stop(runner: &ToolRunner, request: &StopRequest, formatter: &OutputFormatter) -> Result<()> {
    deploy::stop(runner, request).await?;
    eprintln!("{}", formatter.success("Gateway stopped"));
    Ok(())
}

/// Save credentials to a profile.
fn cmd_configure(
    layout: &HomeLayout,
    name: String,
    address: Option<String>,
    token: String,
    make_default: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let store = ProfileStore::new(layout.profile_file());
    let mut file = store.load()?;

    let address = address
        .or_else(|| file.get(&name).map(|p| p.address.clone()))
        .unwrap_or_else(|| String::from(DEFAULT_ADDRESS));

    if make_default || file.default_profile.is_none() {
        file.default_profile = Some(name.clone());
    }
    file.upsert(Profile {
        name: name.clone(),
        address,
        token,
    });
    store.save(&file)?;

    eprintln!("{}", formatter.success(&format!("Profile '{name}' saved")));
    Ok(())
}

/// Cancels `token` on SIGINT or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    warn!("Shutdown signal received, cancelling running commands");
    token.cancel();
}
