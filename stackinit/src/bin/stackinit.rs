//! Container entrypoint.
//!
//! Runs the boot stages, then supervises every service process until one
//! exits (status 1) or the container is asked to stop (status 0).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use stackinit::gateway::GatewayGlue;
use stackinit::runtime::constants::supervision;
use stackinit::supervisor::{launch_plan, shutdown_signal};
use stackinit::{
    BootConfig, BootOptions, Environment, ProcessSupervisor, StackResult, SupervisorExit, run_boot,
};

#[derive(Debug, Parser)]
#[command(
    name = "stackinit",
    version,
    about = "Configure, bootstrap and supervise the cloud services"
)]
struct Args {
    /// Filesystem root every fixed path is resolved against.
    #[arg(long, default_value = "/")]
    root: PathBuf,

    /// Directory holding templates, schema bundles and the virtualenv.
    #[arg(long, default_value = "/app")]
    app_dir: PathBuf,

    #[arg(long, default_value_t = supervision::POLL_INTERVAL_SECS)]
    poll_interval_secs: u64,

    #[arg(long, default_value_t = supervision::GATEWAY_PORT)]
    gateway_port: u16,

    /// Run every boot stage and exit without launching services.
    #[arg(long)]
    configure_only: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    let env = Environment::from_process();

    let options = BootOptions {
        root: args.root,
        app_dir: args.app_dir,
        poll_interval_secs: args.poll_interval_secs,
        gateway_port: args.gateway_port,
        ..Default::default()
    };
    let config = match BootConfig::new(options, &env) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("stackinit: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let _guard = stackinit::logging::init_logging(&config.log_dir);

    match run(config, env, args.configure_only).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "stackinit exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Arc<BootConfig>, env: Environment, configure_only: bool) -> StackResult<()> {
    let report = run_boot(config.clone(), Arc::new(env)).await?;
    tracing::info!(
        started_at = %report.started_at,
        degraded = report.degraded.len(),
        "Boot complete"
    );
    if configure_only {
        return Ok(());
    }

    let glue = GatewayGlue::prepare(report.catalog.iter(), &config.venv_dir)?;
    let plan = launch_plan(&config, &report.catalog, Some(&glue));
    let mut supervisor = ProcessSupervisor::new(config.poll_interval).with_gateway(glue);
    if let Err(e) = supervisor.launch_all(&plan) {
        supervisor.shutdown();
        return Err(e);
    }

    let shutdown = async {
        if let Err(e) = shutdown_signal().await {
            tracing::warn!(error = %e, "Cannot install signal handlers, waiting forever");
            std::future::pending::<()>().await;
        }
    };
    match supervisor.run(shutdown).await? {
        SupervisorExit::Shutdown => {
            tracing::info!("All processes signalled, exiting");
            Ok(())
        }
    }
}
