use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use kubecycle::cli::Cli;
use kubecycle::cluster::ClusterSession;
use kubecycle::commands::{Runner, wait_label};
use kubecycle::config::KubecycleConfig;
use kubecycle::error::{FailureKind, KubecycleError};
use kubecycle::{logging, ui};

/// sysexits EX_CONFIG
const EXIT_CONFIG: u8 = 78;
/// sysexits EX_TEMPFAIL; the caller may retry.
const EXIT_RETRYABLE: u8 = 75;
const EXIT_FAILURE: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ui::print_error(&err);
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli).map_err(ConfigFailure)?;
    let settings = config.cluster_settings().map_err(ConfigFailure)?;

    let session = ClusterSession::connect(&settings)
        .await
        .with_context(|| format!("failed to open session for {}", settings.environment))?;
    let runner = Runner::new(&session, &config);

    let progress = wait_label(&cli.command).map(|label| ui::JobProgress::start(&label));
    let outcome = runner
        .run(cli.command, |attempt, state| {
            if let Some(progress) = &progress {
                progress.polled(attempt, state);
            }
        })
        .await;
    if let Some(progress) = &progress {
        progress.finish();
    }

    ui::print_outcome(&outcome?);
    Ok(())
}

/// File (or defaults), then `KUBECYCLE_*` variables, then CLI flags.
fn load_config(cli: &Cli) -> Result<KubecycleConfig> {
    let mut config = match &cli.config_file {
        Some(path) => KubecycleConfig::load_from(path)?,
        None => KubecycleConfig::load()?,
    };
    if let Some(environment) = &cli.environment {
        config.environment = environment.clone();
    }
    if let Some(kubeconfig) = &cli.kubeconfig {
        config.kubeconfig = Some(kubeconfig.clone());
    }
    if let Some(context) = &cli.context {
        config.context = Some(context.clone());
    }
    if let Some(namespace) = &cli.namespace {
        config.namespace = namespace.clone();
    }
    Ok(config)
}

/// Marks errors raised while building configuration.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ConfigFailure(anyhow::Error);

fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ConfigFailure>().is_some() {
        return EXIT_CONFIG;
    }
    match err.downcast_ref::<KubecycleError>() {
        Some(KubecycleError::Configuration(_)) => EXIT_CONFIG,
        Some(e) if e.failure_kind() == FailureKind::System => EXIT_RETRYABLE,
        _ => EXIT_FAILURE,
    }
}
