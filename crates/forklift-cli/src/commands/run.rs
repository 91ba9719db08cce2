//! Run command
//!
//! Loads every request file up front, then runs the workflows concurrently
//! against one shared gateway. Ctrl-C cancels all of them; objects already
//! created stay on the cluster.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use forklift_common::kube_utils::create_client;
use forklift_orchestrator::{
    ClusterGateway, DriverConfig, KubeGateway, MemoryGateway, MigrationRun, Orchestrator,
    OrchestratorConfig,
};

use super::load_requests;
use crate::{Error, Result};

/// Largest accepted budget or interval, in seconds (one year)
const MAX_DURATION_SECS: u64 = 365 * 86_400;

/// Run command arguments
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Migration request file (YAML or JSON); repeat to run several
    #[arg(short = 'f', long = "file", required = true)]
    pub files: Vec<PathBuf>,

    /// Path to kubeconfig (in-cluster or default config if unset)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Budget in seconds for every stage but the Migration
    #[arg(
        long,
        default_value_t = 600,
        value_parser = clap::value_parser!(u64).range(1..=MAX_DURATION_SECS)
    )]
    pub stage_timeout: u64,

    /// Budget in seconds for the Migration stage
    #[arg(
        long,
        default_value_t = 86_400,
        value_parser = clap::value_parser!(u64).range(1..=MAX_DURATION_SECS)
    )]
    pub migration_timeout: u64,

    /// Seconds between status polls
    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u64).range(1..=MAX_DURATION_SECS)
    )]
    pub poll_interval: u64,

    /// Run against an in-memory backend instead of a cluster
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            driver: DriverConfig {
                stage_timeout: Duration::from_secs(self.stage_timeout),
                migration_timeout: Duration::from_secs(self.migration_timeout),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Run the run command
pub async fn run(args: RunArgs) -> Result<()> {
    let requests = load_requests(&args.files)?;
    let gateway = gateway(&args).await?;
    let orchestrator = Orchestrator::new(gateway, args.orchestrator_config());

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let runs = futures::future::join_all(
        requests
            .iter()
            .map(|request| orchestrator.run(request, cancel.clone())),
    )
    .await;

    report(&runs, &mut std::io::stdout().lock())
}

async fn gateway(args: &RunArgs) -> Result<Arc<dyn ClusterGateway>> {
    let poll_interval = Duration::from_secs(args.poll_interval);
    if args.dry_run {
        info!("Dry run: using the in-memory backend");
        return Ok(Arc::new(
            MemoryGateway::new().with_poll_interval(poll_interval),
        ));
    }
    let client = create_client(args.kubeconfig.as_deref()).await?;
    Ok(Arc::new(
        KubeGateway::new(client).with_poll_interval(poll_interval),
    ))
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, cancelling workflows");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for interrupt"),
        }
    });
}

/// Print each final workflow state as JSON; fail if any workflow failed
fn report(runs: &[MigrationRun], out: &mut impl Write) -> Result<()> {
    for run in runs {
        writeln!(out, "{}", serde_json::to_string_pretty(&run.state)?)?;
    }
    let failed = runs.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        return Err(Error::WorkflowsFailed {
            failed,
            total: runs.len(),
        });
    }
    Ok(())
}
