//! fleetscaled: the fleetscale daemon.
//!
//! Single binary that wires the autoscaler together:
//! - Nomad state provider behind a read-through cache
//! - Instance catalog
//! - EC2 Auto Scaling fleet backend (AWS SDK)
//! - Decision engine, actuator, and fleet refresher
//!
//! # Usage
//!
//! ```text
//! fleetscaled run  --template-group nomad-workers --nomad-addr http://nomad:4646
//! fleetscaled plan --template-group nomad-workers --log-level warn
//! ```

mod config;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fleetscale_autoscale::{
    Actuator, Autoscaler, DecisionEngine, IterationOutcome, RandomGroupNames,
};
use fleetscale_fleet::{AwsFleet, FleetProvider};
use fleetscale_placement::InstanceCatalog;
use fleetscale_rollout::FleetRefresher;
use fleetscale_state::{CachedStateProvider, ClusterStateProvider, NomadClient};

use crate::config::DaemonArgs;

#[derive(Parser)]
#[command(name = "fleetscaled", about = "fleetscale autoscaler daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop until interrupted.
    Run(DaemonArgs),
    /// Run a single iteration, including actuation, then exit.
    Once(DaemonArgs),
    /// Print the decision for the current cluster state without acting.
    Plan(DaemonArgs),
}

impl Command {
    fn args(&self) -> &DaemonArgs {
        match self {
            Command::Run(a) | Command::Once(a) | Command::Plan(a) => a,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.command.args())?;

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Once(args) => {
            let scaler = build_autoscaler(&args).await?;
            let outcome = scaler.run_once().await;
            info!(?outcome, "single iteration finished");
            if let IterationOutcome::Aborted { reason } = outcome {
                anyhow::bail!("iteration aborted: {reason}");
            }
            Ok(())
        }
        Command::Plan(args) => {
            let scaler = build_autoscaler(&args).await?;
            let decision = scaler.evaluate().await?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
            Ok(())
        }
    }
}

fn init_tracing(args: &DaemonArgs) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(&args.log_level)
            .with_context(|| format!("invalid log level {:?}", args.log_level))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn build_autoscaler(args: &DaemonArgs) -> anyhow::Result<Autoscaler> {
    let policy = args.scaling_policy();
    policy.validate()?;

    let catalog = InstanceCatalog::from_file(&args.instance_catalog)
        .with_context(|| format!("loading instance catalog {}", args.instance_catalog.display()))?;

    let nomad = NomadClient::new(args.nomad_config())?;
    let state: Arc<dyn ClusterStateProvider> =
        Arc::new(CachedStateProvider::new(nomad, args.state_cache_ttl()));
    info!(address = %args.nomad_addr, datacenter = %args.datacenter, "nomad state provider ready");

    let fleet: Arc<dyn FleetProvider> = Arc::new(AwsFleet::connect(args.aws_config()).await);

    let engine = DecisionEngine::new(policy.clone(), catalog)
        .with_namer(RandomGroupNames::new(&args.managed_group_prefix));
    let actuator = Actuator::new(fleet.clone(), policy.dry_run);
    let refresher = FleetRefresher::new(fleet, args.refresh_config());

    Ok(Autoscaler::new(state, engine, actuator).with_refresher(refresher))
}

async fn run(args: DaemonArgs) -> anyhow::Result<()> {
    info!("fleetscale daemon starting");
    let scaler = build_autoscaler(&args).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(async move {
        scaler.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to install CTRL+C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    loop_handle.await?;
    info!("fleetscale daemon stopped");
    Ok(())
}
