//! Peersim node CLI
//!
//! Runs one simulation node: bootstrap against the directory, perform
//! the scheduled actions, report metrics, then idle until Ctrl-C.

use anyhow::Context;
use clap::Parser;
use peersim_core::{
    record_events, Bootstrap, HttpDirectory, MetricsAggregator, PeerCoordinator, RandomActions,
    ScheduleConfig, Scheduler,
};
use peersim_env::{ConnectionService, NodeAddress, NodeContext, TokioContext};
use peersim_sim::MemorySubstrate;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Peer simulation node
#[derive(Parser, Debug)]
#[command(name = "peersim-node")]
#[command(about = "Exercise a peer-to-peer substrate with randomized scheduled actions", long_about = None)]
struct Args {
    /// Path to the shared config file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Seed for the action draw (0 = random)
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Override totalActions from the config
    #[arg(long)]
    total_actions: Option<u64>,

    /// Full address the local substrate listens on
    #[arg(long)]
    listen: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn default_listen_address() -> String {
    let id: u64 = rand::thread_rng().gen();
    format!("/ip4/127.0.0.1/tcp/4001/p2p/{id:016x}")
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = ScheduleConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    if let Some(total) = args.total_actions {
        config.total_actions = total;
    }
    info!(directory = %config.directory, "Directory url");

    let context = TokioContext::shared();
    let seed = args.seed;
    let substrate = Arc::new(MemorySubstrate::new(seed));
    substrate.bring_up(args.listen.unwrap_or_else(default_listen_address));
    let directory = Arc::new(HttpDirectory::new(&config.directory));
    let metrics = MetricsAggregator::shared();

    let report = Bootstrap::new(
        Arc::clone(&context),
        Arc::clone(&substrate),
        Arc::clone(&directory),
        &config,
    )
    .run()
    .await?;
    let me: NodeAddress = report.address;

    let clock = Arc::clone(&context);
    context.spawn(
        "connection-events",
        record_events(Arc::clone(&metrics), me.clone(), substrate.subscribe(), move || clock.now()),
    );

    let actions = RandomActions::seeded(&config.actions, seed)
        .context("no action has a non-zero weight")?;
    let coordinator = PeerCoordinator::new(
        me,
        Arc::clone(&context),
        Arc::clone(&substrate),
        Arc::clone(&substrate),
        Arc::clone(&directory),
        Arc::clone(&metrics),
    );
    let scheduler = Scheduler::new(
        Arc::clone(&context),
        Arc::clone(&substrate),
        directory,
        coordinator,
        actions,
        config.action_interval(),
        config.total_actions,
    );

    let run = scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for interrupt: {}", e);
            }
        })
        .await;
    info!(
        ticks = run.ticks.len(),
        messages = run.summary.message_count,
        connections = run.summary.connection_count,
        "Interrupt received, shutting down"
    );
    Ok(())
}

/// `RUST_LOG` directives when they parse, otherwise INFO (DEBUG with `--verbose`).
fn log_filter(rust_log: Option<&str>, verbose: bool) -> EnvFilter {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = log_filter(std::env::var("RUST_LOG").ok().as_deref(), args.verbose);
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
