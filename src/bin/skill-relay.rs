//! # Skill Relay CLI
//!
//! Stream setup, plan execution and the simulated worker bridge.
//!
//! Exit codes for `run` and `demo`: 0 on `SUCCESS`, 2 on `FAILED`, 1 on error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use skill_relay::config::{ChannelBackend, RelayConfig};
use skill_relay::execution::{PlanExecutor, RunReport};
use skill_relay::logging::init_tracing;
use skill_relay::messaging::{ChannelProvider, MessageChannel};
use skill_relay::plan::{Plan, SkillCall, SkillCatalog};
use skill_relay::worker::{SimulatedExecutor, WorkerBridge};

const FAILED_EXIT: u8 = 2;

#[derive(Parser)]
#[command(name = "skill-relay")]
#[command(about = "Dispatch skill plans to a robot over message streams")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file (default: config/skill-relay.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the task and result consumer groups
    InitStreams,

    /// Execute a plan against the configured channel
    Run {
        /// Plan JSON: [{"skill_name": .., "arguments": {..}}, ..]
        #[arg(short, long)]
        plan: PathBuf,

        /// Skill catalog YAML to validate the plan against
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Serve tasks with the simulated executor until Ctrl-C
    Worker,

    /// Execute a plan on an in-memory channel with an in-process simulated worker
    Demo {
        #[arg(short, long)]
        plan: PathBuf,

        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    let config = RelayConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::InitStreams => {
            init_streams(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { plan, catalog } => {
            let plan = load_plan(&plan, catalog.as_deref())?;
            let channel = Arc::new(ChannelProvider::from_config(&config.channel).await?);
            let report = execute(channel, &config, plan).await?;
            Ok(exit_code(&report))
        }
        Commands::Worker => {
            run_worker(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Demo { plan, catalog } => {
            let plan = load_plan(&plan, catalog.as_deref())?;
            let report = demo(config, plan).await?;
            Ok(exit_code(&report))
        }
    }
}

async fn init_streams(config: &RelayConfig) -> anyhow::Result<()> {
    let channel = ChannelProvider::from_config(&config.channel).await?;
    let bindings = config.streams.stream_names().group_bindings();
    channel.ensure_groups(&bindings).await?;

    for (stream, group) in &bindings {
        println!("{stream} -> {group}");
    }
    println!("Streams ready");
    Ok(())
}

fn load_plan(path: &Path, catalog: Option<&Path>) -> anyhow::Result<Plan> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading plan {}", path.display()))?;
    let calls: Vec<SkillCall> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing plan {}", path.display()))?;

    let plan = match catalog {
        Some(catalog) => SkillCatalog::from_file(catalog)?.validate(calls)?,
        None => Plan::new(calls),
    };
    info!(steps = plan.len(), "Plan loaded");
    Ok(plan)
}

async fn execute<C: MessageChannel>(
    channel: Arc<C>,
    config: &RelayConfig,
    plan: Plan,
) -> anyhow::Result<RunReport> {
    let executor = PlanExecutor::from_config(channel, config);
    executor.prepare().await?;
    let report = executor.invoke(plan).await?;
    print_report(&report);
    Ok(report)
}

async fn run_worker(config: &RelayConfig) -> anyhow::Result<()> {
    let channel = Arc::new(ChannelProvider::from_config(&config.channel).await?);
    let executor = Arc::new(SimulatedExecutor::from_config(&config.worker));
    let bridge = WorkerBridge::from_config(channel, executor, config);
    bridge.prepare().await?;
    bridge.recover_pending().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    bridge.run(shutdown_rx).await?;
    Ok(())
}

async fn demo(mut config: RelayConfig, plan: Plan) -> anyhow::Result<RunReport> {
    config.channel.backend = ChannelBackend::Memory;
    let channel = Arc::new(ChannelProvider::from_config(&config.channel).await?);

    let executor = Arc::new(SimulatedExecutor::from_config(&config.worker));
    let bridge = WorkerBridge::from_config(Arc::clone(&channel), executor, &config);
    bridge.prepare().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(async move { bridge.run(shutdown_rx).await });

    let report = execute(channel, &config, plan).await;

    let _ = shutdown_tx.send(true);
    worker.await.context("joining demo worker")??;
    report
}

fn print_report(report: &RunReport) {
    println!("run {}", report.run_id);
    for dispatch in &report.dispatches {
        println!(
            "  step {:>2}  {:<24} {}",
            dispatch.step, dispatch.skill_name, dispatch.task_id
        );
    }
    let elapsed = report.finished_at - report.started_at;
    println!(
        "outcome {} after {} dispatches in {} ms",
        report.outcome,
        report.dispatches.len(),
        elapsed.num_milliseconds()
    );
}

fn exit_code(report: &RunReport) -> ExitCode {
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(FAILED_EXIT)
    }
}
