//! Launch bundler CLI
//!
//! ## Commands
//!
//! - **launch**: fund the pool, build the lookup table and submit the
//!   creation plus buy batches; rerunning resumes from the checkpoint
//! - **gather**: sell the launch token and sweep every pool wallet back to
//!   the main wallet
//! - **status**: print the checkpoint of the configured data directory

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use launch_bundler::config::{lamports_to_sol, Config};
use launch_bundler::endpoints;
use launch_bundler::funds::RecoveryOutcome;
use launch_bundler::pipeline::{LaunchPipeline, RunContext, SubmissionResult};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run or resume a launch
    Launch,
    /// Sell and sweep the persisted pool back to the main wallet
    Gather,
    /// Show the current checkpoint
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json_logs)?;

    info!("🚀 Starting launch bundler v{}", env!("CARGO_PKG_VERSION"));
    info!("📋 Loading configuration from: {}", args.config);
    let config = Config::from_file_with_env(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;
    config.validate()?;

    if config.monitoring.enable_metrics {
        let port = config.monitoring.metrics_port;
        info!("📊 Starting metrics server on port {}", port);
        tokio::spawn(async move {
            if let Err(e) = endpoints::endpoint_server(port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let ctx = RunContext::from_config(config)?;
    info!("💼 Main wallet: {}", ctx.main.pubkey());
    let pipeline = LaunchPipeline::new(ctx);

    match args.command {
        Command::Launch => launch(&pipeline).await,
        Command::Gather => gather(&pipeline).await,
        Command::Status => status(&pipeline),
    }
}

async fn launch(pipeline: &LaunchPipeline) -> Result<()> {
    let report = pipeline.run().await?;
    info!(mint = %report.mint, lookup_table = %report.lookup_table, stage = %report.stage, "Launch run finished");

    match report.submission {
        Some(SubmissionResult::Bundle(bundle)) => {
            info!("✅ Bundle {} accepted with {} transactions", bundle.bundle_id, bundle.signatures.len());
            for signature in &bundle.signatures {
                info!("   {}", signature);
            }
        }
        Some(SubmissionResult::Sequential(seq)) => {
            for (index, outcome) in seq.outcomes.iter().enumerate() {
                match outcome.signature() {
                    Some(sig) => info!("   batch {} {}: {}", index, outcome.label(), sig),
                    None => info!("   batch {} {}", index, outcome.label()),
                }
            }
            if let Some(resume_from) = seq.resume_from {
                warn!("⚠️ Sequential submission stopped at batch {}; rerun launch to resume", resume_from);
            }
        }
        None => info!("Nothing to submit; checkpoint is already at {}", report.stage),
    }
    Ok(())
}

async fn gather(pipeline: &LaunchPipeline) -> Result<()> {
    let results = pipeline.gather().await?;
    let mut failed = 0usize;
    for result in &results {
        match &result.outcome {
            RecoveryOutcome::Recovered { signature } => info!("   {} recovered: {}", result.wallet, signature),
            RecoveryOutcome::NothingToRecover => info!("   {} empty", result.wallet),
            RecoveryOutcome::Failed { reason } => {
                failed += 1;
                warn!("   {} failed: {}", result.wallet, reason);
            }
        }
    }

    let ctx = pipeline.context();
    let balance = ctx.rpc.get_balance(&ctx.main.pubkey()).await?;
    info!("💰 Main wallet balance: {:.4} SOL", lamports_to_sol(balance));

    if failed > 0 {
        anyhow::bail!("{} of {} wallets were not recovered", failed, results.len());
    }
    Ok(())
}

fn status(pipeline: &LaunchPipeline) -> Result<()> {
    match pipeline.status()? {
        Some(checkpoint) => println!("{}", serde_json::to_string_pretty(&checkpoint)?),
        None => println!("No checkpoint in {}", pipeline.context().store.dir().display()),
    }
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "launch_bundler=debug,info"
    } else {
        "launch_bundler=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| env_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}
