//! `agritrain-worker`: runs the training task pipeline.
//!
//! - `run`: periodic scheduler until Ctrl-C (plus the change watcher when the
//!   in-memory store is used)
//! - `trigger`: one synchronous run, prints `{success, message|error}`
//! - `stats`: task counts and the current model record

mod seed;
mod wiring;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use agritrain_infra::config::{self, WorkerConfig};
use agritrain_infra::registry::ModelRecord;
use agritrain_infra::scheduler::{IntervalTicker, ManualTriggerResponse};
use agritrain_infra::tasks::TaskStats;

use crate::wiring::Backends;

/// Training task pipeline worker for the agricultural knowledge base.
#[derive(Parser, Debug)]
#[command(name = "agritrain-worker", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until interrupted.
    Run {
        /// JSON file of knowledge entries to load at startup (memory store only).
        #[arg(long, env = "AGRITRAIN_SEED")]
        seed: Option<PathBuf>,

        /// Fire once immediately instead of waiting a full interval.
        #[arg(long)]
        fire_on_start: bool,
    },
    /// Process at most one pending task now and print the result as JSON.
    Trigger,
    /// Print task counts and the registered model as JSON.
    Stats,
}

#[derive(Debug, Serialize)]
struct StatsReport {
    tasks: TaskStats,
    model: Option<ModelRecord>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    agritrain_observability::init().context("invalid logging configuration")?;

    let cli = Cli::parse();
    let config = WorkerConfig::from_env().context("invalid configuration")?;
    config.log_summary();

    let backends = Backends::connect(&config).await?;

    match cli.command {
        Command::Run {
            seed,
            fire_on_start,
        } => run(config, backends, seed, fire_on_start).await,
        Command::Trigger => trigger(config, backends).await,
        Command::Stats => stats(backends).await,
    }
}

async fn run(
    config: WorkerConfig,
    backends: Backends,
    seed: Option<PathBuf>,
    fire_on_start: bool,
) -> anyhow::Result<()> {
    // Subscribe before seeding so seeded entries are enqueued.
    let watcher = match &backends.dev_feed {
        Some(feed) => Some(
            backends
                .watcher()
                .spawn("change-watcher", &feed.mutations)
                .context("failed to spawn change watcher")?,
        ),
        None => None,
    };

    if let Some(path) = seed {
        match &backends.dev_feed {
            Some(feed) => {
                let entries = seed::load(&path)?;
                let count = entries.len();
                for entry in entries {
                    feed.knowledge.upsert(entry)?;
                }
                info!(entries = count, path = %path.display(), "seeded knowledge base");
            }
            None => warn!("--seed is ignored with the postgres store"),
        }
    }

    let ticker = if fire_on_start {
        IntervalTicker::starting_now(config.interval)
    } else {
        IntervalTicker::new(config.interval)
    };
    let scheduler = backends
        .scheduler(&config)
        .spawn("training-scheduler", ticker)
        .context("failed to spawn training scheduler")?;

    info!(interval_secs = config.interval.as_secs(), "worker running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown requested");

    tokio::task::spawn_blocking(move || {
        let stats = scheduler.stats();
        scheduler.shutdown();
        if let Some(watcher) = watcher {
            watcher.shutdown();
        }
        info!(
            firings = stats.firings,
            completed = stats.completed,
            failed = stats.failed,
            "worker stopped"
        );
    })
    .await?;

    Ok(())
}

async fn trigger(config: WorkerConfig, backends: Backends) -> anyhow::Result<()> {
    let scheduler = backends.scheduler(&config);
    let response: ManualTriggerResponse =
        tokio::task::spawn_blocking(move || scheduler.run_now()).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn stats(backends: Backends) -> anyhow::Result<()> {
    let report = tokio::task::spawn_blocking(move || -> anyhow::Result<StatsReport> {
        Ok(StatsReport {
            tasks: backends.tasks.stats()?,
            model: backends.registry.current()?,
        })
    })
    .await??;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
