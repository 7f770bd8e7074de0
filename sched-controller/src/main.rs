/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use sched_controller::config::{self, ControllerConfig};
use sched_controller::controller::SchedController;
use sched_controller::optimizer::InMemoryMonitor;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Real-time scheduling controller.
///
/// Example:
///   sched-controller --config controller.yaml --workload tasks.yaml
#[derive(Debug, Parser)]
#[command(
    name = "sched-controller",
    about = "Run-queue manager, RTA admission and fairness optimizer",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML controller configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// YAML list of tasks to admit at start-up.
    #[arg(short = 'w', long = "workload")]
    workload: Option<PathBuf>,

    /// Directory for the shared run-queue regions (overrides the config file).
    #[arg(short = 's', long = "shm-dir")]
    shm_dir: Option<PathBuf>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by RUST_LOG (e.g. RUST_LOG=info).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    let cli = Cli::parse();
    info!(config = ?cli.config, workload = ?cli.workload, shm_dir = ?cli.shm_dir, "sched-controller starting up");

    if let Err(e) = run(cli).await {
        error!("sched-controller failed: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ControllerConfig::load_from_file(path)?,
        None => {
            warn!("No configuration file provided, using default settings");
            ControllerConfig::default()
        }
    };
    if let Some(dir) = cli.shm_dir {
        config.shm_dir = dir;
    }

    let monitor = Arc::new(InMemoryMonitor::new());
    let controller = SchedController::new(&config, monitor)?;

    if let Some(path) = &cli.workload {
        let tasks = config::load_workload(path)?;
        let total = tasks.len();
        let mut admitted = 0;
        for entry in tasks {
            let name = entry.task.name.clone();
            match controller.new_task(entry.task, entry.core).await {
                Ok(_) => admitted += 1,
                Err(e) => warn!(task = %name, "workload task not admitted: {}", e),
            }
        }
        info!(admitted, total, "workload processed");
    }

    for slot in 0..controller.queues().count() {
        let handle = controller.get_run_queue_handle(slot)?;
        info!(slot, path = %handle.path.display(), capacity = handle.capacity, "run queue available");
    }

    controller.set_optimization_goal(config.optimization.clone()).await;

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    controller.shutdown().await;
    Ok(())
}
