/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Controller configuration and workload loading.
//!
//! The expected YAML structure is:
//! ```yaml
//! controller:
//!   shm_dir: /dev/shm/sched-controller
//!   run_queue_capacity: 100
//! cores:
//!   - id: 0
//!     state: active
//!   - id: 1
//! run_queues:
//!   - task_class: lo
//!     task_strategy: priority
//!     core: 0
//! optimization:
//!   goal: fairness
//!   fairness_acceptance: 0
//!   query_interval_ms: 100
//! ```
//!
//! Every section is optional.  A workload file is a list of tasks, each with
//! an optional `core` for explicit placement.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::optimizer::OptimizationConfig;
use crate::task::{Task, TaskClass, TaskStrategy};
use crate::topology::{CoreDescriptor, CoreState, CoreTopology, RunQueueDescriptor};

/// Slots per run-queue buffer when the file does not say.
pub const DEFAULT_RUN_QUEUE_CAPACITY: usize = 100;
/// Cores configured when the `cores` section is absent.
pub const DEFAULT_CORE_COUNT: usize = 2;
pub const DEFAULT_SHM_DIR: &str = "/dev/shm/sched-controller";

// ── Private YAML deserialization types ────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    controller: ControllerSection,
    cores: Option<Vec<CoreEntry>>,
    run_queues: Vec<RunQueueEntry>,
    optimization: OptimizationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ControllerSection {
    shm_dir: PathBuf,
    run_queue_capacity: usize,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            shm_dir: PathBuf::from(DEFAULT_SHM_DIR),
            run_queue_capacity: DEFAULT_RUN_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CoreEntry {
    id: usize,
    #[serde(default)]
    state: CoreState,
}

#[derive(Debug, Deserialize)]
struct WorkloadEntry {
    #[serde(flatten)]
    task: Task,
    #[serde(default)]
    core: Option<usize>,
}

// ── Public data structures ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreConfig {
    pub id: usize,
    pub state: CoreState,
}

/// A run queue present at start-up, hosted on `core`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RunQueueEntry {
    pub task_class: TaskClass,
    #[serde(default)]
    pub task_strategy: TaskStrategy,
    pub core: usize,
}

/// Validated controller configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub shm_dir: PathBuf,
    pub run_queue_capacity: usize,
    /// One run-queue buffer slot per entry, in file order.
    pub cores: Vec<CoreConfig>,
    pub run_queues: Vec<RunQueueEntry>,
    pub optimization: OptimizationConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            shm_dir: PathBuf::from(DEFAULT_SHM_DIR),
            run_queue_capacity: DEFAULT_RUN_QUEUE_CAPACITY,
            cores: (0..DEFAULT_CORE_COUNT)
                .map(|id| CoreConfig {
                    id,
                    state: CoreState::Active,
                })
                .collect(),
            run_queues: Vec::new(),
            optimization: OptimizationConfig::default(),
        }
    }
}

/// One workload task and its optional explicit placement.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadTask {
    pub task: Task,
    pub core: Option<usize>,
}

impl ControllerConfig {
    /// Parse and validate the configuration file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is invalid, or
    /// the content fails validation.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "loading controller configuration");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(content).context("Failed to parse YAML")?;

        let cores = match file.cores {
            Some(entries) if !entries.is_empty() => entries
                .into_iter()
                .map(|e| CoreConfig {
                    id: e.id,
                    state: e.state,
                })
                .collect(),
            Some(_) | None => {
                warn!(count = DEFAULT_CORE_COUNT, "no cores configured, using default cores");
                ControllerConfig::default().cores
            }
        };

        let config = Self {
            shm_dir: file.controller.shm_dir,
            run_queue_capacity: file.controller.run_queue_capacity,
            cores,
            run_queues: file.run_queues,
            optimization: file.optimization,
        };
        config.validate()?;

        info!(
            cores = config.cores.len(),
            run_queues = config.run_queues.len(),
            capacity = config.run_queue_capacity,
            goal = %config.optimization.goal,
            "controller configuration loaded"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.run_queue_capacity == 0 {
            bail!("run_queue_capacity must be at least 1");
        }

        let mut ids = BTreeSet::new();
        for core in &self.cores {
            if !ids.insert(core.id) {
                bail!("core {} is configured twice", core.id);
            }
        }

        if self.run_queues.len() > self.cores.len() {
            bail!(
                "{} run queue(s) configured but only {} buffer slot(s) exist",
                self.run_queues.len(),
                self.cores.len()
            );
        }
        for (i, rq) in self.run_queues.iter().enumerate() {
            if !ids.contains(&rq.core) {
                bail!("run_queues[{i}] names unknown core {}", rq.core);
            }
        }
        Ok(())
    }

    /// Number of run-queue buffers to create.
    pub fn buffer_slots(&self) -> usize {
        self.cores.len()
    }

    /// Core topology with the configured run queues bound.  Run queue `i`
    /// gets the lowest buffer slot still free.
    pub fn build_topology(&self) -> Result<CoreTopology> {
        let mut topology = CoreTopology::new(
            self.cores.iter().map(|c| CoreDescriptor::new(c.id, c.state)),
            self.buffer_slots(),
        );

        for (i, entry) in self.run_queues.iter().enumerate() {
            let slot = topology
                .free_buffer_slot()
                .with_context(|| format!("run_queues[{i}]: no free buffer slot"))?;
            let rq = topology
                .add_run_queue(RunQueueDescriptor::new(entry.task_class, entry.task_strategy, slot))
                .with_context(|| format!("run_queues[{i}]: cannot add run queue"))?;
            topology
                .allocate_rq(entry.core, rq)
                .with_context(|| format!("run_queues[{i}]: cannot bind to core {}", entry.core))?;
            debug!(rq, slot, core = entry.core, "configured run queue bound");
        }
        Ok(topology)
    }
}

/// Read a workload file: a YAML list of tasks.
pub fn load_workload(path: &Path) -> Result<Vec<WorkloadTask>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open workload file: {}", path.display()))?;
    let entries: Vec<WorkloadEntry> = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse workload file: {}", path.display()))?;

    let mut names = BTreeSet::new();
    for entry in &entries {
        if entry.task.name.is_empty() {
            bail!("workload task {} has no name", entry.task.task_id);
        }
        if !names.insert(entry.task.name.as_str()) {
            bail!("workload task '{}' appears twice", entry.task.name);
        }
    }

    info!(path = %path.display(), tasks = entries.len(), "workload loaded");
    Ok(entries
        .into_iter()
        .map(|e| WorkloadTask {
            task: e.task,
            core: e.core,
        })
        .collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
