/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use sched_controller::rq::{RunQueueError, RunQueueHandle, SharedRingBuffer};
use sched_controller::task::Task;

/// Attach to a shared run queue and drain it periodically.
///
/// Example:
///   rq-client --path /dev/shm/sched-controller/rq-0.shm --capacity 100
#[derive(Debug, Parser)]
#[command(name = "rq-client", long_about = None)]
struct Cli {
    /// Backing file of the run queue.
    #[arg(short = 'p', long = "path")]
    path: PathBuf,

    /// Slot count the run queue was created with.
    #[arg(short = 'c', long = "capacity", default_value_t = 100)]
    capacity: usize,

    /// Pause between two drain rounds.
    #[arg(short = 'i', long = "interval-ms", default_value_t = 100)]
    interval_ms: u64,

    /// Exit after this many tasks (0 = run forever).
    #[arg(short = 'n', long = "max-items", default_value_t = 0)]
    max_items: usize,
}

/// Dequeue up to `limit` tasks.  A locked buffer ends the round early.
fn drain(buffer: &SharedRingBuffer, limit: usize) -> Result<Vec<Task>, RunQueueError> {
    let mut out = Vec::new();
    while out.len() < limit {
        match buffer.dequeue() {
            Ok(task) => out.push(task),
            Err(RunQueueError::Empty) => break,
            Err(RunQueueError::Locked) => {
                debug!("run queue locked, retrying next round");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let handle = RunQueueHandle {
        path: cli.path.clone(),
        capacity: cli.capacity,
    };
    let buffer = SharedRingBuffer::attach(&handle)
        .with_context(|| format!("Cannot attach to run queue {}", cli.path.display()))?;
    info!(path = %cli.path.display(), capacity = cli.capacity, "attached to run queue");

    let interval = Duration::from_millis(cli.interval_ms.max(1));
    let mut received = 0usize;
    loop {
        let limit = match cli.max_items {
            0 => usize::MAX,
            max => max - received,
        };
        for task in drain(&buffer, limit)? {
            received += 1;
            info!(
                task = %task.name,
                task_id = task.task_id,
                prio = task.prio,
                deadline_us = task.deadline_us,
                received,
                "task received"
            );
        }
        if cli.max_items != 0 && received >= cli.max_items {
            info!(received, "item limit reached");
            return Ok(());
        }
        thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn task(name: &str) -> Task {
        Task {
            name: name.into(),
            valid: true,
            ..Default::default()
        }
    }

    #[test]
    fn drain_empties_buffer_in_order() {
        let dir = TempDir::new().unwrap();
        let owner = SharedRingBuffer::create(&dir.path().join("rq.shm"), 4).unwrap();
        for name in ["a", "b", "c"] {
            owner.enqueue(&task(name)).unwrap();
        }

        let client = SharedRingBuffer::attach(&owner.handle()).unwrap();
        let names: Vec<String> = drain(&client, usize::MAX)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert!(drain(&client, usize::MAX).unwrap().is_empty());
    }

    #[test]
    fn drain_respects_limit() {
        let dir = TempDir::new().unwrap();
        let owner = SharedRingBuffer::create(&dir.path().join("rq.shm"), 4).unwrap();
        owner.enqueue(&task("a")).unwrap();
        owner.enqueue(&task("b")).unwrap();

        assert_eq!(drain(&owner, 1).unwrap().len(), 1);
        assert_eq!(drain(&owner, 5).unwrap()[0].name, "b");
    }

    #[test]
    fn locked_buffer_ends_round_without_error() {
        let dir = TempDir::new().unwrap();
        let owner = SharedRingBuffer::create(&dir.path().join("rq.shm"), 2).unwrap();
        owner.enqueue(&task("a")).unwrap();

        let client = SharedRingBuffer::attach(&owner.handle()).unwrap();
        let guard = owner.try_lock().unwrap();
        assert!(drain(&client, usize::MAX).unwrap().is_empty());
        drop(guard);
        assert_eq!(drain(&client, usize::MAX).unwrap().len(), 1);
    }
}
