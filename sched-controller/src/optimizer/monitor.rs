/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Port to the monitoring subsystem.
//!
//! The optimizer pulls two snapshots per poll: the job records currently
//! known to the monitor and the "recently terminated" list.  All times are
//! microseconds on the controller clock.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: u64,
    pub task_name: String,
    pub core: usize,
    pub arrival_time: u64,
    /// 0 while the job is still running.
    pub exit_time: u64,
    pub execution_time: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminatedJob {
    pub job_id: u64,
    pub exit_time: u64,
}

/// Source of monitoring snapshots.
pub trait MonitorSource: Send + Sync {
    fn jobs(&self) -> Vec<JobRecord>;
    fn terminated(&self) -> Vec<TerminatedJob>;
}

#[derive(Debug, Default)]
struct Snapshot {
    jobs: Vec<JobRecord>,
    terminated: Vec<TerminatedJob>,
}

/// In-process [`MonitorSource`] fed by whoever collects the traces.
#[derive(Debug, Default)]
pub struct InMemoryMonitor {
    inner: RwLock<Snapshot>,
}

impl InMemoryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Snapshot> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Snapshot> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    /// Insert a job record, replacing any record with the same id.
    pub fn record_job(&self, job: JobRecord) {
        let mut snap = self.write();
        debug!(job_id = job.job_id, task = %job.task_name, "monitor: job recorded");
        match snap.jobs.iter_mut().find(|j| j.job_id == job.job_id) {
            Some(slot) => *slot = job,
            None => snap.jobs.push(job),
        }
    }

    /// Set exit and execution time of a known job.  Returns `false` if the
    /// job is unknown.
    pub fn finish_job(&self, job_id: u64, exit_time: u64, execution_time: u64) -> bool {
        let mut snap = self.write();
        match snap.jobs.iter_mut().find(|j| j.job_id == job_id) {
            Some(job) => {
                job.exit_time = exit_time;
                job.execution_time = execution_time;
                true
            }
            None => false,
        }
    }

    /// Move a job from the job list to the terminated list.
    pub fn terminate(&self, job_id: u64, exit_time: u64) {
        let mut snap = self.write();
        snap.jobs.retain(|j| j.job_id != job_id);
        snap.terminated.push(TerminatedJob { job_id, exit_time });
        debug!(job_id, exit_time, "monitor: job terminated");
    }

    pub fn clear(&self) {
        *self.write() = Snapshot::default();
    }
}

impl MonitorSource for InMemoryMonitor {
    fn jobs(&self) -> Vec<JobRecord> {
        self.read().jobs.clone()
    }

    fn terminated(&self) -> Vec<TerminatedJob> {
        self.read().terminated.clone()
    }
}
