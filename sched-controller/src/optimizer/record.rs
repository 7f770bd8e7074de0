/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-task optimizer state.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::task::Task;

/// Latest job instance seen in monitoring data for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewestJob {
    pub job_id: u64,
    pub arrival_time: u64,
    pub core: usize,
    /// Already handled by the optimizer.
    pub dispatched: bool,
}

impl Default for NewestJob {
    fn default() -> Self {
        Self {
            job_id: 0,
            arrival_time: 0,
            core: 0,
            dispatched: true,
        }
    }
}

/// Optimizer view of one admitted task.  Times in microseconds since the
/// controller epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationTaskRecord {
    pub inter_arrival: u64,
    pub deadline: u64,
    pub core: usize,
    /// Earliest legal start of the current job; 0 until the first job shows up.
    pub arrival_time: u64,
    /// Permission flag read by the dispatcher.
    pub to_schedule: bool,
    pub last_job_started: bool,
    /// Tasks whose execution caused a deadline miss of this one.
    pub competitor: BTreeSet<String>,
    /// Related-task group id, 0 = none.
    pub id_related: u32,
    pub newest_job: NewestJob,
    /// Per-core debt counters.
    pub value: Vec<u32>,
    /// Last measured `execution_time / inter_arrival`.
    pub utilization: f64,
}

impl OptimizationTaskRecord {
    pub fn new(task: &Task, core: usize, num_cores: usize) -> Self {
        Self {
            inter_arrival: task.inter_arrival_us,
            deadline: task.deadline_us,
            core,
            arrival_time: 0,
            to_schedule: true,
            last_job_started: false,
            competitor: BTreeSet::new(),
            id_related: 0,
            newest_job: NewestJob::default(),
            value: vec![0; num_cores],
            utilization: 0.0,
        }
    }

    /// Value on the task's current core.
    pub fn current_value(&self) -> u32 {
        self.value.get(self.core).copied().unwrap_or(0)
    }

    pub(crate) fn value_on_mut(&mut self, core: usize) -> Option<&mut u32> {
        self.value.get_mut(core)
    }

    pub fn value_on(&self, core: usize) -> u32 {
        self.value.get(core).copied().unwrap_or(0)
    }

    /// Absolute deadline of the current job.
    pub fn absolute_deadline(&self) -> u64 {
        self.arrival_time.saturating_add(self.deadline)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndCause {
    Killed,
    Finished,
}

impl fmt::Display for EndCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndCause::Killed => f.write_str("killed"),
            EndCause::Finished => f.write_str("finished"),
        }
    }
}

/// History entry for a task that left the optimizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndedTaskRecord {
    pub name: String,
    pub last_job_id: u64,
    pub cause: EndCause,
}
