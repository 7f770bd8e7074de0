/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task placement: choose a run queue, run the admission test, commit.
//!
//! ```text
//! new task ─► class Lo? ──no──► UnsupportedTaskClass
//!                │
//!                ▼
//!      matching run queues? ──none──► unused core? ──none──► NoCapacityOnAnyCore
//!                │                         │
//!                │                   free slot? ──none──► NoMatchingRunQueue
//!                │                         │
//!                │                   bind new run queue
//!                ▼                         │
//!      lowest reported utilization ◄───────┘
//!                │
//!                ▼
//!        RTA on queue contents ──reject──► SchedulabilityRejected
//!                │
//!                ▼
//!        enqueue ──Locked──► parked as pending (flushed by update_run_queue)
//! ```
//!
//! The schedulability test and the enqueue are not one atomic step.  The
//! policy assumes it is the only admission authority for its run queues.

pub mod error;

pub use error::AdmissionError;

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, info, warn};

use crate::analysis::{self, Verdict};
use crate::rq::{RunQueueError, RunQueueSet};
use crate::task::{Task, TaskClass};
use crate::topology::{CoreState, CoreTopology};

// ── Result types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementStatus {
    /// The task is in the shared buffer.
    Committed,
    /// Admitted, but the buffer was locked; waiting in the pending list.
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Buffer slot in the run-queue set.
    pub slot: usize,
    /// Run-queue id in the topology, `None` for explicit-slot admission.
    pub run_queue: Option<usize>,
    pub status: PlacementStatus,
    /// A new run queue was bound to a free core for this task.
    pub created_run_queue: bool,
}

// ── PlacementPolicy ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PlacementPolicy {
    /// Admitted tasks whose enqueue hit `Locked`, per buffer slot.
    pending: BTreeMap<usize, VecDeque<Task>>,
}

impl PlacementPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `task` to a run queue chosen by class, strategy and load.
    pub fn place(
        &mut self,
        task: Task,
        topology: &mut CoreTopology,
        queues: &RunQueueSet,
    ) -> Result<Placement, AdmissionError> {
        Self::check_class(&task)?;

        let matching = topology.run_queues_matching(task.task_class, task.task_strategy);
        if matching.is_empty() {
            return self.place_on_new_run_queue(task, topology, queues);
        }

        let mut rq = matching[0];
        for &id in &matching[1..] {
            if topology.run_queue(id)?.utilization < topology.run_queue(rq)?.utilization {
                rq = id;
            }
        }

        let desc = topology.run_queue(rq)?;
        let slot = desc.buffer_index;
        debug!(
            task = %task.name,
            rq,
            slot,
            utilization = desc.utilization,
            candidates = matching.len(),
            "run queue selected"
        );

        let added = task.utilization();
        let status = self.admit_and_commit(task, slot, queues)?;

        // Nominal share until the next measured report overrides it
        let current = topology.run_queue(rq)?.utilization;
        topology.report_utilization(rq, current + added)?;

        Ok(Placement {
            slot,
            run_queue: Some(rq),
            status,
            created_run_queue: false,
        })
    }

    /// Admit `task` directly onto buffer `slot`, bypassing queue selection.
    pub fn place_on(
        &mut self,
        task: Task,
        slot: usize,
        queues: &RunQueueSet,
    ) -> Result<Placement, AdmissionError> {
        Self::check_class(&task)?;
        if slot >= queues.count() {
            return Err(RunQueueError::InvalidCore {
                core: slot,
                count: queues.count(),
            }
            .into());
        }

        let status = self.admit_and_commit(task, slot, queues)?;
        Ok(Placement {
            slot,
            run_queue: None,
            status,
            created_run_queue: false,
        })
    }

    /// Move pending tasks of `slot` into its buffer, oldest first.
    ///
    /// Stops at the first buffer status other than `Ok` and returns it; the
    /// remaining tasks stay pending.  Returns the number of tasks committed.
    pub fn flush_pending(&mut self, slot: usize, queues: &RunQueueSet) -> Result<usize, AdmissionError> {
        let Some(list) = self.pending.get_mut(&slot) else {
            // Validate the slot even when nothing is pending
            queues.get(slot)?;
            return Ok(0);
        };

        let mut committed = 0;
        while let Some(task) = list.front() {
            queues.enqueue(slot, task)?;
            info!(task = %task.name, slot, "pending task committed");
            list.pop_front();
            committed += 1;
        }
        self.pending.remove(&slot);
        Ok(committed)
    }

    pub fn pending(&self, slot: usize) -> impl Iterator<Item = &Task> {
        self.pending.get(&slot).into_iter().flatten()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn check_class(task: &Task) -> Result<(), AdmissionError> {
        if task.task_class != TaskClass::Lo {
            warn!(task = %task.name, class = ?task.task_class, "admission refused: class not routed");
            return Err(AdmissionError::UnsupportedTaskClass {
                task: task.name.clone(),
                class: task.task_class,
            });
        }
        Ok(())
    }

    /// Admit `task` on a run queue created for it.  The run queue is bound
    /// to its core only once the task is admitted.
    fn place_on_new_run_queue(
        &mut self,
        task: Task,
        topology: &mut CoreTopology,
        queues: &RunQueueSet,
    ) -> Result<Placement, AdmissionError> {
        let free_core = topology
            .get_unused_cores()
            .into_iter()
            .find(|&c| matches!(topology.core(c), Ok(d) if d.state == CoreState::Active));

        let Some(core) = free_core else {
            info!(task = %task.name, "admission rejected: no matching run queue, no unused core");
            return Err(AdmissionError::NoCapacityOnAnyCore {
                task: task.name.clone(),
            });
        };
        let Some(slot) = topology.free_buffer_slot() else {
            info!(task = %task.name, core, "admission rejected: unused core but no free buffer slot");
            return Err(AdmissionError::NoMatchingRunQueue {
                task: task.name.clone(),
                class: task.task_class,
                strategy: task.task_strategy,
            });
        };

        let (class, strategy, added) = (task.task_class, task.task_strategy, task.utilization());
        debug!(task = %task.name, core, slot, "no matching run queue, trying a new one");
        let status = self.admit_and_commit(task, slot, queues)?;

        let rq = topology.bind_new_run_queue(core, slot, class, strategy)?;
        topology.report_utilization(rq, added)?;

        Ok(Placement {
            slot,
            run_queue: Some(rq),
            status,
            created_run_queue: true,
        })
    }

    fn admit_and_commit(
        &mut self,
        task: Task,
        slot: usize,
        queues: &RunQueueSet,
    ) -> Result<PlacementStatus, AdmissionError> {
        let mut contents = queues.contents(slot)?;
        contents.extend(self.pending(slot).cloned());
        contents.sort_by_key(|t| t.prio);

        if let Verdict::Reject(reason) = analysis::analyze(&task, &contents) {
            return Err(AdmissionError::SchedulabilityRejected {
                task: task.name,
                slot,
                reason,
            });
        }

        match queues.enqueue(slot, &task) {
            Ok(()) => {
                info!(task = %task.name, slot, queued = contents.len() + 1, "task admitted");
                Ok(PlacementStatus::Committed)
            }
            Err(RunQueueError::Locked) => {
                info!(task = %task.name, slot, "task admitted, buffer locked: parked as pending");
                self.pending.entry(slot).or_default().push_back(task);
                Ok(PlacementStatus::Pending)
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
