/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Registry of cores and the run queues they host.
//!
//! [`CoreTopology`] is an explicit object owned by the controller; there is
//! no process-wide registry.
//!
//! ```text
//! core 0 ── { rq 0 }          rq 0 ─► buffer slot 0 (lo, priority)
//! core 1 ── { rq 1, rq 2 }    rq 1 ─► buffer slot 1 (lo, deadline)
//! core 2 ── { }   (unused)    rq 2 ─► buffer slot 2 (lo, priority)
//! ```
//!
//! Run-queue ids are indices into the descriptor list and are never reused.
//! A core's class affinity is fixed while it hosts at least one run queue.
//!
//! `BTreeMap`/`BTreeSet` everywhere so iteration order (and therefore the
//! placement tie-break) is deterministic.

mod error;

pub use error::TopologyError;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::task::{TaskClass, TaskStrategy};

// ── Descriptors ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreState {
    #[default]
    Active,
    Standby,
    Off,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoreDescriptor {
    pub id: usize,
    pub state: CoreState,
    /// Task class this core currently serves.
    pub class_affinity: TaskClass,
    /// Ids of the run queues hosted on this core.
    pub assigned_run_queues: BTreeSet<usize>,
}

impl CoreDescriptor {
    pub fn new(id: usize, state: CoreState) -> Self {
        Self {
            id,
            state,
            class_affinity: TaskClass::Lo,
            assigned_run_queues: BTreeSet::new(),
        }
    }

    pub fn is_unused(&self) -> bool {
        self.assigned_run_queues.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunQueueDescriptor {
    pub task_class: TaskClass,
    pub task_strategy: TaskStrategy,
    /// Slot in the [`RunQueueSet`](crate::rq::RunQueueSet) backing this queue.
    pub buffer_index: usize,
    /// Last reported utilization of the queue (0.0 ..).
    pub utilization: f64,
}

impl RunQueueDescriptor {
    pub fn new(task_class: TaskClass, task_strategy: TaskStrategy, buffer_index: usize) -> Self {
        Self {
            task_class,
            task_strategy,
            buffer_index,
            utilization: 0.0,
        }
    }

    pub fn matches(&self, class: TaskClass, strategy: TaskStrategy) -> bool {
        self.task_class == class && self.task_strategy == strategy
    }
}

// ── CoreTopology ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CoreTopology {
    cores: BTreeMap<usize, CoreDescriptor>,
    run_queues: Vec<RunQueueDescriptor>,
    /// Number of buffers in the run-queue set.
    buffer_slots: usize,
}

impl CoreTopology {
    pub fn new(cores: impl IntoIterator<Item = CoreDescriptor>, buffer_slots: usize) -> Self {
        let cores: BTreeMap<usize, CoreDescriptor> =
            cores.into_iter().map(|c| (c.id, c)).collect();
        info!(cores = cores.len(), buffer_slots, "core topology initialised");
        Self {
            cores,
            run_queues: Vec::new(),
            buffer_slots,
        }
    }

    /// `count` active cores with one buffer slot each.
    pub fn with_active_cores(count: usize) -> Self {
        Self::new(
            (0..count).map(|id| CoreDescriptor::new(id, CoreState::Active)),
            count,
        )
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn core(&self, id: usize) -> Result<&CoreDescriptor, TopologyError> {
        self.cores.get(&id).ok_or(TopologyError::InvalidCore(id))
    }

    pub fn cores(&self) -> impl Iterator<Item = &CoreDescriptor> {
        self.cores.values()
    }

    pub fn run_queue(&self, rq: usize) -> Result<&RunQueueDescriptor, TopologyError> {
        self.run_queues.get(rq).ok_or(TopologyError::InvalidRunQueue(rq))
    }

    pub fn run_queues(&self) -> &[RunQueueDescriptor] {
        &self.run_queues
    }

    pub fn buffer_slots(&self) -> usize {
        self.buffer_slots
    }

    /// All cores absent from the core → run-queue association.
    pub fn get_unused_cores(&self) -> Vec<usize> {
        self.cores
            .values()
            .filter(|c| c.is_unused())
            .map(|c| c.id)
            .collect()
    }

    /// Core hosting run queue `rq`, if any.
    pub fn core_of(&self, rq: usize) -> Option<usize> {
        self.cores
            .values()
            .find(|c| c.assigned_run_queues.contains(&rq))
            .map(|c| c.id)
    }

    /// Ids of the run queues bound to a core whose class and strategy match,
    /// in id order.
    pub fn run_queues_matching(&self, class: TaskClass, strategy: TaskStrategy) -> Vec<usize> {
        self.run_queues
            .iter()
            .enumerate()
            .filter(|(id, rq)| rq.matches(class, strategy) && self.core_of(*id).is_some())
            .map(|(id, _)| id)
            .collect()
    }

    /// Lowest buffer slot not backing any run queue.
    pub fn free_buffer_slot(&self) -> Option<usize> {
        (0..self.buffer_slots).find(|slot| self.run_queues.iter().all(|rq| rq.buffer_index != *slot))
    }

    // ── Mutation ──────────────────────────────────────────────────────────────

    /// Register a run queue.  It is not hosted by any core until
    /// [`allocate_rq`](Self::allocate_rq).
    pub fn add_run_queue(&mut self, desc: RunQueueDescriptor) -> Result<usize, TopologyError> {
        let slot = desc.buffer_index;
        if slot >= self.buffer_slots || self.run_queues.iter().any(|rq| rq.buffer_index == slot) {
            return Err(TopologyError::SlotUnavailable {
                slot,
                slots: self.buffer_slots,
            });
        }
        self.run_queues.push(desc);
        let id = self.run_queues.len() - 1;
        debug!(rq = id, slot, "run queue registered");
        Ok(id)
    }

    /// Host run queue `rq` on `core`.
    ///
    /// A core without run queues takes on the queue's class; otherwise the
    /// classes must agree.
    pub fn allocate_rq(&mut self, core: usize, rq: usize) -> Result<(), TopologyError> {
        let rq_class = self.run_queue(rq)?.task_class;
        if let Some(owner) = self.core_of(rq) {
            return Err(TopologyError::AlreadyAssigned { core: owner, rq });
        }

        let desc = self.cores.get_mut(&core).ok_or(TopologyError::InvalidCore(core))?;
        if desc.is_unused() {
            desc.class_affinity = rq_class;
        } else if desc.class_affinity != rq_class {
            return Err(TopologyError::ClassMismatch {
                core,
                rq,
                core_class: desc.class_affinity,
                rq_class,
            });
        }
        desc.assigned_run_queues.insert(rq);

        info!(core, rq, class = ?rq_class, "run queue allocated to core");
        Ok(())
    }

    pub fn deallocate_rq(&mut self, core: usize, rq: usize) -> Result<(), TopologyError> {
        let desc = self.cores.get_mut(&core).ok_or(TopologyError::InvalidCore(core))?;
        if !desc.assigned_run_queues.remove(&rq) {
            return Err(TopologyError::NotAssigned { core, rq });
        }
        info!(core, rq, "run queue deallocated from core");
        Ok(())
    }

    pub fn set_class_affinity(&mut self, core: usize, class: TaskClass) -> Result<(), TopologyError> {
        let desc = self.cores.get_mut(&core).ok_or(TopologyError::InvalidCore(core))?;
        if !desc.is_unused() {
            return Err(TopologyError::CoreBusy {
                core,
                count: desc.assigned_run_queues.len(),
            });
        }
        desc.class_affinity = class;
        Ok(())
    }

    pub fn set_core_state(&mut self, core: usize, state: CoreState) -> Result<(), TopologyError> {
        let desc = self.cores.get_mut(&core).ok_or(TopologyError::InvalidCore(core))?;
        desc.state = state;
        Ok(())
    }

    /// Record the measured utilization of run queue `rq`.
    pub fn report_utilization(&mut self, rq: usize, utilization: f64) -> Result<(), TopologyError> {
        let desc = self
            .run_queues
            .get_mut(rq)
            .ok_or(TopologyError::InvalidRunQueue(rq))?;
        desc.utilization = utilization.max(0.0);
        debug!(rq, utilization = desc.utilization, "run-queue utilization reported");
        Ok(())
    }

    /// Create a run queue for `class`/`strategy` on buffer `slot` and host it
    /// on the unused `core`.
    pub fn bind_new_run_queue(
        &mut self,
        core: usize,
        slot: usize,
        class: TaskClass,
        strategy: TaskStrategy,
    ) -> Result<usize, TopologyError> {
        let count = self.core(core)?.assigned_run_queues.len();
        if count > 0 {
            return Err(TopologyError::CoreBusy { core, count });
        }
        let rq = self.add_run_queue(RunQueueDescriptor::new(class, strategy, slot))?;
        self.allocate_rq(core, rq)?;
        info!(core, rq, slot, class = ?class, strategy = ?strategy, "new run queue bound to free core");
        Ok(rq)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
