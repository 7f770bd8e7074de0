/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use thiserror::Error;

use crate::task::TaskClass;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    #[error("core {0} is not part of the topology")]
    InvalidCore(usize),

    #[error("run queue {0} does not exist")]
    InvalidRunQueue(usize),

    /// Class affinity can only change while the core hosts no run queue.
    #[error("core {core} still hosts {count} run queue(s)")]
    CoreBusy { core: usize, count: usize },

    #[error("core {core} serves {core_class:?} tasks, run queue {rq} is {rq_class:?}")]
    ClassMismatch {
        core: usize,
        rq: usize,
        core_class: TaskClass,
        rq_class: TaskClass,
    },

    #[error("run queue {rq} is not assigned to core {core}")]
    NotAssigned { core: usize, rq: usize },

    #[error("run queue {rq} is already assigned to core {core}")]
    AlreadyAssigned { core: usize, rq: usize },

    /// Buffer slot is out of range or already backs another run queue.
    #[error("buffer slot {slot} is unavailable ({slots} slot(s) in the run-queue set)")]
    SlotUnavailable { slot: usize, slots: usize },
}
