/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error type for task admission.
//!
//! Every rejection is terminal for the request: the policy never retries
//! on its own and never falls back to a second run queue after the chosen
//! one failed the schedulability test.
//!
//! | Variant | Meaning |
//! |---|---|
//! | `UnsupportedTaskClass` | only `Lo` tasks are routed |
//! | `DuplicateTask` | a task with the same name is already admitted |
//! | `NoMatchingRunQueue` | no queue matches and none can be created |
//! | `NoCapacityOnAnyCore` | no queue matches and every core is in use |
//! | `SchedulabilityRejected` | RTA failed on the selected queue |
//! | `RunQueue` | buffer status (`Full`, `Locked`, `InvalidCore`, ...) passed through |
//! | `Topology` | core/run-queue bookkeeping failed |

use thiserror::Error;

use crate::analysis::RejectReason;
use crate::rq::RunQueueError;
use crate::task::{TaskClass, TaskStrategy};
use crate::topology::TopologyError;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("task '{task}' has class {class:?}, which has no admission path")]
    UnsupportedTaskClass { task: String, class: TaskClass },

    #[error("task '{task}' is already admitted")]
    DuplicateTask { task: String },

    /// A free core exists but every buffer slot already backs a run queue.
    #[error("no run queue for {class:?}/{strategy:?} and no free buffer slot for task '{task}'")]
    NoMatchingRunQueue {
        task: String,
        class: TaskClass,
        strategy: TaskStrategy,
    },

    #[error("no matching run queue and no unused core for task '{task}'")]
    NoCapacityOnAnyCore { task: String },

    /// Response-time analysis rejected the task for buffer slot `slot`.
    #[error("task '{task}' rejected on run-queue slot {slot}: {reason}")]
    SchedulabilityRejected {
        task: String,
        slot: usize,
        reason: RejectReason,
    },

    #[error(transparent)]
    RunQueue(#[from] RunQueueError),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}
