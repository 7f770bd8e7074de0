/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core task data structures for the scheduling controller.
//!
//! One [`Task`] record flows through the whole admission pipeline:
//!
//! ```text
//! requester ──(Task)──► PlacementPolicy ──(RTA)──► RunQueueSet ──(shared slot)──► dispatcher
//!                              │
//!                              └──(Task)──► FairnessOptimizer
//! ```
//!
//! # Ownership model
//! A `Task` is **moved** into the controller on admission.  The run queue
//! stores a fixed-size copy of it inside shared memory (see
//! [`crate::rq`]); the optimizer keeps only the timing fields it needs,
//! keyed by [`Task::name`].  After admission a task is immutable except
//! through an explicit core reassignment on the optimizer side.

use serde::{Deserialize, Serialize};

// ── Task class ────────────────────────────────────────────────────────────────

/// Criticality class of a task.
///
/// A core serves exactly one class once it hosts a run queue.  Only `Lo`
/// tasks are routed by the placement policy today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskClass {
    /// High-criticality task.
    Hi,
    /// Low-criticality task.
    #[default]
    Lo,
}

impl TaskClass {
    /// Encode as the byte stored in a shared run-queue slot.
    pub fn to_raw(self) -> u8 {
        match self {
            TaskClass::Hi => 0,
            TaskClass::Lo => 1,
        }
    }

    /// Decode from a shared run-queue slot.
    ///
    /// Unknown values are mapped to `Lo`.
    pub fn from_raw(v: u8) -> Self {
        match v {
            0 => TaskClass::Hi,
            _ => TaskClass::Lo,
        }
    }
}

// ── Task strategy ─────────────────────────────────────────────────────────────

/// Scheduling strategy a run queue applies to its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStrategy {
    /// Fixed priority.
    #[default]
    Priority,
    /// Earliest deadline first.
    Deadline,
    /// Deadline with priority tie-break.
    DeadlinePriority,
}

impl TaskStrategy {
    /// Encode as the byte stored in a shared run-queue slot.
    pub fn to_raw(self) -> u8 {
        match self {
            TaskStrategy::Priority => 0,
            TaskStrategy::Deadline => 1,
            TaskStrategy::DeadlinePriority => 2,
        }
    }

    /// Decode from a shared run-queue slot.
    ///
    /// Unknown values are mapped to `Priority`.
    pub fn from_raw(v: u8) -> Self {
        match v {
            1 => TaskStrategy::Deadline,
            2 => TaskStrategy::DeadlinePriority,
            _ => TaskStrategy::Priority,
        }
    }
}

// ── Task ──────────────────────────────────────────────────────────────────────

/// A periodic / sporadic real-time task.
///
/// All timing values are in microseconds.  `prio` follows the convention
/// *lower number = higher priority*.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    // ── Identity ──────────────────────────────────────────────────────────────
    /// Numeric identifier assigned by the requester.
    pub task_id: u32,

    /// Short name.  Unique key on the optimizer side.
    pub name: String,

    // ── Classification ────────────────────────────────────────────────────────
    pub task_class: TaskClass,
    pub task_strategy: TaskStrategy,

    // ── Timing (all in microseconds) ──────────────────────────────────────────
    /// Relative deadline of each job.
    pub deadline_us: u64,

    /// Worst-case execution time of one job.
    pub wcet_us: u64,

    /// Minimum time between two job arrivals.
    pub inter_arrival_us: u64,

    // ── Scheduling parameters ─────────────────────────────────────────────────
    /// Fixed priority, lower = higher.
    pub prio: i32,

    /// Set by the requester once the record is complete.
    pub valid: bool,
}

impl Task {
    /// Processor utilisation fraction: `wcet_us / inter_arrival_us`.
    ///
    /// Returns `0.0` when `inter_arrival_us` is zero to avoid division by zero.
    pub fn utilization(&self) -> f64 {
        if self.inter_arrival_us == 0 {
            0.0
        } else {
            self.wcet_us as f64 / self.inter_arrival_us as f64
        }
    }

    /// `true` if `self` has a strictly higher priority than `other`.
    pub fn outranks(&self, other: &Task) -> bool {
        self.prio < other.prio
    }

    /// `true` if `self` interferes with `other` under fixed-priority
    /// scheduling, i.e. it has the same or a higher priority.
    pub fn interferes_with(&self, other: &Task) -> bool {
        self.prio <= other.prio
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
