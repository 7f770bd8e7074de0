/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Admission test: Response-Time Analysis (RTA) for fixed-priority
//! scheduling of a candidate task against the contents of one run queue.
//!
//! For every task `k` whose response time the candidate can change (the
//! candidate itself and every queued task of equal or lower priority) the
//! worst-case response time is the least fixed point of
//!
//! ```text
//! R(n+1) = C_k + Σ_{j ≠ k, prio_j ≤ prio_k} ⌈R(n) / T_j⌉ · C_j        R(0) = C_k
//! ```
//!
//! The sequence is non-decreasing, so iteration stops either at a fixed
//! point (`R ≤ D_k`, admit) or as soon as `R > D_k` (reject).  An empty
//! run queue admits any task.
//!
//! After a positive verdict the cheaper utilization test in
//! [`feasibility`] runs over the resulting set; it only ever warns.

pub mod feasibility;

use std::fmt;

use tracing::{debug, info, warn};

use crate::task::Task;

use feasibility::check_priority_levels;

// ── Verdict ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Admit,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_admit(&self) -> bool {
        matches!(self, Verdict::Admit)
    }
}

/// Why the analysis rejected a candidate.  Carries the exact values so the
/// caller can log or forward them without further parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// `task` would no longer meet its deadline.  `task` may be the
    /// candidate or an already-queued task it delays.
    ResponseTimeExceeded {
        task: String,
        response_time_us: u64,
        deadline_us: u64,
    },

    /// An interfering task has no minimum inter-arrival time, so its
    /// interference is unbounded.
    ZeroInterArrival { task: String },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::ResponseTimeExceeded {
                task,
                response_time_us,
                deadline_us,
            } => write!(
                f,
                "response time of '{}' would reach {}us, deadline is {}us",
                task, response_time_us, deadline_us
            ),
            RejectReason::ZeroInterArrival { task } => {
                write!(f, "task '{}' has a zero inter-arrival time", task)
            }
        }
    }
}

// ── Analysis ──────────────────────────────────────────────────────────────────

/// Decide whether `candidate` can join a run queue currently holding
/// `queued`.
pub fn analyze(candidate: &Task, queued: &[Task]) -> Verdict {
    if queued.is_empty() {
        debug!(task = %candidate.name, "run queue empty, admitting");
        return Verdict::Admit;
    }

    // Index 0 is the candidate
    let set: Vec<&Task> = std::iter::once(candidate).chain(queued.iter()).collect();

    for (k, task) in set.iter().enumerate() {
        if k > 0 && task.outranks(candidate) {
            // Unaffected by a lower-priority arrival
            continue;
        }

        let interferers: Vec<&Task> = set
            .iter()
            .enumerate()
            .filter(|(j, other)| *j != k && other.interferes_with(task))
            .map(|(_, other)| *other)
            .collect();

        if let Some(z) = interferers.iter().find(|t| t.inter_arrival_us == 0) {
            info!(task = %candidate.name, offender = %z.name, "admission rejected: zero inter-arrival");
            return Verdict::Reject(RejectReason::ZeroInterArrival {
                task: z.name.clone(),
            });
        }

        match response_time(task, &interferers) {
            Ok(r) => debug!(
                task = %task.name,
                response_time_us = r,
                deadline_us = task.deadline_us,
                "RTA fixed point"
            ),
            Err(r) => {
                info!(
                    candidate = %candidate.name,
                    task = %task.name,
                    response_time_us = r,
                    deadline_us = task.deadline_us,
                    "admission rejected by RTA"
                );
                return Verdict::Reject(RejectReason::ResponseTimeExceeded {
                    task: task.name.clone(),
                    response_time_us: r,
                    deadline_us: task.deadline_us,
                });
            }
        }
    }

    if let Some(over) = check_priority_levels(&set) {
        warn!(
            candidate = %candidate.name,
            level = over.level,
            task = %over.task,
            utilization = over.utilization,
            bound = over.bound,
            "utilization test inconclusive, relying on RTA"
        );
    }

    Verdict::Admit
}

/// Worst-case response time of `task` under `interferers`.
///
/// `Ok(R)` at the fixed point with `R ≤ deadline`, `Err(R)` with the first
/// iterate exceeding the deadline.  Every interferer must have a non-zero
/// inter-arrival time.
pub fn response_time(task: &Task, interferers: &[&Task]) -> Result<u64, u64> {
    let mut r = task.wcet_us;
    loop {
        let next = interferers.iter().fold(task.wcet_us, |acc, j| {
            let releases = r.div_ceil(j.inter_arrival_us.max(1));
            acc.saturating_add(releases.saturating_mul(j.wcet_us))
        });

        if next > task.deadline_us {
            return Err(next);
        }
        if next == r {
            return Ok(next);
        }
        r = next;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
