/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Utilization-based sufficient schedulability test.
//!
//! This test is **advisory only**: admission is decided by response-time
//! analysis, and an overload reported here is logged as a warning.
//!
//! # Theory
//! For fixed-priority scheduling, priority level `k` (the `k` highest
//! priority tasks, counting ties) is guaranteed schedulable if the
//! cumulative utilization of that prefix stays within the Liu & Layland
//! bound for `k` tasks:
//!
//! $$\sum_{i=1}^{k} \frac{C_i}{T_i} \leq k \left(2^{1/k} - 1\right)$$
//!
//! | k | Bound |
//! |---|---|
//! | 1 | 1.000 |
//! | 2 | 0.828 |
//! | 3 | 0.780 |
//! | ∞ | ln(2) ≈ 0.693 |
//!
//! Failing the bound does not mean the set is unschedulable, only that the
//! cheap test cannot prove it.

use crate::task::Task;

/// First priority level whose cumulative utilization exceeds its bound.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelOverload {
    /// 1-based size of the prefix that failed.
    pub level: usize,
    /// Lowest-priority task of that prefix.
    pub task: String,
    pub utilization: f64,
    pub bound: f64,
}

/// `U_bound(n) = n × (2^(1/n) − 1)`; `0.0` for `n = 0`.
pub fn liu_layland_bound(n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let nf = n as f64;
    nf * (2.0_f64.powf(1.0 / nf) - 1.0)
}

/// Run the per-level test over `tasks` (any order).
///
/// Tasks with `inter_arrival_us == 0` are skipped; they contribute no
/// utilization by definition.
pub fn check_priority_levels(tasks: &[&Task]) -> Option<LevelOverload> {
    let mut ordered: Vec<&Task> = tasks
        .iter()
        .copied()
        .filter(|t| t.inter_arrival_us > 0)
        .collect();
    ordered.sort_by_key(|t| t.prio);

    let mut cumulative = 0.0;
    for (i, task) in ordered.iter().enumerate() {
        cumulative += task.utilization();
        let level = i + 1;
        let bound = liu_layland_bound(level);
        if cumulative > bound + 1e-12 {
            return Some(LevelOverload {
                level,
                task: task.name.clone(),
                utilization: cumulative,
                bound,
            });
        }
    }
    None
}

// ── Tests ─────────────────────────────────────────────────────────────────────
