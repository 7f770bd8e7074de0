/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Optimization goal and the `set_optimization_goal` payload.
//!
//! The goal only selects the comparison metric used by the scheduling
//! decision; the state transitions are the same for every goal.
//!
//! | Goal          | Metric compared between competitors         |
//! |---------------|---------------------------------------------|
//! | `none`        | (optimizer idle, permissions never change)  |
//! | `fairness`    | per-core value (debt counter)               |
//! | `utilization` | last measured `execution_time / inter_arrival` |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::record::OptimizationTaskRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationGoal {
    #[default]
    None,
    Fairness,
    Utilization,
}

impl OptimizationGoal {
    pub fn is_active(self) -> bool {
        self != OptimizationGoal::None
    }

    /// Metric of `rec` under this goal; `None` when the goal is `None`.
    pub fn metric(self, rec: &OptimizationTaskRecord) -> Option<f64> {
        match self {
            OptimizationGoal::None => None,
            OptimizationGoal::Fairness => Some(rec.current_value() as f64),
            OptimizationGoal::Utilization => Some(rec.utilization),
        }
    }
}

impl std::fmt::Display for OptimizationGoal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OptimizationGoal::None => "none",
            OptimizationGoal::Fairness => "fairness",
            OptimizationGoal::Utilization => "utilization",
        };
        f.write_str(s)
    }
}

/// Payload of `set_optimization_goal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    pub goal: OptimizationGoal,
    /// A competitor must exceed the task's own value by more than this to
    /// take the permission away from it.  Fairness goal only.
    pub fairness_acceptance: u32,
    /// Sleep between two monitor polls.
    pub query_interval_ms: u64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            goal: OptimizationGoal::None,
            fairness_acceptance: 0,
            query_interval_ms: 100,
        }
    }
}

impl OptimizationConfig {
    pub fn query_interval(&self) -> Duration {
        Duration::from_millis(self.query_interval_ms.max(1))
    }

    /// Margin a competitor's metric must exceed the task's own by.
    pub fn threshold(&self) -> f64 {
        match self.goal {
            OptimizationGoal::Fairness => self.fairness_acceptance as f64,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let cfg: OptimizationConfig = serde_yaml::from_str("goal: fairness").unwrap();
        assert_eq!(cfg.goal, OptimizationGoal::Fairness);
        assert_eq!(cfg.fairness_acceptance, 0);
        assert_eq!(cfg.query_interval(), Duration::from_millis(100));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let cfg = OptimizationConfig {
            query_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(cfg.query_interval(), Duration::from_millis(1));
    }

    #[test]
    fn acceptance_applies_to_fairness_only() {
        let mut cfg = OptimizationConfig {
            goal: OptimizationGoal::Fairness,
            fairness_acceptance: 2,
            ..Default::default()
        };
        assert_eq!(cfg.threshold(), 2.0);
        cfg.goal = OptimizationGoal::Utilization;
        assert_eq!(cfg.threshold(), 0.0);
    }
}
