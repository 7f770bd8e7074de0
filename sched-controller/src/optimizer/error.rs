/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Optimizer errors.
//!
//! `TaskNotFound`, `InvalidCore` and `DuplicateTask` are returned to callers.
//! `UnresolvedCausationTask` and `StaleNewestJobDetected` describe
//! inconsistencies in monitoring data; they are only ever logged and the
//! cycle carries on.

use thiserror::Error;

use super::record::EndCause;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    #[error("task '{task}' is not tracked{}", ended_suffix(.ended))]
    TaskNotFound {
        task: String,
        ended: Option<EndCause>,
    },

    #[error("core {core} is out of range ({cores} core(s))")]
    InvalidCore { core: usize, cores: usize },

    #[error("task '{0}' is already tracked")]
    DuplicateTask(String),

    #[error("deadline miss of '{task}' has no causation task in monitoring data")]
    UnresolvedCausationTask { task: String },

    #[error("newest known job {newest_job_id} of '{task}' is stale")]
    StaleNewestJobDetected { task: String, newest_job_id: u64 },
}

fn ended_suffix(ended: &Option<EndCause>) -> String {
    match ended {
        Some(cause) => format!(" (already {cause})"),
        None => String::new(),
    }
}
