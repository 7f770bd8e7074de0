/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Error type for the run-queue layer.
//!
//! `Full`, `Locked` and `Empty` are ordinary buffer statuses: they are
//! returned to the caller unchanged through [`RunQueueSet`] and the
//! placement policy.  `Locked` is transient; the caller decides whether to
//! retry.
//!
//! [`RunQueueSet`]: super::RunQueueSet

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunQueueError {
    /// No free slot left (`window == 0`).
    #[error("run queue is full")]
    Full,

    /// Another holder currently owns the buffer's lock word.
    #[error("run queue is locked by another holder")]
    Locked,

    /// Nothing to dequeue (`window == capacity`).
    #[error("run queue is empty")]
    Empty,

    /// `core` is outside `0..count`.
    #[error("invalid run-queue index {core} (run-queue set has {count} slot(s))")]
    InvalidCore { core: usize, count: usize },

    /// Creating, opening or mapping the backing region failed.
    #[error("shared region '{}': {source}", path.display())]
    Region {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An attached region does not have the layout its handle promises.
    #[error("shared region '{}' has an unexpected layout: {detail}", path.display())]
    LayoutMismatch { path: PathBuf, detail: String },
}
