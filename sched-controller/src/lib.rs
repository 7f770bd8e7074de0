/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Real-time scheduling controller.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── task          – Task, TaskClass, TaskStrategy
//! ├── config/       – YAML controller configuration and workloads
//! ├── rq/           – shared-memory ring buffers and the run-queue set
//! ├── topology/     – cores, run-queue descriptors and their binding
//! ├── analysis/     – response-time admission test
//! ├── placement/    – run-queue selection and commit
//! ├── optimizer/    – fairness / utilization optimizer and its poll loop
//! └── controller    – request/response facade
//! ```

pub mod analysis;
pub mod config;
pub mod controller;
pub mod optimizer;
pub mod placement;
pub mod rq;
pub mod task;
pub mod topology;
