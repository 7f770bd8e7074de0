/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Periodic poll loop for the optimizer.
//!
//! Sleeps `query_interval` between polls and stops by itself as soon as the
//! goal is set back to `none`.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::monitor::MonitorSource;
use super::FairnessOptimizer;

/// Microseconds elapsed since `epoch`, the controller clock.
pub fn micros_since(epoch: Instant) -> u64 {
    u64::try_from(epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
}

pub fn spawn(
    optimizer: Arc<Mutex<FairnessOptimizer>>,
    monitor: Arc<dyn MonitorSource>,
    epoch: Instant,
) -> JoinHandle<()> {
    tokio::spawn(run(optimizer, monitor, epoch))
}

pub async fn run(
    optimizer: Arc<Mutex<FairnessOptimizer>>,
    monitor: Arc<dyn MonitorSource>,
    epoch: Instant,
) {
    info!("optimizer driver started");
    loop {
        let interval = {
            let opt = optimizer.lock().await;
            if !opt.goal().is_active() {
                break;
            }
            opt.config().query_interval()
        };

        tokio::time::sleep(interval).await;

        let now_us = micros_since(epoch);
        let mut opt = optimizer.lock().await;
        // Goal may have changed while sleeping
        if !opt.goal().is_active() {
            break;
        }
        let examined = opt.start_optimizing(now_us, monitor.as_ref());
        if examined > 0 {
            debug!(now_us, examined, "optimizer poll");
        }
    }
    info!("optimizer driver stopped");
}
