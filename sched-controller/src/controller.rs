/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Request/response facade over the run queues, admission and optimizer.
//!
//! `core` in every request is a run-queue buffer slot.  Buffer requests go
//! straight to the shared run queues; admission requests are serialized by
//! the controller, which makes it the single admission authority for its
//! run queues.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::optimizer::{driver, FairnessOptimizer, MonitorSource, OptimizationConfig};
use crate::placement::{AdmissionError, Placement, PlacementPolicy};
use crate::rq::{RunQueueError, RunQueueHandle, RunQueueSet};
use crate::task::Task;
use crate::topology::CoreTopology;

struct AdmissionState {
    topology: CoreTopology,
    placement: PlacementPolicy,
}

pub struct SchedController {
    queues: Arc<RunQueueSet>,
    admission: Mutex<AdmissionState>,
    optimizer: Arc<Mutex<FairnessOptimizer>>,
    monitor: Arc<dyn MonitorSource>,
    epoch: Instant,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SchedController {
    /// Create the run-queue set under `config.shm_dir` and the configured
    /// topology.  The optimizer starts idle; apply `config.optimization`
    /// with [`set_optimization_goal`](Self::set_optimization_goal).
    pub fn new(config: &ControllerConfig, monitor: Arc<dyn MonitorSource>) -> Result<Self> {
        let topology = config.build_topology()?;
        let queues = RunQueueSet::new(&config.shm_dir, config.buffer_slots(), config.run_queue_capacity)
            .with_context(|| format!("Cannot create run queues in {}", config.shm_dir.display()))?;
        Ok(Self::from_parts(topology, queues, monitor))
    }

    pub fn from_parts(topology: CoreTopology, queues: RunQueueSet, monitor: Arc<dyn MonitorSource>) -> Self {
        let optimizer = FairnessOptimizer::new(queues.count());
        info!(slots = queues.count(), run_queues = topology.run_queues().len(), "controller ready");
        Self {
            queues: Arc::new(queues),
            admission: Mutex::new(AdmissionState {
                topology,
                placement: PlacementPolicy::new(),
            }),
            optimizer: Arc::new(Mutex::new(optimizer)),
            monitor,
            epoch: Instant::now(),
            driver: Mutex::new(None),
        }
    }

    pub fn queues(&self) -> &RunQueueSet {
        &self.queues
    }

    /// Controller clock in microseconds; the time base of monitor records.
    pub fn now_us(&self) -> u64 {
        driver::micros_since(self.epoch)
    }

    // ── Run-queue requests ────────────────────────────────────────────────────

    pub fn enqueue(&self, core: usize, task: &Task) -> Result<(), RunQueueError> {
        self.queues.enqueue(core, task).inspect_err(|e| {
            debug!(core, task = %task.name, status = %e, "enqueue refused");
        })
    }

    pub fn dequeue(&self, core: usize) -> Result<Task, RunQueueError> {
        self.queues.dequeue(core).inspect_err(|e| {
            debug!(core, status = %e, "dequeue refused");
        })
    }

    pub fn get_run_queue_handle(&self, core: usize) -> Result<RunQueueHandle, RunQueueError> {
        self.queues.handle_for(core)
    }

    pub fn are_you_ready(&self) -> bool {
        debug!("readiness check");
        true
    }

    // ── Admission ─────────────────────────────────────────────────────────────

    /// Admit `task`, on buffer slot `core` when given, otherwise on the run
    /// queue chosen by the placement policy.  Admitted tasks are tracked by
    /// the optimizer on the slot they were placed on.
    pub async fn new_task(&self, task: Task, core: Option<usize>) -> Result<Placement, AdmissionError> {
        let tracked = task.clone();
        // Admission lock before optimizer lock
        let mut state = self.admission.lock().await;
        if self.optimizer.lock().await.task(&tracked.name).is_some() {
            info!(task = %tracked.name, "admission rejected: name already tracked");
            return Err(AdmissionError::DuplicateTask { task: tracked.name });
        }

        let AdmissionState { topology, placement } = &mut *state;
        let placed = match core {
            Some(slot) => placement.place_on(task, slot, &self.queues),
            None => placement.place(task, topology, &self.queues),
        };
        let placement = match placed {
            Ok(p) => p,
            Err(e) => {
                info!(task = %tracked.name, requested = ?core, reason = %e, "admission rejected");
                return Err(e);
            }
        };
        info!(
            task = %tracked.name,
            slot = placement.slot,
            status = ?placement.status,
            created_run_queue = placement.created_run_queue,
            "task admitted"
        );

        if let Err(e) = self.optimizer.lock().await.add_task(placement.slot, &tracked) {
            warn!(task = %tracked.name, error = %e, "admitted task not tracked by optimizer");
        }
        Ok(placement)
    }

    /// Commit admissions parked while slot `core` was locked.  Returns how
    /// many tasks entered the buffer.
    pub async fn update_run_queue(&self, core: usize) -> Result<usize, AdmissionError> {
        let mut state = self.admission.lock().await;
        let committed = state.placement.flush_pending(core, &self.queues)?;
        if committed > 0 {
            info!(core, committed, "pending admissions committed");
        }
        Ok(committed)
    }

    pub async fn pending_admissions(&self) -> usize {
        self.admission.lock().await.placement.pending_count()
    }

    /// Run `f` against the current topology.
    pub async fn with_topology<R>(&self, f: impl FnOnce(&CoreTopology) -> R) -> R {
        f(&self.admission.lock().await.topology)
    }

    // ── Optimizer ─────────────────────────────────────────────────────────────

    /// Apply `config` and start the poll loop if a goal is set and no loop
    /// is running.
    pub async fn set_optimization_goal(&self, config: OptimizationConfig) {
        let active = config.goal.is_active();
        self.optimizer.lock().await.set_goal(config);

        let mut current = self.driver.lock().await;
        let running = current.as_ref().is_some_and(|h| !h.is_finished());
        if active && !running {
            *current = Some(driver::spawn(
                self.optimizer.clone(),
                self.monitor.clone(),
                self.epoch,
            ));
        }
    }

    /// `false` for tasks the optimizer does not track.
    pub async fn scheduling_allowed(&self, name: &str) -> bool {
        self.optimizer.lock().await.scheduling_allowed(name).unwrap_or(false)
    }

    pub async fn last_job_started(&self, name: &str) {
        // Unknown tasks are logged by the optimizer
        let _ = self.optimizer.lock().await.last_job_started(name);
    }

    pub async fn change_core(&self, name: &str, core: usize) -> bool {
        match self.optimizer.lock().await.change_core(name, core) {
            Ok(()) => true,
            Err(e) => {
                warn!(task = name, core, error = %e, "change_core refused");
                false
            }
        }
    }

    /// Run `f` against the optimizer state.
    pub async fn with_optimizer<R>(&self, f: impl FnOnce(&FairnessOptimizer) -> R) -> R {
        f(&*self.optimizer.lock().await)
    }

    /// Stop the poll loop, if any.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.driver.lock().await.take() {
            handle.abort();
            let _ = handle.await;
            info!("optimizer driver shut down");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::optimizer::{InMemoryMonitor, JobRecord, OptimizationGoal};
    use crate::placement::PlacementStatus;
    use crate::rq::SharedRingBuffer;
    use crate::task::TaskClass;
    use tempfile::TempDir;

    fn task(name: &str, prio: i32) -> Task {
        Task {
            name: name.into(),
            prio,
            wcet_us: 1_000,
            inter_arrival_us: 10_000,
            deadline_us: 10_000,
            valid: true,
            ..Default::default()
        }
    }

    fn controller(dir: &TempDir, monitor: Arc<InMemoryMonitor>) -> SchedController {
        let config = ControllerConfig {
            shm_dir: dir.path().to_path_buf(),
            run_queue_capacity: 4,
            ..Default::default()
        };
        SchedController::new(&config, monitor).unwrap()
    }

    // ── Run-queue requests ────────────────────────────────────────────────────

    #[tokio::test]
    async fn buffer_requests_pass_through() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir, Arc::new(InMemoryMonitor::new()));
        assert!(ctl.are_you_ready());

        ctl.enqueue(1, &task("a", 1)).unwrap();
        assert_eq!(ctl.dequeue(1).unwrap().name, "a");
        assert!(matches!(ctl.dequeue(1), Err(RunQueueError::Empty)));
        assert!(matches!(
            ctl.enqueue(5, &task("b", 1)),
            Err(RunQueueError::InvalidCore { core: 5, count: 2 })
        ));
    }

    #[tokio::test]
    async fn handle_attaches_to_the_same_buffer() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir, Arc::new(InMemoryMonitor::new()));
        ctl.enqueue(0, &task("shared", 3)).unwrap();

        let handle = ctl.get_run_queue_handle(0).unwrap();
        let remote = SharedRingBuffer::attach(&handle).unwrap();
        assert_eq!(remote.dequeue().unwrap().name, "shared");
        assert!(matches!(ctl.dequeue(0), Err(RunQueueError::Empty)));
    }

    // ── Admission ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn admitted_task_is_queued_and_tracked() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir, Arc::new(InMemoryMonitor::new()));

        let placement = ctl.new_task(task("cam", 1), None).await.unwrap();
        assert_eq!(placement.status, PlacementStatus::Committed);
        assert!(placement.created_run_queue);
        assert_eq!(ctl.queues().len(placement.slot).unwrap(), 1);

        assert!(ctl.scheduling_allowed("cam").await);
        let core = ctl.with_optimizer(|o| o.task("cam").map(|r| r.core)).await;
        assert_eq!(core, Some(placement.slot));
        let run_queues = ctl.with_topology(|t| t.run_queues().len()).await;
        assert_eq!(run_queues, 1);
    }

    #[tokio::test]
    async fn explicit_core_admission() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir, Arc::new(InMemoryMonitor::new()));

        let placement = ctl.new_task(task("lidar", 2), Some(1)).await.unwrap();
        assert_eq!(placement.slot, 1);
        assert_eq!(placement.run_queue, None);
        assert_eq!(ctl.dequeue(1).unwrap().name, "lidar");
    }

    #[tokio::test]
    async fn rejected_task_is_not_tracked() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir, Arc::new(InMemoryMonitor::new()));
        let hi = Task {
            task_class: TaskClass::Hi,
            ..task("brake", 0)
        };

        assert!(matches!(
            ctl.new_task(hi, None).await,
            Err(AdmissionError::UnsupportedTaskClass { .. })
        ));
        assert!(!ctl.scheduling_allowed("brake").await);
    }

    #[tokio::test]
    async fn second_admission_of_same_name_is_refused() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir, Arc::new(InMemoryMonitor::new()));

        ctl.new_task(task("dup", 1), Some(0)).await.unwrap();
        assert!(matches!(
            ctl.new_task(task("dup", 2), Some(0)).await,
            Err(AdmissionError::DuplicateTask { .. })
        ));
        assert!(matches!(
            ctl.new_task(task("dup", 2), None).await,
            Err(AdmissionError::DuplicateTask { .. })
        ));
        assert_eq!(ctl.queues().len(0).unwrap(), 1);
        assert_eq!(ctl.with_topology(|t| t.run_queues().len()).await, 0);
    }

    #[tokio::test]
    async fn locked_slot_refuses_admission_until_released() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir, Arc::new(InMemoryMonitor::new()));

        let guard = ctl.queues().get(0).unwrap().try_lock().unwrap();
        assert!(matches!(
            ctl.new_task(task("late", 1), Some(0)).await,
            Err(AdmissionError::RunQueue(RunQueueError::Locked))
        ));
        assert!(!ctl.scheduling_allowed("late").await);
        drop(guard);

        let placement = ctl.new_task(task("late", 1), Some(0)).await.unwrap();
        assert_eq!(placement.status, PlacementStatus::Committed);
        assert_eq!(ctl.pending_admissions().await, 0);
        assert_eq!(ctl.update_run_queue(0).await.unwrap(), 0);
        assert!(matches!(
            ctl.update_run_queue(7).await,
            Err(AdmissionError::RunQueue(RunQueueError::InvalidCore { .. }))
        ));
    }

    // ── Optimizer ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn change_core_reports_success() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir, Arc::new(InMemoryMonitor::new()));
        ctl.new_task(task("a", 1), Some(0)).await.unwrap();

        assert!(ctl.change_core("a", 1).await);
        assert!(!ctl.change_core("a", 9).await);
        assert!(!ctl.change_core("nobody", 0).await);
        ctl.last_job_started("a").await;
        ctl.last_job_started("nobody").await;
    }

    #[tokio::test(start_paused = true)]
    async fn goal_starts_and_stops_the_driver() {
        let dir = TempDir::new().unwrap();
        let monitor = Arc::new(InMemoryMonitor::new());
        let ctl = controller(&dir, monitor.clone());
        ctl.new_task(task("a", 1), Some(0)).await.unwrap();

        monitor.record_job(JobRecord {
            job_id: 1,
            task_name: "a".into(),
            core: 0,
            arrival_time: 1_000,
            exit_time: 4_000,
            execution_time: 3_000,
        });
        ctl.set_optimization_goal(OptimizationConfig {
            goal: OptimizationGoal::Fairness,
            fairness_acceptance: 0,
            query_interval_ms: 5,
        })
        .await;

        tokio::time::sleep(Duration::from_millis(17)).await;
        let utilization = ctl.with_optimizer(|o| o.task("a").map(|r| r.utilization)).await;
        assert!((utilization.unwrap() - 0.3).abs() < 1e-9);

        ctl.set_optimization_goal(OptimizationConfig::default()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let finished = ctl.driver.lock().await.as_ref().map(|h| h.is_finished());
        assert_eq!(finished, Some(true));
        ctl.shutdown().await;
    }
}
