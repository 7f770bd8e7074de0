/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Fairness / utilization optimizer.
//!
//! [`FairnessOptimizer`] tracks every admitted task, reads monitoring
//! snapshots once per poll and decides per task whether its next job may
//! start ([`FairnessOptimizer::scheduling_allowed`]).
//!
//! # Per-task cycle
//! A task is examined when its current job's absolute deadline has passed
//! (or before its first job has been seen):
//!
//! ```text
//!             query monitor (jobs since arrival_time)
//!                          │
//!         ┌────────────────┼─────────────────────┐
//!      0 jobs            1 job               ≥ 2 jobs
//!         │                │          (most recent + second most recent)
//!   not executed        executed ◄───────────────┘
//!    │        │           │       │
//! denied  permitted   in time   miss ──► deadline-miss procedure
//!    │        │           │               (cause → competitor, groups,
//! value+1  killed or   value-1            value+1, decay)
//!    │     finished?      │
//!    └────────┴───────────┴──► scheduling decision (to_schedule flags)
//! ```
//!
//! # Scheduling decision
//! Among the task and its same-core competitors, a competitor whose metric
//! exceeds the task's own (by more than the fairness acceptance) takes the
//! permission; otherwise the task keeps it and its same-core competitors
//! lose it.  The metric is the per-core value for `fairness` and the
//! measured utilization for `utilization`.
//!
//! All maps are `BTreeMap`/`BTreeSet` so a poll processes tasks in name
//! order and produces the same result on every run.

pub mod driver;
pub mod error;
pub mod goal;
pub mod group;
pub mod monitor;
pub mod record;

pub use error::OptimizerError;
pub use goal::{OptimizationConfig, OptimizationGoal};
pub use group::{RelatedGroups, RelatedTaskGroup};
pub use monitor::{InMemoryMonitor, JobRecord, MonitorSource, TerminatedJob};
pub use record::{EndCause, EndedTaskRecord, NewestJob, OptimizationTaskRecord};

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::task::Task;

/// Monitoring data pulled at the start of one poll.
struct Poll<'a> {
    now: u64,
    jobs: Vec<JobRecord>,
    monitor: &'a dyn MonitorSource,
}

impl Poll<'_> {
    fn terminated(&self) -> Vec<TerminatedJob> {
        self.monitor.terminated()
    }
}

// ── FairnessOptimizer ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct FairnessOptimizer {
    config: OptimizationConfig,
    num_cores: usize,
    tasks: BTreeMap<String, OptimizationTaskRecord>,
    groups: RelatedGroups,
    ended: BTreeMap<String, EndedTaskRecord>,
}

impl FairnessOptimizer {
    /// Idle optimizer (goal `none`) for a platform with `num_cores` cores.
    pub fn new(num_cores: usize) -> Self {
        Self {
            config: OptimizationConfig::default(),
            num_cores,
            tasks: BTreeMap::new(),
            groups: RelatedGroups::default(),
            ended: BTreeMap::new(),
        }
    }

    // ── Public operations ─────────────────────────────────────────────────────

    pub fn set_goal(&mut self, config: OptimizationConfig) {
        info!(
            goal = %config.goal,
            fairness_acceptance = config.fairness_acceptance,
            query_interval_ms = config.query_interval_ms,
            "optimization goal set"
        );
        self.config = config;
    }

    /// Start tracking an admitted task on `core`.
    pub fn add_task(&mut self, core: usize, task: &Task) -> Result<(), OptimizerError> {
        self.check_core(core)?;
        if self.tasks.contains_key(&task.name) {
            return Err(OptimizerError::DuplicateTask(task.name.clone()));
        }
        if self.ended.remove(&task.name).is_some() {
            debug!(task = %task.name, "re-admitted task, history entry dropped");
        }
        self.tasks.insert(
            task.name.clone(),
            OptimizationTaskRecord::new(task, core, self.num_cores),
        );
        info!(task = %task.name, core, deadline_us = task.deadline_us, "optimizer tracking task");
        Ok(())
    }

    /// Permission flag for the next job of `name`.
    ///
    /// # Errors
    /// [`OptimizerError::TaskNotFound`], carrying the end cause when the
    /// task has already left the optimizer.
    pub fn scheduling_allowed(&self, name: &str) -> Result<bool, OptimizerError> {
        if let Some(rec) = self.tasks.get(name) {
            return Ok(rec.to_schedule);
        }
        let ended = self.ended.get(name).map(|e| e.cause);
        match ended {
            Some(cause) => info!(task = name, %cause, "scheduling_allowed: task has already ended"),
            None => info!(task = name, "scheduling_allowed: task is neither tracked nor ended"),
        }
        Err(OptimizerError::TaskNotFound {
            task: name.to_string(),
            ended,
        })
    }

    /// The dispatcher started the final job of `name`.
    pub fn last_job_started(&mut self, name: &str) -> Result<(), OptimizerError> {
        match self.tasks.get_mut(name) {
            Some(rec) => {
                rec.last_job_started = true;
                debug!(task = name, "last job started");
                Ok(())
            }
            None => {
                warn!(task = name, "last_job_started for a task that is not tracked");
                Err(OptimizerError::TaskNotFound {
                    task: name.to_string(),
                    ended: self.ended.get(name).map(|e| e.cause),
                })
            }
        }
    }

    pub fn change_core(&mut self, name: &str, core: usize) -> Result<(), OptimizerError> {
        self.check_core(core)?;
        let rec = self
            .tasks
            .get_mut(name)
            .ok_or_else(|| OptimizerError::TaskNotFound {
                task: name.to_string(),
                ended: self.ended.get(name).map(|e| e.cause),
            })?;
        info!(task = name, from = rec.core, to = core, "task moved to another core");
        rec.core = core;

        // Competition is per core: redo the decision for the whole group
        let mut refresh = vec![name.to_string()];
        refresh.extend(self.group_members(name));
        for member in refresh {
            self.set_to_schedule(&member);
        }
        Ok(())
    }

    /// Run one poll at time `now` (µs on the controller clock).
    ///
    /// Returns the number of tasks examined.  Does nothing while the goal is
    /// `none`.
    pub fn start_optimizing(&mut self, now: u64, monitor: &dyn MonitorSource) -> usize {
        if !self.config.goal.is_active() {
            return 0;
        }

        let poll = Poll {
            now,
            jobs: monitor.jobs(),
            monitor,
        };
        let due: Vec<String> = self
            .tasks
            .iter()
            .filter(|(_, r)| r.arrival_time == 0 || now >= r.absolute_deadline())
            .map(|(name, _)| name.clone())
            .collect();

        let mut examined = 0;
        for name in due {
            // An earlier task in this poll may have removed it
            if self.tasks.contains_key(&name) {
                self.optimize_task(&name, &poll);
                examined += 1;
            }
        }
        examined
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    pub fn goal(&self) -> OptimizationGoal {
        self.config.goal
    }

    pub fn num_cores(&self) -> usize {
        self.num_cores
    }

    pub fn task(&self, name: &str) -> Option<&OptimizationTaskRecord> {
        self.tasks.get(name)
    }

    pub fn tasks(&self) -> impl Iterator<Item = (&String, &OptimizationTaskRecord)> {
        self.tasks.iter()
    }

    pub fn group(&self, id: u32) -> Option<&RelatedTaskGroup> {
        self.groups.get(id)
    }

    pub fn ended_task(&self, name: &str) -> Option<&EndedTaskRecord> {
        self.ended.get(name)
    }

    // ── Poll handling ─────────────────────────────────────────────────────────

    fn optimize_task(&mut self, name: &str, poll: &Poll<'_>) {
        let Some((since, deadline)) = self.tasks.get(name).map(|r| (r.arrival_time, r.deadline))
        else {
            return;
        };

        let mut new_jobs: Vec<&JobRecord> = Vec::new();
        for job in &poll.jobs {
            if job.task_name == name {
                if job.arrival_time >= since && job.arrival_time < poll.now {
                    new_jobs.push(job);
                }
            } else if self.tasks.contains_key(&job.task_name) {
                self.set_newest_job(&job.task_name, job);
            }
        }

        match new_jobs.len() {
            0 => {
                if since > 0 {
                    debug!(task = name, since, "no new job in monitoring data");
                    self.task_not_executed(name, poll);
                }
            }
            1 => {
                let job = new_jobs[0];
                let reached = poll.now >= job.arrival_time.saturating_add(deadline);
                if reached {
                    self.task_executed(name, job, true, poll);
                } else {
                    self.set_newest_job(name, job);
                }
                self.set_arrival_time(name, job, reached);
            }
            n => {
                // Stable: equal arrivals keep monitor order
                new_jobs.sort_by(|a, b| b.arrival_time.cmp(&a.arrival_time));
                let (most, second) = (new_jobs[0], new_jobs[1]);
                if n > 2 {
                    debug!(task = name, skipped = n - 2, "older jobs presumed handled");
                }

                let reached = poll.now >= most.arrival_time.saturating_add(deadline);
                if reached {
                    self.task_executed(name, second, false, poll);
                    self.task_executed(name, most, true, poll);
                } else {
                    self.set_newest_job(name, most);
                    self.task_executed(name, second, true, poll);
                }
                self.set_arrival_time(name, most, reached);
            }
        }
    }

    /// A job of `name` whose deadline has passed shows up in monitoring data.
    fn task_executed(&mut self, name: &str, job: &JobRecord, decide: bool, poll: &Poll<'_>) {
        let num_cores = self.num_cores;
        let Some(rec) = self.tasks.get_mut(name) else {
            return;
        };

        if job.core != rec.core {
            if job.core < num_cores {
                warn!(task = name, from = rec.core, to = job.core, "job ran on another core, following it");
                rec.core = job.core;
            } else {
                warn!(task = name, core = job.core, "job reported on unknown core, ignored");
            }
        }
        let core = rec.core;
        let job_deadline = job.arrival_time.saturating_add(rec.deadline);

        if job.exit_time > 0 && job.exit_time <= job_deadline {
            if let Some(v) = rec.value_on_mut(core) {
                *v = v.saturating_sub(1);
            }
            if rec.inter_arrival > 0 {
                rec.utilization = job.execution_time as f64 / rec.inter_arrival as f64;
            }
            debug!(
                task = name,
                job_id = job.job_id,
                core,
                value = rec.value_on(core),
                utilization = rec.utilization,
                "job met its deadline"
            );
        } else {
            info!(
                task = name,
                job_id = job.job_id,
                core,
                exit_time = job.exit_time,
                deadline = job_deadline,
                "deadline miss detected"
            );
            self.deadline_reached(name, job.arrival_time, poll);
        }

        if decide {
            self.set_to_schedule(name);
            self.set_newest_job(name, job);
            if let Some(rec) = self.tasks.get_mut(name) {
                if rec.newest_job.job_id == job.job_id {
                    rec.newest_job.dispatched = true;
                } else if rec.newest_job.arrival_time == job.arrival_time {
                    let err = OptimizerError::StaleNewestJobDetected {
                        task: name.to_string(),
                        newest_job_id: rec.newest_job.job_id,
                    };
                    warn!(%err, handled_job = job.job_id, "two jobs share one arrival time");
                } else {
                    debug!(task = name, newest = rec.newest_job.job_id, "newer job still outstanding");
                }
            }
        }
    }

    /// The task's deadline passed without a new job in monitoring data.
    fn task_not_executed(&mut self, name: &str, poll: &Poll<'_>) {
        let num_cores = self.num_cores;
        let Some(rec) = self.tasks.get_mut(name) else {
            return;
        };

        if !rec.to_schedule {
            // Expected: the job was denied
            let core = rec.core;
            if let Some(v) = rec.value_on_mut(core) {
                *v = v.saturating_add(1);
            }
            rec.arrival_time = rec.arrival_time.saturating_add(rec.inter_arrival);
            debug!(task = name, core, value = rec.value_on(core), "denied job skipped");
            if rec.id_related != 0 {
                self.reset_values(name);
            }
            self.set_to_schedule(name);
            return;
        }

        let newest = rec.newest_job.clone();
        let (arrival, deadline, last_started) = (rec.arrival_time, rec.deadline, rec.last_job_started);

        if newest.dispatched {
            if last_started {
                self.remove_task(name, newest.job_id, EndCause::Finished);
            } else {
                warn!(task = name, arrival, "permitted job not found in monitoring data, retrying");
            }
            return;
        }

        if arrival > newest.arrival_time {
            let err = OptimizerError::StaleNewestJobDetected {
                task: name.to_string(),
                newest_job_id: newest.job_id,
            };
            warn!(%err, arrival, newest_arrival = newest.arrival_time, "newest job tracking is behind");
            return;
        }

        let dead = poll
            .terminated()
            .into_iter()
            .find(|t| t.job_id == newest.job_id);
        match dead {
            Some(dead) if dead.exit_time >= newest.arrival_time.saturating_add(deadline) => {
                if let Some(rec) = self.tasks.get_mut(name) {
                    if rec.core != newest.core && newest.core < num_cores {
                        warn!(task = name, from = rec.core, to = newest.core, "job ran on another core, following it");
                        rec.core = newest.core;
                    }
                }
                info!(task = name, job_id = dead.job_id, exit_time = dead.exit_time, "terminated job missed its deadline");
                self.deadline_reached(name, newest.arrival_time, poll);
                if let Some(rec) = self.tasks.get_mut(name) {
                    rec.newest_job.dispatched = true;
                }
            }
            Some(dead) => {
                info!(task = name, job_id = dead.job_id, exit_time = dead.exit_time, "job terminated before its deadline");
                self.remove_task(name, dead.job_id, EndCause::Killed);
            }
            None => warn!(
                task = name,
                job_id = newest.job_id,
                "newest job neither in monitoring nor in terminated list"
            ),
        }
    }

    /// Deadline-miss procedure for the job of `name` released at `released`.
    fn deadline_reached(&mut self, name: &str, released: u64, poll: &Poll<'_>) {
        match self.get_cause_task(name, released, poll) {
            None => {
                let err = OptimizerError::UnresolvedCausationTask {
                    task: name.to_string(),
                };
                warn!(%err, "miss recorded without competitor");
            }
            Some(cause) => {
                let Some(rec) = self.tasks.get_mut(name) else {
                    return;
                };
                if rec.competitor.insert(cause.clone()) {
                    info!(task = name, competitor = %cause, "competitor added");
                } else {
                    warn!(task = name, competitor = %cause, "causation task is already a competitor");
                }
                let needed = rec.competitor.len() as u32 + 1;

                self.link_related(name, &cause);

                let id = self.tasks.get(name).map(|r| r.id_related).unwrap_or(0);
                if let Some(group) = self.groups.get_mut(id) {
                    group.max_value = group.max_value.max(needed);
                }
            }
        }

        let Some(rec) = self.tasks.get_mut(name) else {
            return;
        };
        let core = rec.core;
        if let Some(v) = rec.value_on_mut(core) {
            *v = v.saturating_add(1);
        }
        if rec.id_related != 0 {
            self.reset_values(name);
        }
        self.set_to_schedule(name);
    }

    /// Most recent exit inside `[released, released + deadline]` of another
    /// tracked task, searched in running jobs and then in terminated jobs.
    fn get_cause_task(&self, name: &str, released: u64, poll: &Poll<'_>) -> Option<String> {
        let deadline = self.tasks.get(name)?.deadline;
        let end = released.saturating_add(deadline);
        let in_window = |t: u64| t > 0 && t >= released && t <= end;

        let mut best: Option<(u64, String)> = None;
        for job in &poll.jobs {
            if job.task_name == name
                || !in_window(job.exit_time)
                || !self.tasks.contains_key(&job.task_name)
            {
                continue;
            }
            if best.as_ref().map_or(true, |(t, _)| job.exit_time > *t) {
                best = Some((job.exit_time, job.task_name.clone()));
            }
        }

        for dead in poll.terminated() {
            if dead.job_id == 0 || !in_window(dead.exit_time) {
                continue;
            }
            let owner = self
                .tasks
                .iter()
                .find(|(n, r)| n.as_str() != name && r.newest_job.job_id == dead.job_id)
                .map(|(n, _)| n.clone());
            match owner {
                Some(owner) => {
                    if best.as_ref().map_or(true, |(t, _)| dead.exit_time > *t) {
                        best = Some((dead.exit_time, owner));
                    }
                }
                None => {
                    if let Some(e) = self.ended.values().find(|e| e.last_job_id == dead.job_id) {
                        debug!(task = name, ended = %e.name, "candidate cause has already ended");
                    }
                }
            }
        }

        best.map(|(_, owner)| owner)
    }

    /// Put `name` and `cause` into one related-task group.
    fn link_related(&mut self, name: &str, cause: &str) {
        let a = self.tasks.get(name).map(|r| r.id_related).unwrap_or(0);
        let b = self.tasks.get(cause).map(|r| r.id_related).unwrap_or(0);

        match (a, b) {
            (0, 0) => {
                let id = self.groups.create(name, cause);
                self.set_related(name, id);
                self.set_related(cause, id);
            }
            (0, g) => {
                if let Some(group) = self.groups.get_mut(g) {
                    group.tasks.insert(name.to_string());
                }
                self.set_related(name, g);
            }
            (g, 0) => {
                if let Some(group) = self.groups.get_mut(g) {
                    group.tasks.insert(cause.to_string());
                }
                self.set_related(cause, g);
            }
            (g, h) if g == h => {}
            (g, h) => {
                if let Some(merge) = self.groups.merge(g, h) {
                    for member in &merge.moved {
                        self.set_related(member, merge.survivor);
                    }
                }
            }
        }
    }

    fn set_related(&mut self, name: &str, id: u32) {
        if let Some(rec) = self.tasks.get_mut(name) {
            rec.id_related = id;
        }
    }

    fn set_newest_job(&mut self, name: &str, job: &JobRecord) {
        let Some(rec) = self.tasks.get_mut(name) else {
            return;
        };
        if job.arrival_time > rec.newest_job.arrival_time || rec.newest_job.job_id == 0 {
            rec.newest_job = NewestJob {
                job_id: job.job_id,
                arrival_time: job.arrival_time,
                core: job.core,
                dispatched: false,
            };
            debug!(task = name, job_id = job.job_id, arrival = job.arrival_time, core = job.core, "newest job");
        }
    }

    fn set_arrival_time(&mut self, name: &str, job: &JobRecord, deadline_reached: bool) {
        if let Some(rec) = self.tasks.get_mut(name) {
            rec.arrival_time = job.arrival_time;
            if deadline_reached {
                rec.arrival_time = rec.arrival_time.saturating_add(rec.inter_arrival);
            }
        }
    }

    // ── Decisions ─────────────────────────────────────────────────────────────

    /// Scheduling decision for `name` and its same-core competitors.
    fn set_to_schedule(&mut self, name: &str) {
        let goal = self.config.goal;
        let threshold = self.config.threshold();
        let Some(rec) = self.tasks.get(name) else {
            return;
        };
        let Some(own) = goal.metric(rec) else {
            return;
        };

        let mut same_core = Vec::new();
        let mut winner: Option<(&String, f64)> = None;
        for comp in &rec.competitor {
            let Some(other) = self.tasks.get(comp) else {
                continue;
            };
            if other.core != rec.core {
                continue;
            }
            same_core.push(comp.clone());
            let Some(m) = goal.metric(other) else {
                continue;
            };
            if m > own + threshold && winner.map_or(true, |(_, w)| m > w) {
                winner = Some((comp, m));
            }
        }
        let winner = winner.map(|(w, _)| w.clone());

        if same_core.is_empty() {
            // Nothing to arbitrate; a same-core task that lists `name` decides for it
            if !self.is_claimed(name) {
                self.set_permission(name, true);
            }
            return;
        }

        match winner {
            None => {
                self.set_permission(name, true);
                for comp in &same_core {
                    self.set_permission(comp, false);
                }
                debug!(task = name, competitors = same_core.len(), %goal, "task keeps permission");
            }
            Some(w) => {
                self.set_permission(name, false);
                self.set_permission(&w, true);
                info!(task = name, winner = %w, %goal, "permission passed to competitor");
            }
        }
    }

    /// Whether a task on the same core lists `name` as a competitor.
    fn is_claimed(&self, name: &str) -> bool {
        let Some(core) = self.tasks.get(name).map(|r| r.core) else {
            return false;
        };
        self.tasks
            .iter()
            .any(|(n, r)| n.as_str() != name && r.core == core && r.competitor.contains(name))
    }

    /// Other members of `name`'s related group.
    fn group_members(&self, name: &str) -> Vec<String> {
        let id = self.tasks.get(name).map(|r| r.id_related).unwrap_or(0);
        self.groups
            .get(id)
            .map(|g| g.tasks.iter().filter(|t| t.as_str() != name).cloned().collect())
            .unwrap_or_default()
    }

    fn set_permission(&mut self, name: &str, allowed: bool) {
        if let Some(rec) = self.tasks.get_mut(name) {
            rec.to_schedule = allowed;
        }
    }

    /// Subtract the group's `max_value` from every member once all members on
    /// the task's core have reached it.
    fn reset_values(&mut self, name: &str) {
        let Some(rec) = self.tasks.get(name) else {
            return;
        };
        let (id, core) = (rec.id_related, rec.core);
        let Some(group) = self.groups.get(id) else {
            return;
        };
        let max = group.max_value;
        if max == 0 || rec.value_on(core) < max {
            return;
        }

        let all_reached = group
            .tasks
            .iter()
            .filter_map(|t| self.tasks.get(t))
            .filter(|r| r.core == core)
            .all(|r| r.value_on(core) >= max);
        if !all_reached {
            return;
        }

        let members: Vec<String> = group.tasks.iter().cloned().collect();
        for member in &members {
            if let Some(v) = self.tasks.get_mut(member).and_then(|r| r.value_on_mut(core)) {
                *v = v.saturating_sub(max);
            }
        }
        info!(group = id, core, max_value = max, members = members.len(), "values reset");
    }

    /// Forget `name`, record why, and repair competitor lists and groups.
    fn remove_task(&mut self, name: &str, last_job_id: u64, cause: EndCause) {
        let Some(rec) = self.tasks.remove(name) else {
            return;
        };
        let competitor_count = rec.competitor.len() as u32;

        self.ended
            .entry(name.to_string())
            .or_insert_with(|| EndedTaskRecord {
                name: name.to_string(),
                last_job_id,
                cause,
            });

        let affected: Vec<String> = self
            .tasks
            .iter_mut()
            .filter_map(|(n, r)| r.competitor.remove(name).then(|| n.clone()))
            .collect();
        for other in &affected {
            self.set_to_schedule(other);
        }

        let id = rec.id_related;
        let members: Vec<String> = self
            .groups
            .get(id)
            .map(|g| g.tasks.iter().filter(|t| t.as_str() != name).cloned().collect())
            .unwrap_or_default();
        if let Some(group) = self.groups.get_mut(id) {
            group.tasks.remove(name);
            if group.tasks.len() <= 1 {
                let residual = group.tasks.iter().next().cloned();
                self.groups.remove(id);
                if let Some(residual) = residual {
                    self.set_related(&residual, 0);
                }
                debug!(group = id, "related-task group dissolved");
            } else if competitor_count + 1 >= group.max_value {
                let largest = group
                    .tasks
                    .iter()
                    .filter_map(|t| self.tasks.get(t))
                    .map(|r| r.competitor.len() as u32)
                    .max()
                    .unwrap_or(0);
                group.max_value = largest + 1;
                debug!(group = id, max_value = group.max_value, "group max_value re-derived");
            }
        }

        // Remaining members may have lost their only claimer
        for member in &members {
            self.set_to_schedule(member);
        }

        info!(task = name, %cause, last_job_id, "task removed from optimizer");
    }

    fn check_core(&self, core: usize) -> Result<(), OptimizerError> {
        if core >= self.num_cores {
            return Err(OptimizerError::InvalidCore {
                core,
                cores: self.num_cores,
            });
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: u64 = 10_000;

    fn task(name: &str) -> Task {
        Task {
            name: name.into(),
            wcet_us: 2_000,
            inter_arrival_us: PERIOD,
            deadline_us: PERIOD,
            valid: true,
            ..Default::default()
        }
    }

    fn optimizer(goal: OptimizationGoal) -> FairnessOptimizer {
        let mut opt = FairnessOptimizer::new(2);
        opt.set_goal(OptimizationConfig {
            goal,
            ..Default::default()
        });
        opt
    }

    fn job(job_id: u64, task: &str, arrival: u64, exit: u64, exec: u64) -> JobRecord {
        JobRecord {
            job_id,
            task_name: task.into(),
            core: 0,
            arrival_time: arrival,
            exit_time: exit,
            execution_time: exec,
        }
    }

    /// A and B on core 0.  A's job 1 (released at 1 000) misses because
    /// B's job 2 exited at 5 000, inside A's window.
    fn a_missed_because_of_b(goal: OptimizationGoal) -> (FairnessOptimizer, InMemoryMonitor) {
        let mut opt = optimizer(goal);
        opt.add_task(0, &task("A")).unwrap();
        opt.add_task(0, &task("B")).unwrap();

        let mon = InMemoryMonitor::new();
        mon.record_job(job(1, "A", 1_000, 0, 0));
        mon.record_job(job(2, "B", 500, 5_000, 4_500));
        assert_eq!(opt.start_optimizing(12_000, &mon), 2);
        (opt, mon)
    }

    // ── Public operations ─────────────────────────────────────────────────────

    #[test]
    fn add_task_validates_core_and_name() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        assert_eq!(
            opt.add_task(2, &task("A")),
            Err(OptimizerError::InvalidCore { core: 2, cores: 2 })
        );
        opt.add_task(1, &task("A")).unwrap();
        assert_eq!(
            opt.add_task(0, &task("A")),
            Err(OptimizerError::DuplicateTask("A".into()))
        );

        let rec = opt.task("A").unwrap();
        assert!(rec.to_schedule);
        assert_eq!(rec.value, vec![0, 0]);
        assert_eq!(rec.arrival_time, 0);
        assert!(rec.newest_job.dispatched);
    }

    #[test]
    fn unknown_task_is_not_found() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        assert_eq!(
            opt.scheduling_allowed("ghost"),
            Err(OptimizerError::TaskNotFound {
                task: "ghost".into(),
                ended: None
            })
        );
        assert!(opt.last_job_started("ghost").is_err());
        assert!(opt.change_core("ghost", 0).is_err());
    }

    #[test]
    fn change_core_moves_task() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        opt.add_task(0, &task("A")).unwrap();
        opt.change_core("A", 1).unwrap();
        assert_eq!(opt.task("A").unwrap().core, 1);
        assert!(matches!(
            opt.change_core("A", 7),
            Err(OptimizerError::InvalidCore { .. })
        ));
    }

    #[test]
    fn moving_the_claimer_away_releases_the_denied_task() {
        let (mut opt, _mon) = a_missed_because_of_b(OptimizationGoal::Fairness);
        assert_eq!(opt.scheduling_allowed("B"), Ok(false));

        opt.change_core("A", 1).unwrap();
        assert_eq!(opt.scheduling_allowed("A"), Ok(true));
        assert_eq!(opt.scheduling_allowed("B"), Ok(true));
    }

    #[test]
    fn goal_none_leaves_state_untouched() {
        let mut opt = optimizer(OptimizationGoal::None);
        opt.add_task(0, &task("A")).unwrap();
        let mon = InMemoryMonitor::new();
        mon.record_job(job(1, "A", 1_000, 0, 0));

        assert_eq!(opt.start_optimizing(50_000, &mon), 0);
        let rec = opt.task("A").unwrap();
        assert_eq!(rec.arrival_time, 0);
        assert_eq!(rec.value, vec![0, 0]);
    }

    // ── Executed path ─────────────────────────────────────────────────────────

    #[test]
    fn job_in_time_lowers_value_and_measures_utilization() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        opt.add_task(0, &task("A")).unwrap();
        opt.tasks.get_mut("A").unwrap().value[0] = 2;

        let mon = InMemoryMonitor::new();
        mon.record_job(job(1, "A", 1_000, 3_000, 2_000));
        opt.start_optimizing(12_000, &mon);

        let rec = opt.task("A").unwrap();
        assert_eq!(rec.value[0], 1);
        assert!((rec.utilization - 0.2).abs() < 1e-9);
        assert_eq!(rec.arrival_time, 11_000);
        assert_eq!(rec.newest_job.job_id, 1);
        assert!(rec.newest_job.dispatched);
    }

    #[test]
    fn running_job_is_tracked_until_its_deadline() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        opt.add_task(0, &task("A")).unwrap();
        let mon = InMemoryMonitor::new();
        mon.record_job(job(1, "A", 1_000, 0, 0));

        opt.start_optimizing(5_000, &mon);
        let rec = opt.task("A").unwrap();
        assert_eq!(rec.arrival_time, 1_000);
        assert_eq!(rec.newest_job.job_id, 1);
        assert!(!rec.newest_job.dispatched);
        assert_eq!(rec.value[0], 0);

        // Not due again before 11 000
        assert_eq!(opt.start_optimizing(9_000, &mon), 0);
    }

    #[test]
    fn only_two_most_recent_jobs_are_considered() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        opt.add_task(0, &task("A")).unwrap();
        opt.tasks.get_mut("A").unwrap().value[0] = 3;

        let mon = InMemoryMonitor::new();
        mon.record_job(job(1, "A", 1_000, 3_000, 2_000));
        mon.record_job(job(2, "A", 11_000, 13_000, 2_000));
        mon.record_job(job(3, "A", 21_000, 0, 0));
        opt.start_optimizing(25_000, &mon);

        let rec = opt.task("A").unwrap();
        // Job 2 handled once, job 1 ignored, job 3 still running
        assert_eq!(rec.value[0], 2);
        assert_eq!(rec.arrival_time, 21_000);
        assert_eq!(rec.newest_job.job_id, 3);
        assert!(!rec.newest_job.dispatched);
    }

    #[test]
    fn job_on_other_core_moves_the_task() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        opt.add_task(0, &task("A")).unwrap();
        let mon = InMemoryMonitor::new();
        mon.record_job(JobRecord {
            core: 1,
            ..job(1, "A", 1_000, 3_000, 2_000)
        });
        opt.start_optimizing(12_000, &mon);
        assert_eq!(opt.task("A").unwrap().core, 1);
    }

    // ── Deadline misses ───────────────────────────────────────────────────────

    #[test]
    fn miss_gives_the_victim_the_permission_over_its_cause() {
        let (opt, _mon) = a_missed_because_of_b(OptimizationGoal::Fairness);

        let a = opt.task("A").unwrap();
        let b = opt.task("B").unwrap();
        assert_eq!(a.value, vec![1, 0]);
        assert_eq!(b.value, vec![0, 0]);
        assert!(a.competitor.contains("B"));
        assert!(b.competitor.is_empty());

        assert_ne!(a.id_related, 0);
        assert_eq!(a.id_related, b.id_related);
        assert_eq!(opt.group(a.id_related).unwrap().max_value, 2);

        assert_eq!(opt.scheduling_allowed("A"), Ok(true));
        assert_eq!(opt.scheduling_allowed("B"), Ok(false));
    }

    #[test]
    fn competitor_with_higher_value_takes_over() {
        let (mut opt, mon) = a_missed_because_of_b(OptimizationGoal::Fairness);

        // A runs in time, B is denied and accrues value
        mon.record_job(job(3, "A", 11_000, 16_000, 5_000));
        opt.start_optimizing(25_000, &mon);
        assert_eq!(opt.task("A").unwrap().value[0], 0);
        assert_eq!(opt.task("B").unwrap().value[0], 1);

        // A's next decision hands the permission to B
        mon.record_job(job(4, "A", 21_000, 24_000, 3_000));
        opt.start_optimizing(35_000, &mon);
        assert_eq!(opt.scheduling_allowed("A"), Ok(false));
        assert_eq!(opt.scheduling_allowed("B"), Ok(true));
    }

    #[test]
    fn fairness_acceptance_keeps_permission_within_margin() {
        let (mut opt, mon) = a_missed_because_of_b(OptimizationGoal::Fairness);
        opt.set_goal(OptimizationConfig {
            goal: OptimizationGoal::Fairness,
            fairness_acceptance: 1,
            ..Default::default()
        });

        mon.record_job(job(3, "A", 11_000, 16_000, 5_000));
        opt.start_optimizing(25_000, &mon);
        mon.record_job(job(4, "A", 21_000, 24_000, 3_000));
        opt.start_optimizing(35_000, &mon);

        // B leads by exactly 1: not more than the acceptance
        assert_eq!(opt.scheduling_allowed("A"), Ok(true));
        assert_eq!(opt.scheduling_allowed("B"), Ok(false));
    }

    #[test]
    fn utilization_goal_prefers_higher_measured_utilization() {
        let (mut opt, mon) = a_missed_because_of_b(OptimizationGoal::Utilization);
        assert!((opt.task("B").unwrap().utilization - 0.45).abs() < 1e-9);

        mon.record_job(job(3, "A", 11_000, 14_000, 2_000));
        opt.start_optimizing(25_000, &mon);

        // A measured 0.2 < B's 0.45
        assert_eq!(opt.scheduling_allowed("A"), Ok(false));
        assert_eq!(opt.scheduling_allowed("B"), Ok(true));
    }

    #[test]
    fn mutual_misses_share_one_group() {
        let (mut opt, mon) = a_missed_because_of_b(OptimizationGoal::Fairness);
        let group = opt.task("A").unwrap().id_related;

        // B's job 5 misses; A's job 3 exited at 14 000 inside its window
        mon.record_job(job(3, "A", 11_000, 14_000, 3_000));
        mon.record_job(job(5, "B", 10_500, 0, 0));
        opt.start_optimizing(25_000, &mon);

        let b = opt.task("B").unwrap();
        assert!(b.competitor.contains("A"));
        assert_eq!(b.id_related, group);
        assert_eq!(b.value[0], 1);
        assert_eq!(opt.group(group).unwrap().tasks.len(), 2);
        assert_eq!(opt.group(group).unwrap().max_value, 2);
    }

    #[test]
    fn unresolved_cause_still_counts_the_miss() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        opt.add_task(0, &task("A")).unwrap();
        let mon = InMemoryMonitor::new();
        mon.record_job(job(1, "A", 1_000, 0, 0));
        opt.start_optimizing(12_000, &mon);

        let rec = opt.task("A").unwrap();
        assert_eq!(rec.value[0], 1);
        assert!(rec.competitor.is_empty());
        assert_eq!(rec.id_related, 0);
        assert!(rec.to_schedule);
    }

    #[test]
    fn cause_is_found_in_terminated_jobs() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        opt.add_task(0, &task("A")).unwrap();
        opt.add_task(0, &task("B")).unwrap();
        opt.tasks.get_mut("B").unwrap().newest_job.job_id = 2;

        let mon = InMemoryMonitor::new();
        mon.record_job(job(1, "A", 1_000, 0, 0));
        mon.record_job(job(2, "B", 500, 0, 0));
        mon.terminate(2, 6_000);
        opt.start_optimizing(12_000, &mon);

        assert!(opt.task("A").unwrap().competitor.contains("B"));
    }

    #[test]
    fn groups_merge_into_the_larger_one() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        for name in ["A", "B", "C", "D", "E"] {
            opt.add_task(0, &task(name)).unwrap();
        }
        let big = opt.groups.create("A", "B");
        opt.groups.get_mut(big).unwrap().tasks.insert("C".into());
        opt.groups.get_mut(big).unwrap().max_value = 4;
        for n in ["A", "B", "C"] {
            opt.set_related(n, big);
        }
        let small = opt.groups.create("D", "E");
        for n in ["D", "E"] {
            opt.set_related(n, small);
        }

        opt.link_related("D", "A");
        assert!(opt.group(small).is_none());
        let g = opt.group(big).unwrap();
        assert_eq!(g.tasks.len(), 5);
        assert_eq!(g.max_value, 4);
        assert_eq!(opt.task("E").unwrap().id_related, big);
    }

    // ── Not executed / value decay ────────────────────────────────────────────

    /// A and B competing on core 0 in group 1 with `max_value` 2.
    fn competing_pair(opt: &mut FairnessOptimizer) -> u32 {
        opt.add_task(0, &task("A")).unwrap();
        opt.add_task(0, &task("B")).unwrap();
        let id = opt.groups.create("A", "B");
        opt.groups.get_mut(id).unwrap().max_value = 2;
        for (name, other) in [("A", "B"), ("B", "A")] {
            let rec = opt.tasks.get_mut(name).unwrap();
            rec.id_related = id;
            rec.competitor.insert(other.into());
        }
        // A is not due in the polls below
        opt.tasks.get_mut("A").unwrap().arrival_time = 1_000_000;
        opt.tasks.get_mut("B").unwrap().arrival_time = 1_000;
        id
    }

    #[test]
    fn denied_job_raises_value_and_waits_a_period() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        competing_pair(&mut opt);
        opt.tasks.get_mut("B").unwrap().to_schedule = false;
        opt.tasks.get_mut("A").unwrap().value[0] = 1;

        let mon = InMemoryMonitor::new();
        opt.start_optimizing(12_000, &mon);
        let b = opt.task("B").unwrap();
        assert_eq!(b.value[0], 1);
        assert_eq!(b.arrival_time, 11_000);
        // A does not exceed B, so B gets the permission back
        assert!(b.to_schedule);
        assert!(!opt.task("A").unwrap().to_schedule);

        // Same poll time again: B is no longer due
        assert_eq!(opt.start_optimizing(12_000, &mon), 0);
    }

    #[test]
    fn values_decay_once_all_members_reach_max() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        competing_pair(&mut opt);
        opt.tasks.get_mut("A").unwrap().value[0] = 2;
        opt.tasks.get_mut("B").unwrap().value[0] = 1;
        opt.tasks.get_mut("B").unwrap().to_schedule = false;

        opt.start_optimizing(12_000, &InMemoryMonitor::new());

        assert_eq!(opt.task("A").unwrap().value[0], 0);
        assert_eq!(opt.task("B").unwrap().value[0], 0);
        assert_eq!(opt.scheduling_allowed("B"), Ok(true));
        assert_eq!(opt.scheduling_allowed("A"), Ok(false));
    }

    #[test]
    fn no_decay_while_a_member_is_below_max() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        competing_pair(&mut opt);
        opt.tasks.get_mut("B").unwrap().value[0] = 1;
        opt.tasks.get_mut("B").unwrap().to_schedule = false;

        opt.start_optimizing(12_000, &InMemoryMonitor::new());
        assert_eq!(opt.task("B").unwrap().value[0], 2);
        assert_eq!(opt.task("A").unwrap().value[0], 0);
    }

    #[test]
    fn members_on_other_cores_do_not_block_decay() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        competing_pair(&mut opt);
        opt.tasks.get_mut("A").unwrap().core = 1;
        opt.tasks.get_mut("B").unwrap().value[0] = 1;
        opt.tasks.get_mut("B").unwrap().to_schedule = false;

        opt.start_optimizing(12_000, &InMemoryMonitor::new());
        assert_eq!(opt.task("B").unwrap().value[0], 0);
    }

    #[test]
    fn permitted_job_missing_from_monitor_is_retried() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        opt.add_task(0, &task("A")).unwrap();
        opt.tasks.get_mut("A").unwrap().value[0] = 2;
        let mon = InMemoryMonitor::new();
        mon.record_job(job(1, "A", 1_000, 3_000, 2_000));
        opt.start_optimizing(12_000, &mon);
        assert_eq!(opt.task("A").unwrap().arrival_time, 11_000);

        // Job due at 11 000 never shows up
        assert_eq!(opt.start_optimizing(22_000, &mon), 1);
        let rec = opt.task("A").unwrap();
        assert_eq!(rec.value[0], 1);
        assert!(rec.to_schedule);
        assert_eq!(rec.arrival_time, 11_000);
        assert_eq!(opt.start_optimizing(23_000, &mon), 1);
    }

    #[test]
    fn stale_newest_job_leaves_task_untouched() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        opt.add_task(0, &task("A")).unwrap();
        {
            let a = opt.tasks.get_mut("A").unwrap();
            a.arrival_time = 21_000;
            a.newest_job = NewestJob {
                job_id: 5,
                arrival_time: 1_000,
                core: 0,
                dispatched: false,
            };
        }

        let mon = InMemoryMonitor::new();
        assert_eq!(opt.start_optimizing(32_000, &mon), 1);
        let rec = opt.task("A").unwrap();
        assert_eq!(rec.arrival_time, 21_000);
        assert_eq!(rec.value[0], 0);
        assert!(rec.to_schedule);
        assert!(opt.ended_task("A").is_none());
        assert_eq!(opt.start_optimizing(33_000, &mon), 1);
    }

    #[test]
    fn vanished_newest_job_keeps_task_tracked() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        opt.add_task(0, &task("A")).unwrap();
        {
            let a = opt.tasks.get_mut("A").unwrap();
            a.arrival_time = 1_000;
            a.newest_job = NewestJob {
                job_id: 7,
                arrival_time: 1_000,
                core: 0,
                dispatched: false,
            };
        }

        // Job 7 is in neither the job list nor the terminated list
        let mon = InMemoryMonitor::new();
        assert_eq!(opt.start_optimizing(12_000, &mon), 1);
        let rec = opt.task("A").unwrap();
        assert_eq!(rec.arrival_time, 1_000);
        assert_eq!(rec.value[0], 0);
        assert!(rec.to_schedule);
        assert!(opt.ended_task("A").is_none());
        assert_eq!(opt.start_optimizing(13_000, &mon), 1);
    }

    // ── Removal ───────────────────────────────────────────────────────────────

    #[test]
    fn finished_victim_releases_its_denied_cause() {
        let (mut opt, mon) = a_missed_because_of_b(OptimizationGoal::Fairness);
        let group = opt.task("A").unwrap().id_related;
        opt.last_job_started("A").unwrap();

        opt.start_optimizing(25_000, &mon);

        assert!(opt.task("A").is_none());
        assert_eq!(opt.ended_task("A").unwrap().cause, EndCause::Finished);
        assert!(opt.group(group).is_none());
        let b = opt.task("B").unwrap();
        assert_eq!(b.id_related, 0);
        assert_eq!(opt.scheduling_allowed("B"), Ok(true));

        // Still allowed on later polls
        opt.start_optimizing(35_000, &mon);
        assert_eq!(opt.scheduling_allowed("B"), Ok(true));
    }

    #[test]
    fn finished_task_is_removed_and_competitors_released() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        let id = competing_pair(&mut opt);
        // Only A lists B
        opt.tasks.get_mut("B").unwrap().competitor.clear();
        opt.tasks.get_mut("A").unwrap().to_schedule = false;
        {
            let b = opt.tasks.get_mut("B").unwrap();
            b.last_job_started = true;
            b.newest_job = NewestJob {
                job_id: 7,
                arrival_time: 1_000,
                core: 0,
                dispatched: true,
            };
        }
        opt.last_job_started("B").unwrap();

        opt.start_optimizing(12_000, &InMemoryMonitor::new());

        assert!(opt.task("B").is_none());
        let a = opt.task("A").unwrap();
        assert!(a.competitor.is_empty());
        assert!(a.to_schedule);
        assert_eq!(a.id_related, 0);
        assert!(opt.group(id).is_none());

        assert_eq!(
            opt.ended_task("B"),
            Some(&EndedTaskRecord {
                name: "B".into(),
                last_job_id: 7,
                cause: EndCause::Finished
            })
        );
        assert_eq!(
            opt.scheduling_allowed("B"),
            Err(OptimizerError::TaskNotFound {
                task: "B".into(),
                ended: Some(EndCause::Finished)
            })
        );
    }

    #[test]
    fn removal_rederives_decision_for_tasks_with_other_competitors() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        let id = competing_pair(&mut opt);
        opt.add_task(0, &task("C")).unwrap();
        opt.tasks.get_mut("C").unwrap().arrival_time = 1_000_000;
        opt.groups.get_mut(id).unwrap().tasks.insert("C".into());
        opt.groups.get_mut(id).unwrap().max_value = 3;
        {
            let a = opt.tasks.get_mut("A").unwrap();
            a.competitor.insert("C".into());
            a.to_schedule = false;
        }
        opt.tasks.get_mut("C").unwrap().id_related = id;
        opt.tasks.get_mut("C").unwrap().value[0] = 5;
        opt.tasks.get_mut("B").unwrap().last_job_started = true;

        opt.start_optimizing(12_000, &InMemoryMonitor::new());

        assert!(opt.task("B").is_none());
        let a = opt.task("A").unwrap();
        assert_eq!(a.competitor.len(), 1);
        // C (value 5) beats A (value 0)
        assert!(!a.to_schedule);
        assert!(opt.task("C").unwrap().to_schedule);

        let g = opt.group(id).unwrap();
        assert_eq!(g.tasks.len(), 2);
        // B had one competitor (A): 1 + 1 < 3, so max_value is kept
        assert_eq!(g.max_value, 3);
    }

    #[test]
    fn job_terminated_early_means_killed() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        opt.add_task(0, &task("B")).unwrap();
        let mon = InMemoryMonitor::new();
        mon.record_job(job(7, "B", 1_000, 0, 0));
        opt.start_optimizing(5_000, &mon);

        mon.terminate(7, 5_000);
        opt.start_optimizing(12_000, &mon);

        assert!(opt.task("B").is_none());
        assert_eq!(opt.ended_task("B").unwrap().cause, EndCause::Killed);
        assert_eq!(opt.ended_task("B").unwrap().last_job_id, 7);
    }

    #[test]
    fn job_terminated_after_deadline_is_a_miss() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        opt.add_task(0, &task("A")).unwrap();
        opt.add_task(0, &task("B")).unwrap();
        opt.tasks.get_mut("A").unwrap().arrival_time = 1_000_000;

        let mon = InMemoryMonitor::new();
        mon.record_job(job(7, "B", 1_000, 0, 0));
        opt.start_optimizing(5_000, &mon);

        mon.terminate(7, 11_500);
        mon.record_job(job(8, "A", 900, 8_000, 7_000));
        opt.start_optimizing(12_000, &mon);

        let b = opt.task("B").unwrap();
        assert_eq!(b.value[0], 1);
        assert!(b.competitor.contains("A"));
        assert!(b.newest_job.dispatched);
    }

    #[test]
    fn re_adding_an_ended_task_clears_history() {
        let mut opt = optimizer(OptimizationGoal::Fairness);
        opt.add_task(0, &task("B")).unwrap();
        opt.remove_task("B", 3, EndCause::Killed);
        assert!(opt.ended_task("B").is_some());

        opt.add_task(1, &task("B")).unwrap();
        assert!(opt.ended_task("B").is_none());
        assert_eq!(opt.scheduling_allowed("B"), Ok(true));
    }
}
