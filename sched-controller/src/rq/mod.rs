/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-core run queues in shared memory.
//!
//! | Type                 | Role                                                   |
//! |----------------------|--------------------------------------------------------|
//! | [`SharedRingBuffer`] | one lock-protected circular buffer of tasks            |
//! | [`RunQueueSet`]      | `N` buffers, one per scheduling slot ("core")          |
//! | [`RunQueueHandle`]   | what another process needs to attach to a buffer       |
//!
//! Buffer statuses (`Full`, `Locked`, `Empty`) are passed through the set
//! unchanged; the set adds only the `InvalidCore` bounds check.

mod buffer;
mod error;
mod region;

pub use buffer::{RingGuard, RunQueueHandle, SharedRingBuffer, TASK_NAME_CAPACITY};
pub use error::RunQueueError;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::task::Task;

/// Array of [`SharedRingBuffer`]s indexed by core.
pub struct RunQueueSet {
    buffers: Vec<SharedRingBuffer>,
    dir: PathBuf,
}

impl RunQueueSet {
    /// Create `count` buffers of `capacity` slots each under `dir`.
    ///
    /// The directory is created if needed.  Buffer `i` is backed by
    /// `dir/rq-{i}.shm`.
    pub fn new(dir: &Path, count: usize, capacity: usize) -> Result<Self, RunQueueError> {
        std::fs::create_dir_all(dir).map_err(|source| RunQueueError::Region {
            path: dir.to_path_buf(),
            source,
        })?;

        let buffers = (0..count)
            .map(|i| SharedRingBuffer::create(&dir.join(format!("rq-{i}.shm")), capacity))
            .collect::<Result<Vec<_>, _>>()?;

        info!(dir = %dir.display(), count, capacity, "run-queue set created");
        Ok(Self {
            buffers,
            dir: dir.to_path_buf(),
        })
    }

    /// Number of buffers (`N`).
    pub fn count(&self) -> usize {
        self.buffers.len()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn buffer(&self, core: usize) -> Result<&SharedRingBuffer, RunQueueError> {
        self.buffers.get(core).ok_or(RunQueueError::InvalidCore {
            core,
            count: self.buffers.len(),
        })
    }

    pub fn enqueue(&self, core: usize, task: &Task) -> Result<(), RunQueueError> {
        self.buffer(core)?.enqueue(task)
    }

    pub fn dequeue(&self, core: usize) -> Result<Task, RunQueueError> {
        self.buffer(core)?.dequeue()
    }

    /// Handle through which an external process attaches buffer `core`.
    pub fn handle_for(&self, core: usize) -> Result<RunQueueHandle, RunQueueError> {
        Ok(self.buffer(core)?.handle())
    }

    /// Snapshot of the tasks queued on `core`, head first.
    pub fn contents(&self, core: usize) -> Result<Vec<Task>, RunQueueError> {
        self.buffer(core)?.contents()
    }

    /// Number of tasks queued on `core`.
    pub fn len(&self, core: usize) -> Result<usize, RunQueueError> {
        let guard = self.buffer(core)?.try_lock().ok_or(RunQueueError::Locked)?;
        Ok(guard.len())
    }

    /// Direct access to one buffer, e.g. to hold its lock.
    pub fn get(&self, core: usize) -> Result<&SharedRingBuffer, RunQueueError> {
        self.buffer(core)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u32) -> Task {
        Task {
            task_id: id,
            name: format!("t{id}"),
            wcet_us: 10,
            inter_arrival_us: 100,
            deadline_us: 100,
            ..Default::default()
        }
    }

    #[test]
    fn queues_are_independent_per_core() {
        let dir = tempfile::tempdir().unwrap();
        let set = RunQueueSet::new(dir.path(), 2, 4).unwrap();

        set.enqueue(0, &task(1)).unwrap();
        set.enqueue(1, &task(2)).unwrap();
        set.enqueue(0, &task(3)).unwrap();

        assert_eq!(set.len(0).unwrap(), 2);
        assert_eq!(set.dequeue(1).unwrap().task_id, 2);
        assert!(matches!(set.dequeue(1), Err(RunQueueError::Empty)));
        assert_eq!(set.dequeue(0).unwrap().task_id, 1);
    }

    #[test]
    fn out_of_range_core_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let set = RunQueueSet::new(dir.path(), 2, 4).unwrap();

        assert!(matches!(
            set.enqueue(2, &task(1)),
            Err(RunQueueError::InvalidCore { core: 2, count: 2 })
        ));
        assert!(matches!(set.dequeue(7), Err(RunQueueError::InvalidCore { .. })));
        assert!(set.handle_for(2).is_err());
    }

    #[test]
    fn handle_attaches_to_the_same_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let set = RunQueueSet::new(dir.path(), 3, 4).unwrap();
        set.enqueue(2, &task(9)).unwrap();

        let handle = set.handle_for(2).unwrap();
        assert_eq!(handle.path, dir.path().join("rq-2.shm"));
        assert_eq!(handle.capacity, 4);

        let remote = SharedRingBuffer::attach(&handle).unwrap();
        assert_eq!(remote.dequeue().unwrap().task_id, 9);
        assert_eq!(set.len(2).unwrap(), 0);
    }

    #[test]
    fn buffer_statuses_pass_through_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let set = RunQueueSet::new(dir.path(), 1, 1).unwrap();
        set.enqueue(0, &task(1)).unwrap();
        assert!(matches!(set.enqueue(0, &task(2)), Err(RunQueueError::Full)));

        let _guard = set.get(0).unwrap().try_lock().unwrap();
        assert!(matches!(set.dequeue(0), Err(RunQueueError::Locked)));
        assert!(matches!(set.contents(0), Err(RunQueueError::Locked)));
    }

    #[test]
    fn backing_files_are_removed_with_the_set() {
        let dir = tempfile::tempdir().unwrap();
        let set = RunQueueSet::new(&dir.path().join("shm"), 2, 2).unwrap();
        let path = set.handle_for(1).unwrap().path;
        assert!(path.exists());
        drop(set);
        assert!(!path.exists());
    }
}
