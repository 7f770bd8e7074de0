/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Fixed-capacity circular buffer of [`Task`] records in shared memory.
//!
//! Elements are always inserted at the tail and removed at the head; both
//! indices wrap around at the end of the slot array.  The free space between
//! tail and head is the *window*, which starts equal to the capacity.
//!
//! ```text
//!          tail      head
//!           |         |
//!  ---------------------------
//!  |x|x|x|x| | | | | |x|x|x|x|
//!  ---------------------------
//!           ^ ^ ^ ^ ^
//!            window
//! ```
//!
//! # Region layout
//! ```text
//! [lock u32][pad u32][head u64][tail u64][window u64][capacity u64][magic u64][slot 0]...[slot n-1]
//! ```
//! Any holder of the [`RunQueueHandle`] can map the region and reconstruct
//! the state from the header alone.
//!
//! # Locking
//! The lock word is taken with one `compare_exchange(0 → 1)`.  If that fails
//! the operation returns [`RunQueueError::Locked`] immediately; the buffer
//! never spins or blocks.  The lock is released by dropping the
//! [`RingGuard`], so every return path unlocks.

use std::mem::{align_of, size_of};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::RunQueueError;
use super::region::SharedRegion;
use crate::task::{Task, TaskClass, TaskStrategy};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Bytes reserved for a task name inside a slot.
pub const TASK_NAME_CAPACITY: usize = 24;

/// Written last during initialisation; attach refuses regions without it.
const RING_MAGIC: u64 = 0x5251_4255_4631_0001;

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

// ── Handle ────────────────────────────────────────────────────────────────────

/// Opaque handle other processes use to attach to a run queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunQueueHandle {
    /// Backing file of the shared region.
    pub path: PathBuf,
    /// Number of task slots.
    pub capacity: usize,
}

// ── Shared layout ─────────────────────────────────────────────────────────────

#[repr(C)]
struct RingHeader {
    lock: AtomicU32,
    _pad: u32,
    head: AtomicU64,
    tail: AtomicU64,
    window: AtomicU64,
    capacity: AtomicU64,
    magic: AtomicU64,
}

/// Fixed-size image of a [`Task`] as stored in a slot.
#[repr(C)]
#[derive(Clone, Copy)]
struct TaskSlot {
    deadline_us: u64,
    wcet_us: u64,
    inter_arrival_us: u64,
    task_id: u32,
    prio: i32,
    task_class: u8,
    task_strategy: u8,
    valid: u8,
    name_len: u8,
    name: [u8; TASK_NAME_CAPACITY],
}

impl TaskSlot {
    fn encode(task: &Task) -> Self {
        let mut end = task.name.len().min(TASK_NAME_CAPACITY);
        while !task.name.is_char_boundary(end) {
            end -= 1;
        }
        if end < task.name.len() {
            warn!(
                task = %task.name,
                kept = end,
                "task name longer than {TASK_NAME_CAPACITY} bytes, truncated in run-queue slot"
            );
        }
        let mut name = [0u8; TASK_NAME_CAPACITY];
        name[..end].copy_from_slice(&task.name.as_bytes()[..end]);

        TaskSlot {
            deadline_us: task.deadline_us,
            wcet_us: task.wcet_us,
            inter_arrival_us: task.inter_arrival_us,
            task_id: task.task_id,
            prio: task.prio,
            task_class: task.task_class.to_raw(),
            task_strategy: task.task_strategy.to_raw(),
            valid: task.valid as u8,
            name_len: end as u8,
            name,
        }
    }

    fn decode(&self) -> Task {
        let len = (self.name_len as usize).min(TASK_NAME_CAPACITY);
        Task {
            task_id: self.task_id,
            name: String::from_utf8_lossy(&self.name[..len]).into_owned(),
            task_class: TaskClass::from_raw(self.task_class),
            task_strategy: TaskStrategy::from_raw(self.task_strategy),
            deadline_us: self.deadline_us,
            wcet_us: self.wcet_us,
            inter_arrival_us: self.inter_arrival_us,
            prio: self.prio,
            valid: self.valid != 0,
        }
    }
}

fn slots_offset() -> usize {
    let align = align_of::<TaskSlot>();
    size_of::<RingHeader>().div_ceil(align) * align
}

fn region_len(capacity: usize) -> usize {
    slots_offset() + capacity * size_of::<TaskSlot>()
}

// ── SharedRingBuffer ──────────────────────────────────────────────────────────

/// Circular run-queue buffer living in a [`SharedRegion`].
pub struct SharedRingBuffer {
    region: SharedRegion,
    /// Validated against the region length; all indexing is reduced modulo
    /// this value, never the header's.
    capacity: usize,
}

impl SharedRingBuffer {
    /// Create a new, empty buffer with `capacity` slots backed by `path`.
    pub fn create(path: &Path, capacity: usize) -> Result<Self, RunQueueError> {
        if capacity == 0 {
            return Err(RunQueueError::LayoutMismatch {
                path: path.to_path_buf(),
                detail: "capacity must be at least 1".into(),
            });
        }

        let region =
            SharedRegion::create(path, region_len(capacity)).map_err(|source| {
                RunQueueError::Region {
                    path: path.to_path_buf(),
                    source,
                }
            })?;

        let buf = Self { region, capacity };
        let h = buf.header();
        h.lock.store(UNLOCKED, Ordering::Relaxed);
        h.head.store(0, Ordering::Relaxed);
        h.tail.store(0, Ordering::Relaxed);
        h.window.store(capacity as u64, Ordering::Relaxed);
        h.capacity.store(capacity as u64, Ordering::Relaxed);
        h.magic.store(RING_MAGIC, Ordering::Release);

        debug!(path = %path.display(), capacity, "run-queue buffer created");
        Ok(buf)
    }

    /// Attach to a buffer created elsewhere.
    ///
    /// # Errors
    /// [`RunQueueError::Region`] if the file cannot be mapped,
    /// [`RunQueueError::LayoutMismatch`] if the header is not initialised or
    /// disagrees with `handle.capacity`.
    pub fn attach(handle: &RunQueueHandle) -> Result<Self, RunQueueError> {
        let path = &handle.path;
        let region = SharedRegion::open(path).map_err(|source| RunQueueError::Region {
            path: path.clone(),
            source,
        })?;

        let mismatch = |detail: String| RunQueueError::LayoutMismatch {
            path: path.clone(),
            detail,
        };

        if handle.capacity == 0 || region.len() < region_len(handle.capacity) {
            return Err(mismatch(format!(
                "region is {} bytes, capacity {} needs {}",
                region.len(),
                handle.capacity,
                region_len(handle.capacity)
            )));
        }

        let buf = Self {
            region,
            capacity: handle.capacity,
        };
        let h = buf.header();
        if h.magic.load(Ordering::Acquire) != RING_MAGIC {
            return Err(mismatch("region is not an initialised run queue".into()));
        }
        let stored = h.capacity.load(Ordering::Relaxed);
        if stored != handle.capacity as u64 {
            return Err(mismatch(format!(
                "header capacity {stored} != handle capacity {}",
                handle.capacity
            )));
        }

        debug!(path = %path.display(), capacity = handle.capacity, "attached to run-queue buffer");
        Ok(buf)
    }

    /// Handle for attaching this buffer from another process.
    pub fn handle(&self) -> RunQueueHandle {
        RunQueueHandle {
            path: self.region.path().to_path_buf(),
            capacity: self.capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Try to take the lock word without waiting.
    ///
    /// Returns `None` if another holder (in any process) owns it.
    pub fn try_lock(&self) -> Option<RingGuard<'_>> {
        self.header()
            .lock
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| RingGuard { buf: self })
    }

    /// Insert `task` at the tail.
    pub fn enqueue(&self, task: &Task) -> Result<(), RunQueueError> {
        let mut guard = self.try_lock().ok_or_else(|| {
            debug!(task = %task.name, "enqueue: buffer locked");
            RunQueueError::Locked
        })?;
        guard.push(task)
    }

    /// Remove the task at the head.
    pub fn dequeue(&self) -> Result<Task, RunQueueError> {
        let mut guard = self.try_lock().ok_or_else(|| {
            debug!("dequeue: buffer locked");
            RunQueueError::Locked
        })?;
        guard.pop()
    }

    /// Ordered copy of the queued tasks, head first.
    pub fn contents(&self) -> Result<Vec<Task>, RunQueueError> {
        let guard = self.try_lock().ok_or(RunQueueError::Locked)?;
        Ok(guard.contents())
    }

    fn header(&self) -> &RingHeader {
        // SAFETY: the region is at least `region_len(capacity)` bytes, page
        // aligned, and starts with a `RingHeader` made only of atomics.
        unsafe { &*(self.region.as_ptr() as *const RingHeader) }
    }

    fn slot_ptr(&self, index: usize) -> *mut TaskSlot {
        debug_assert!(index < self.capacity);
        // SAFETY: index < capacity, so the slot lies inside the mapping.
        unsafe {
            (self.region.as_ptr().add(slots_offset()) as *mut TaskSlot).add(index % self.capacity)
        }
    }
}

// ── RingGuard ─────────────────────────────────────────────────────────────────

/// Exclusive access to a [`SharedRingBuffer`].  Releases the lock on drop.
pub struct RingGuard<'a> {
    buf: &'a SharedRingBuffer,
}

impl RingGuard<'_> {
    /// Free slots.
    pub fn window(&self) -> usize {
        (self.buf.header().window.load(Ordering::Relaxed) as usize).min(self.buf.capacity)
    }

    /// Occupied slots.
    pub fn len(&self) -> usize {
        self.buf.capacity - self.window()
    }

    pub fn is_empty(&self) -> bool {
        self.window() >= self.buf.capacity
    }

    /// Insert at the tail.
    pub fn push(&mut self, task: &Task) -> Result<(), RunQueueError> {
        let h = self.buf.header();
        let window = self.window();
        if window < 1 {
            warn!(task = %task.name, capacity = self.buf.capacity, "run queue full");
            return Err(RunQueueError::Full);
        }

        let tail = h.tail.load(Ordering::Relaxed) as usize % self.buf.capacity;
        // SAFETY: slot is inside the mapping and we hold the lock.
        unsafe { self.buf.slot_ptr(tail).write(TaskSlot::encode(task)) };

        h.tail
            .store(((tail + 1) % self.buf.capacity) as u64, Ordering::Relaxed);
        h.window.store((window - 1) as u64, Ordering::Relaxed);

        debug!(task = %task.name, slot = tail, window = window - 1, "task enqueued");
        Ok(())
    }

    /// Remove from the head.
    pub fn pop(&mut self) -> Result<Task, RunQueueError> {
        let h = self.buf.header();
        let window = self.window();
        if window >= self.buf.capacity {
            return Err(RunQueueError::Empty);
        }

        let head = h.head.load(Ordering::Relaxed) as usize % self.buf.capacity;
        // SAFETY: slot is inside the mapping and we hold the lock.
        let task = unsafe { self.buf.slot_ptr(head).read() }.decode();

        h.head
            .store(((head + 1) % self.buf.capacity) as u64, Ordering::Relaxed);
        h.window.store((window + 1) as u64, Ordering::Relaxed);

        debug!(task = %task.name, slot = head, window = window + 1, "task dequeued");
        Ok(task)
    }

    /// Ordered copy of the queued tasks, head first.
    pub fn contents(&self) -> Vec<Task> {
        let head = self.buf.header().head.load(Ordering::Relaxed) as usize;
        (0..self.len())
            .map(|i| {
                let idx = (head + i) % self.buf.capacity;
                // SAFETY: slot is inside the mapping and we hold the lock.
                unsafe { self.buf.slot_ptr(idx).read() }.decode()
            })
            .collect()
    }
}

impl Drop for RingGuard<'_> {
    fn drop(&mut self) {
        self.buf.header().lock.store(UNLOCKED, Ordering::Release);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
