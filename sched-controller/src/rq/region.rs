/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! File-backed shared memory region.
//!
//! The region is a `MAP_SHARED` mapping of a regular file (normally under
//! `/dev/shm`).  Every process that maps the same path sees the same bytes,
//! which is what lets a dispatcher in another address space attach to a run
//! queue through nothing more than its [`RunQueueHandle`].
//!
//! [`RunQueueHandle`]: super::RunQueueHandle

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use tracing::{debug, warn};

pub struct SharedRegion {
    ptr: NonNull<u8>,
    len: usize,
    path: PathBuf,
    /// Creator side unlinks the backing file on drop.
    owner: bool,
    _file: File,
}

// SAFETY: the mapping is plain memory owned by this value until `Drop`;
// concurrent access to its contents is synchronised by the ring buffer's
// atomic lock word, not by this type.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Create (or truncate) `path`, size it to `len` zero bytes and map it.
    pub fn create(path: &Path, len: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len as u64)?;
        Self::map(path, file, len, true)
    }

    /// Map an existing region created by another holder.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        Self::map(path, file, len, false)
    }

    fn map(path: &Path, file: File, len: usize, owner: bool) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot map an empty region",
            ));
        }

        // SAFETY: fd is valid for the duration of the call, len > 0, and the
        // result is checked against MAP_FAILED before use.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(addr as *mut u8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?;

        debug!(path = %path.display(), len, owner, "shared region mapped");

        Ok(Self {
            ptr,
            len,
            path: path.to_path_buf(),
            owner,
            _file: file,
        })
    }

    /// Base address of the mapping (page aligned).
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/len are exactly what mmap returned in `map`.
        let rc = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len) };
        if rc != 0 {
            warn!(
                path = %self.path.display(),
                error = %io::Error::last_os_error(),
                "munmap failed"
            );
        }
        if self.owner {
            if let Err(e) = std::fs::remove_file(&self.path) {
                debug!(path = %self.path.display(), error = %e, "backing file already gone");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
