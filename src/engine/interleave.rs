// src/engine/interleave.rs

//! Reader/writer admission shared by the parallel and serial executors.
//!
//! Parallel jobs take the read side of one `tokio::sync::RwLock`, serial jobs
//! the write side: any number of parallel jobs run together, a serial job
//! runs alone. The lock queues waiters fairly, so once a serial job is
//! waiting, parallel jobs that arrive after it wait behind it.
//!
//! Both executors run on plain threads (the blocking pool and the serial
//! worker), never inside an async task, which is what the `blocking_*`
//! acquisitions require.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

#[derive(Debug, Default)]
pub struct InterleaveCoordinator {
    gate: RwLock<()>,
    parallel_active: AtomicUsize,
    serial_active: AtomicBool,
}

impl InterleaveCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until parallel work may run. The returned guard releases the
    /// admission on drop.
    pub fn enter_parallel(&self) -> ParallelAdmission<'_> {
        let guard = self.gate.blocking_read();
        let active = self.parallel_active.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(active, "parallel admission granted");
        ParallelAdmission {
            coordinator: self,
            _guard: guard,
        }
    }

    /// Block until no other job of either kind is running.
    pub fn enter_serial(&self) -> SerialAdmission<'_> {
        let guard = self.gate.blocking_write();
        self.serial_active.store(true, Ordering::SeqCst);
        trace!("serial admission granted");
        SerialAdmission {
            coordinator: self,
            _guard: guard,
        }
    }

    /// Number of parallel jobs currently admitted.
    pub fn parallel_active(&self) -> usize {
        self.parallel_active.load(Ordering::SeqCst)
    }

    pub fn serial_active(&self) -> bool {
        self.serial_active.load(Ordering::SeqCst)
    }

    /// No admission of either kind is held right now.
    pub fn is_idle(&self) -> bool {
        self.gate.try_write().is_ok()
    }
}

#[must_use = "the admission is released as soon as the guard is dropped"]
pub struct ParallelAdmission<'a> {
    coordinator: &'a InterleaveCoordinator,
    _guard: RwLockReadGuard<'a, ()>,
}

impl Drop for ParallelAdmission<'_> {
    fn drop(&mut self) {
        // Runs before the read guard field is dropped.
        self.coordinator
            .parallel_active
            .fetch_sub(1, Ordering::SeqCst);
    }
}

#[must_use = "the admission is released as soon as the guard is dropped"]
pub struct SerialAdmission<'a> {
    coordinator: &'a InterleaveCoordinator,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl Drop for SerialAdmission<'_> {
    fn drop(&mut self) {
        self.coordinator.serial_active.store(false, Ordering::SeqCst);
    }
}
