// src/engine/parallel.rs

use std::sync::Arc;

use tokio::runtime::Handle;

use super::Job;
use super::interleave::InterleaveCoordinator;

/// Unordered executor backed by the runtime's blocking pool.
///
/// The pool size (`max_blocking_threads`) bounds how many parallel jobs run
/// at once; each job additionally holds a parallel admission so it never
/// overlaps a serial job.
pub struct ParallelExecutor {
    runtime: Handle,
    coordinator: Arc<InterleaveCoordinator>,
}

impl ParallelExecutor {
    pub(crate) fn new(runtime: Handle, coordinator: Arc<InterleaveCoordinator>) -> Self {
        Self {
            runtime,
            coordinator,
        }
    }

    pub fn submit(&self, job: Job) {
        let coordinator = Arc::clone(&self.coordinator);
        // Jobs report their own outcome; the join handle is not needed.
        let _ = self.runtime.spawn_blocking(move || {
            let _admission = coordinator.enter_parallel();
            job();
        });
    }
}
