// src/engine/pump.rs

//! Dedicated single-consumer "pump" thread.
//!
//! Stands in for a host main/UI thread: work posted here always runs on the
//! same thread, in order. `post` is fire-and-forget; `send` is a rendezvous
//! that blocks the caller until its job has run.
//!
//! The loop runs on a fixed tick. Each tick runs at most one priority job
//! (from `send`) and then at most one normal job (from `post`), then sleeps
//! for whatever is left of the tick. Cancellation is checked once per tick;
//! jobs still queued at that point are dropped without running.

use std::collections::HashSet;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::Job;
use crate::errors::{Result, TaskError};
use crate::sync::{lock, panic_message};

struct PriorityJob {
    id: u64,
    job: Job,
}

/// Completion signals for `send` callers, keyed by job id.
#[derive(Debug, Default)]
pub struct JobSignal {
    done: Mutex<HashSet<u64>>,
    changed: Condvar,
}

impl JobSignal {
    pub fn set(&self, id: u64) {
        lock(&self.done).insert(id);
        self.changed.notify_all();
    }

    /// Block until job `id` is signaled (consuming the signal) or `cancel`
    /// fires. Returns `false` on cancellation.
    pub fn wait(&self, id: u64, cancel: &CancellationToken, slice: Duration) -> bool {
        let mut done = lock(&self.done);
        loop {
            if done.remove(&id) {
                return true;
            }
            if cancel.is_cancelled() {
                return false;
            }
            done = self
                .changed
                .wait_timeout(done, slice)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    pub fn pending(&self) -> usize {
        lock(&self.done).len()
    }
}

pub struct PumpExecutor {
    normal_tx: mpsc::UnboundedSender<Job>,
    priority_tx: mpsc::UnboundedSender<PriorityJob>,
    signal: Arc<JobSignal>,
    next_job_id: AtomicU64,
    thread_id: ThreadId,
    thread: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    wait_slice: Duration,
}

impl PumpExecutor {
    pub(crate) fn spawn(
        tick: Duration,
        wait_slice: Duration,
        cancel: CancellationToken,
    ) -> io::Result<Self> {
        let (normal_tx, normal_rx) = mpsc::unbounded_channel::<Job>();
        let (priority_tx, priority_rx) = mpsc::unbounded_channel::<PriorityJob>();
        let signal = Arc::new(JobSignal::default());

        let loop_signal = Arc::clone(&signal);
        let loop_cancel = cancel.clone();
        let thread = thread::Builder::new()
            .name("taskchain-pump".to_string())
            .spawn(move || {
                pump_loop(normal_rx, priority_rx, &loop_signal, tick, &loop_cancel);
            })?;
        let thread_id = thread.thread().id();

        Ok(Self {
            normal_tx,
            priority_tx,
            signal,
            next_job_id: AtomicU64::new(1),
            thread_id,
            thread: Mutex::new(Some(thread)),
            cancel,
            wait_slice,
        })
    }

    /// Queue `job` and return immediately. Jobs posted from one thread run
    /// in the order they were posted.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.normal_tx.send(Box::new(job)).is_err() {
            debug!("pump stopped; posted job dropped");
        }
    }

    /// Run `job` on the pump thread and wait for it.
    ///
    /// Called from the pump thread itself, the job runs inline. Fails with
    /// a cancellation error if the scheduler is canceled before the job ran.
    pub fn send<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_pump_thread() {
            job();
            return Ok(());
        }

        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        if self
            .priority_tx
            .send(PriorityJob {
                id,
                job: Box::new(job),
            })
            .is_err()
        {
            return Err(TaskError::canceled(format!("pump job {id}")));
        }
        trace!(job = id, "waiting for pump rendezvous");

        if self.signal.wait(id, &self.cancel, self.wait_slice) {
            Ok(())
        } else {
            Err(TaskError::canceled(format!("pump job {id}")))
        }
    }

    /// Run `f` on the pump thread and return its value.
    pub fn invoke<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(None));
        let writer = Arc::clone(&slot);
        self.send(move || {
            *lock(&writer) = Some(f());
        })?;
        let value = lock(&slot).take();
        value.ok_or_else(|| {
            TaskError::from(anyhow::anyhow!("pump job finished without producing a value"))
        })
    }

    pub fn is_pump_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub(crate) fn join(&self) {
        let Some(thread) = lock(&self.thread).take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            warn!("pump asked to join itself; leaving it to exit on its own");
            return;
        }
        if thread.join().is_err() {
            warn!("pump thread panicked");
        }
    }
}

fn pump_loop(
    mut normal_rx: mpsc::UnboundedReceiver<Job>,
    mut priority_rx: mpsc::UnboundedReceiver<PriorityJob>,
    signal: &JobSignal,
    tick: Duration,
    cancel: &CancellationToken,
) {
    info!(tick_ms = tick.as_millis() as u64, "pump started");

    while !cancel.is_cancelled() {
        let started = Instant::now();

        if let Ok(PriorityJob { id, job }) = priority_rx.try_recv() {
            run_job(job, "send");
            signal.set(id);
        }
        if let Ok(job) = normal_rx.try_recv() {
            run_job(job, "post");
        }

        if let Some(rest) = tick.checked_sub(started.elapsed())
            && !rest.is_zero()
        {
            thread::sleep(rest);
        }
    }

    let abandoned = priority_rx.len() + normal_rx.len();
    info!(abandoned, "pump stopped");
}

fn run_job(job: Job, kind: &'static str) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        error!(
            kind,
            panic = %panic_message(payload.as_ref()),
            "pump job panicked"
        );
    }
}
