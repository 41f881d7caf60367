// src/engine/mod.rs

//! Affinity-routed scheduler.
//!
//! A `Scheduler` owns three execution domains and routes every dispatched
//! node to the one matching its [`Affinity`]:
//! - [`parallel`]: the runtime's blocking pool, unordered;
//! - [`serial`]: one dedicated thread, strict FIFO;
//! - [`pump`]: one dedicated thread driven by a fixed tick.
//!
//! Parallel and serial work never overlap; [`interleave`] arbitrates.
//! The scheduler also owns the tokio runtime that process nodes use for
//! their child processes, and the cancellation token every wait and poll
//! loop observes.

pub mod interleave;
pub mod parallel;
pub mod pump;
pub mod serial;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{SchedulerConfig, load_and_validate};
use crate::errors::{Result, TaskError};
use crate::node::AnyNode;
use crate::node::fault::{self, FaultObserver};
use crate::node::inner::{Antecedent, NodeCore};
use crate::node::table::NodeTable;
use crate::types::Affinity;

pub use interleave::{InterleaveCoordinator, ParallelAdmission, SerialAdmission};
pub use parallel::ParallelExecutor;
pub use pump::{JobSignal, PumpExecutor};
pub use serial::SerialExecutor;

/// Unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// How long `stop` lets the runtime finish in-flight blocking work.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// State shared between the scheduler handle, its executors and its nodes.
/// Nodes hold it weakly.
pub(crate) struct SchedulerShared {
    pub(crate) config: SchedulerConfig,
    pub(crate) cancel: CancellationToken,
    pub(crate) runtime: Handle,
    pub(crate) table: NodeTable,
    pub(crate) coordinator: Arc<InterleaveCoordinator>,
    pub(crate) parallel: ParallelExecutor,
    pub(crate) serial: SerialExecutor,
    pub(crate) pump: PumpExecutor,
}

impl SchedulerShared {
    /// Move `node` from `Created` to `Scheduled` and queue it on the
    /// executor for its affinity. A node that already left `Created` is
    /// left alone, which makes every dispatch path safe to race.
    pub(crate) fn dispatch(self: &Arc<Self>, node: Arc<NodeCore>, antecedent: Antecedent) {
        if !node.mark_scheduled() {
            trace!(node = %node.name(), state = ?node.state(), "dispatch skipped");
            return;
        }
        self.table.release(node.id());
        debug!(node = %node.name(), id = %node.id(), affinity = %node.affinity(), "node scheduled");

        let shared = Arc::clone(self);
        let job_node = Arc::clone(&node);
        let job: Job = Box::new(move || job_node.execute(&shared, antecedent));

        match node.affinity() {
            Affinity::Parallel => self.parallel.submit(job),
            Affinity::Serial => {
                if self.serial.submit(job).is_err() {
                    warn!(node = %node.name(), "serial executor stopped; abandoning node");
                    node.abandon(self);
                }
            }
            Affinity::Pump => self.pump.post(job),
        }
    }
}

pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    runtime: Option<Runtime>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.scheduler.io_threads)
            .max_blocking_threads(config.scheduler.parallel_workers)
            .thread_name("taskchain-worker")
            .enable_all()
            .build()?;

        let cancel = CancellationToken::new();
        let coordinator = Arc::new(InterleaveCoordinator::new());
        let serial = SerialExecutor::spawn(Arc::clone(&coordinator))?;
        let pump = PumpExecutor::spawn(config.pump_tick(), config.wait_slice(), cancel.clone())?;
        let parallel = ParallelExecutor::new(runtime.handle().clone(), Arc::clone(&coordinator));

        info!(
            parallel_workers = config.scheduler.parallel_workers,
            io_threads = config.scheduler.io_threads,
            pump_tick_ms = config.scheduler.pump_tick_ms,
            "scheduler started"
        );

        let shared = Arc::new(SchedulerShared {
            runtime: runtime.handle().clone(),
            config,
            cancel,
            table: NodeTable::default(),
            coordinator,
            parallel,
            serial,
            pump,
        });

        Ok(Self {
            shared,
            runtime: Some(runtime),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(SchedulerConfig::default())
    }

    /// Build a scheduler from a TOML configuration file.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(load_and_validate(path)?)
    }

    pub(crate) fn shared(&self) -> &Arc<SchedulerShared> {
        &self.shared
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Start each node in turn, reporting faults that nothing in the chain
    /// observes.
    ///
    /// Every node is attempted even if an earlier one fails to start; the
    /// first start error is returned.
    pub fn schedule<I>(&self, nodes: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<AnyNode>,
    {
        let mut first_error: Option<TaskError> = None;
        for node in nodes {
            let node: AnyNode = node.into();
            fault::register_chain(node.core(), FaultObserver::Report);
            if let Err(err) = node.start() {
                warn!(node = %node.name(), error = %err, "failed to start node");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn schedule_one(&self, node: impl Into<AnyNode>) -> Result<()> {
        self.schedule([node.into()])
    }

    pub fn pump(&self) -> &PumpExecutor {
        &self.shared.pump
    }

    pub fn coordinator(&self) -> &InterleaveCoordinator {
        &self.shared.coordinator
    }

    /// Handle to the runtime that drives child processes.
    pub fn runtime_handle(&self) -> Handle {
        self.shared.runtime.clone()
    }

    /// Signal cancellation. Queued nodes finish as `Canceled` without
    /// running, process children are killed and waits return.
    pub fn cancel(&self) {
        if !self.shared.cancel.is_cancelled() {
            info!("scheduler cancellation requested");
        }
        self.shared.cancel.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Continuations registered but not yet dispatched or released.
    ///
    /// Includes the continuations of chains that were linked and never
    /// started; those stay counted until the chain runs or the scheduler
    /// stops.
    pub fn pending_continuations(&self) -> usize {
        self.shared.table.len()
    }

    /// Cancel, stop the serial and pump threads, and shut the runtime down.
    pub fn stop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        debug!("stopping scheduler");
        self.shared.cancel.cancel();
        self.shared.serial.shutdown();
        self.shared.pump.join();
        runtime.shutdown_timeout(SHUTDOWN_GRACE);
        self.shared.table.clear();
        info!("scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.shared.config)
            .field("canceled", &self.shared.cancel.is_cancelled())
            .field("pending_continuations", &self.shared.table.len())
            .finish_non_exhaustive()
    }
}
