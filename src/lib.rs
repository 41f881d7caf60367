// src/lib.rs

//! Continuation-chained task nodes on an affinity-routed scheduler.
//!
//! Work is expressed as [`TaskNode`]s linked into chains. Each node declares
//! an [`Affinity`] that selects where it runs: an unordered parallel pool, a
//! strict FIFO serial worker that never overlaps parallel work, or a single
//! dedicated pump thread. [`ProcessNode`] runs an external process and turns
//! its stdout into a typed result through an [`OutputProcessor`].
//!
//! ```no_run
//! use taskchain::{Affinity, Scheduler, TaskNode};
//!
//! let scheduler = Scheduler::with_defaults()?;
//! let fetch = TaskNode::new(&scheduler, "fetch", Affinity::Parallel, |_| Ok(21));
//! let double = fetch.then(TaskNode::with_input(
//!     &scheduler,
//!     "double",
//!     Affinity::Serial,
//!     |_, n: Option<i32>| Ok(n.unwrap_or_default() * 2),
//! ))?;
//! let done = double.finally(Affinity::Pump, |ok, err| {
//!     println!("finished: ok={ok} err={err:?}");
//! })?;
//! scheduler.schedule_one(&done)?;
//! assert_eq!(double.result()?, 42);
//! # Ok::<(), taskchain::TaskError>(())
//! ```

pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod node;
pub mod output;
pub mod types;

mod sync;

pub use config::SchedulerConfig;
pub use engine::{PumpExecutor, Scheduler};
pub use errors::{Result, TaskError};
pub use exec::{ProcessDescriptor, ProcessManager, ProcessNode};
pub use node::{AnyNode, TaskNode};
pub use output::{OutputProcessor, ProcessorHandle};
pub use types::{Affinity, NodeId, NodeState};
