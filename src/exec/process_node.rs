// src/exec/process_node.rs

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use crate::engine::Scheduler;
use crate::errors::{Result, TaskError};
use crate::exec::descriptor::ProcessDescriptor;
use crate::exec::runner;
use crate::node::TaskNode;
use crate::node::inner::{Body, NodeKind, Output, RunContext};
use crate::output::{OutputProcessor, ProcessorHandle, StringOutputProcessor};
use crate::sync::lock;
use crate::types::{Affinity, NodeState};

type ErrorDataCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-process state shared between the node handle and the runner.
pub(crate) struct ProcessState<P: OutputProcessor> {
    descriptor: Mutex<Option<ProcessDescriptor>>,
    processor: ProcessorHandle<P>,
    errors: Mutex<Vec<String>>,
    exit_code: OnceLock<i32>,
    process_id: OnceLock<u32>,
    error_data: Mutex<Vec<ErrorDataCallback>>,
}

impl<P: OutputProcessor> ProcessState<P> {
    fn new(processor: P) -> Self {
        Self {
            descriptor: Mutex::new(None),
            processor: ProcessorHandle::new(processor),
            errors: Mutex::new(Vec::new()),
            exit_code: OnceLock::new(),
            process_id: OnceLock::new(),
            error_data: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn descriptor(&self) -> Result<ProcessDescriptor> {
        lock(&self.descriptor)
            .clone()
            .ok_or_else(|| TaskError::Configuration("process node was never configured".to_string()))
    }

    pub(crate) fn processor(&self) -> &ProcessorHandle<P> {
        &self.processor
    }

    pub(crate) fn push_error_line(&self, line: String) {
        lock(&self.errors).push(line);
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }

    pub(crate) fn set_exit_code(&self, code: i32) {
        let _ = self.exit_code.set(code);
    }

    pub(crate) fn set_process_id(&self, pid: u32) {
        let _ = self.process_id.set(pid);
    }

    pub(crate) fn raise_error_data(&self, message: &str) {
        let callbacks = lock(&self.error_data).clone();
        for callback in callbacks {
            callback(message);
        }
    }
}

/// A task node whose work is an external process.
///
/// Stdout is fed line by line into the output processor `P`, whose result
/// becomes the node's result when the process exits with code 0. A nonzero
/// exit faults the node with [`TaskError::ProcessExit`], whose message is the
/// captured stderr.
///
/// ```no_run
/// use taskchain::{Affinity, ProcessDescriptor, ProcessNode, Scheduler};
///
/// let scheduler = Scheduler::with_defaults()?;
/// let node = ProcessNode::text(&scheduler, "git version", Affinity::Parallel);
/// node.configure(ProcessDescriptor::new("git", "--version")?)?;
/// node.node().start()?;
/// println!("{}", node.node().result()?);
/// # Ok::<(), taskchain::TaskError>(())
/// ```
pub struct ProcessNode<P: OutputProcessor> {
    node: TaskNode<P::Output>,
    process: Arc<ProcessState<P>>,
}

impl<P: OutputProcessor> Clone for ProcessNode<P> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            process: Arc::clone(&self.process),
        }
    }
}

impl<P: OutputProcessor> fmt::Debug for ProcessNode<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessNode")
            .field("node", &self.node)
            .field("descriptor", &*lock(&self.process.descriptor))
            .field("exit_code", &self.exit_code())
            .finish()
    }
}

impl ProcessNode<StringOutputProcessor> {
    /// Process node whose result is its whole stdout.
    pub fn text(scheduler: &Scheduler, name: impl Into<String>, affinity: Affinity) -> Self {
        Self::new(scheduler, name, affinity, StringOutputProcessor::new())
    }
}

impl<P: OutputProcessor> ProcessNode<P> {
    pub fn new(
        scheduler: &Scheduler,
        name: impl Into<String>,
        affinity: Affinity,
        processor: P,
    ) -> Self {
        let name = name.into();
        let process = Arc::new(ProcessState::new(processor));

        let runner_state = Arc::clone(&process);
        let body: Body = Box::new(move |ctx: RunContext| {
            let output = runner::run_blocking(&runner_state, ctx)?;
            Ok(Arc::new(output) as Output)
        });
        let node = TaskNode::<P::Output>::build(
            scheduler,
            name.clone(),
            affinity,
            NodeKind::Task,
            None,
            body,
        );

        let check_state = Arc::clone(&process);
        node.core().set_preflight(Box::new(move || {
            check_state.descriptor().map(|_| ()).map_err(|_| {
                TaskError::Configuration(format!(
                    "process node '{name}' must be configured before it is started"
                ))
            })
        }));

        Self { node, process }
    }

    /// Attach the process descriptor. Only allowed before the node starts.
    pub fn configure(&self, descriptor: ProcessDescriptor) -> Result<&Self> {
        let state = self.node.state();
        if state != NodeState::Created {
            return Err(TaskError::InvalidState {
                task: self.node.name().to_string(),
                state,
            });
        }
        *lock(&self.process.descriptor) = Some(descriptor);
        Ok(self)
    }

    /// Call `callback` for each entry the output processor produces, while
    /// the process is still running.
    pub fn on_data<F>(&self, callback: F) -> &Self
    where
        F: Fn(&P::Entry) + Send + Sync + 'static,
    {
        self.process.processor.subscribe(callback);
        self
    }

    /// Call `callback` with the diagnostic message if the process cannot be
    /// spawned.
    pub fn on_error_data<F>(&self, callback: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        lock(&self.process.error_data).push(Arc::new(callback));
        self
    }

    pub fn node(&self) -> &TaskNode<P::Output> {
        &self.node
    }

    pub fn into_node(self) -> TaskNode<P::Output> {
        self.node
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.process.exit_code.get().copied()
    }

    pub fn process_id(&self) -> Option<u32> {
        self.process.process_id.get().copied()
    }

    /// Captured stderr lines, in arrival order.
    pub fn errors(&self) -> Vec<String> {
        self.process.errors()
    }

    pub fn process_name(&self) -> Option<String> {
        lock(&self.process.descriptor)
            .as_ref()
            .map(|d| d.executable.clone())
    }

    pub fn process_arguments(&self) -> Option<String> {
        lock(&self.process.descriptor)
            .as_ref()
            .map(|d| d.argument_string())
    }

    /// Completed with exit code 0.
    pub fn is_successful(&self) -> bool {
        self.node.is_successful() && self.exit_code() == Some(0)
    }
}

impl<P: OutputProcessor> From<ProcessNode<P>> for TaskNode<P::Output> {
    fn from(node: ProcessNode<P>) -> Self {
        node.node
    }
}
