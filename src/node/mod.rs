// src/node/mod.rs

//! Task nodes and the chain-building API.
//!
//! A `TaskNode<T>` is a handle to one unit of work producing a `T`. Nodes are
//! linked into chains with [`TaskNode::then`] / [`TaskNode::then_always`],
//! faults are observed with [`TaskNode::catch`] and [`TaskNode::finally`],
//! and a chain runs once any of its nodes is started.
//!
//! Handles are cheap to clone; all clones refer to the same node.

pub(crate) mod inner;
pub(crate) mod fault;
pub(crate) mod table;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::Scheduler;
use crate::errors::{Result, TaskError};
use crate::types::{Affinity, NodeId, NodeState};

use self::inner::{Body, NodeCore, NodeKind, NodeParams, ObserverKind, Output, RunContext, TypeTag};
use self::fault::{FaultObserver, HandlerId};

pub use self::inner::NodeCallback;
pub use self::fault::CatchHandler;

/// A node producing a value of type `T`.
pub struct TaskNode<T> {
    core: Arc<NodeCore>,
    _output: PhantomData<fn() -> T>,
}

impl<T> Clone for TaskNode<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            _output: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TaskNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.core.id())
            .field("name", &self.core.name())
            .field("affinity", &self.core.affinity())
            .field("state", &self.core.state())
            .finish()
    }
}

impl<T: Send + Sync + 'static> TaskNode<T> {
    /// A node whose body receives whether its predecessor succeeded
    /// (`true` for the first node of a chain).
    pub fn new<F>(scheduler: &Scheduler, name: impl Into<String>, affinity: Affinity, body: F) -> Self
    where
        F: FnOnce(bool) -> anyhow::Result<T> + Send + 'static,
    {
        let body: Body = Box::new(move |ctx: RunContext| {
            let value = body(ctx.antecedent.success)?;
            Ok(Arc::new(value) as Output)
        });
        Self::build(scheduler, name.into(), affinity, NodeKind::Task, None, body)
    }

    /// A node that consumes the output of its predecessor.
    ///
    /// The input is `None` when the predecessor did not complete (only
    /// possible through [`then_always`](TaskNode::then_always)) or when the
    /// node is started without a predecessor. Linking it after a node whose
    /// output type is not `I` is rejected.
    pub fn with_input<I, F>(
        scheduler: &Scheduler,
        name: impl Into<String>,
        affinity: Affinity,
        body: F,
    ) -> Self
    where
        I: Clone + Send + Sync + 'static,
        F: FnOnce(bool, Option<I>) -> anyhow::Result<T> + Send + 'static,
    {
        let body: Body = Box::new(move |ctx: RunContext| {
            let success = ctx.antecedent.success;
            let input = if success {
                ctx.antecedent
                    .value
                    .as_ref()
                    .and_then(|value| downcast_cloned::<I>(value))
            } else {
                None
            };
            let value = body(success, input)?;
            Ok(Arc::new(value) as Output)
        });
        Self::build(
            scheduler,
            name.into(),
            affinity,
            NodeKind::Task,
            Some(TypeTag::of::<I>()),
            body,
        )
    }

    /// A node whose body sees the predecessor's error, if any. Useful as a
    /// [`then_always`](TaskNode::then_always) continuation.
    pub fn with_antecedent<F>(
        scheduler: &Scheduler,
        name: impl Into<String>,
        affinity: Affinity,
        body: F,
    ) -> Self
    where
        F: FnOnce(bool, Option<TaskError>) -> anyhow::Result<T> + Send + 'static,
    {
        let body: Body = Box::new(move |ctx: RunContext| {
            let value = body(ctx.antecedent.success, ctx.antecedent.error)?;
            Ok(Arc::new(value) as Output)
        });
        Self::build(scheduler, name.into(), affinity, NodeKind::Task, None, body)
    }

    pub(crate) fn build(
        scheduler: &Scheduler,
        name: String,
        affinity: Affinity,
        kind: NodeKind,
        input_type: Option<TypeTag>,
        body: Body,
    ) -> Self {
        let params = NodeParams {
            name,
            affinity,
            kind,
            output_type: TypeTag::of::<T>(),
            input_type,
        };
        Self::from_core(NodeCore::new(scheduler.shared(), params, body))
    }
}

impl<T> TaskNode<T> {
    pub(crate) fn from_core(core: Arc<NodeCore>) -> Self {
        Self {
            core,
            _output: PhantomData,
        }
    }

    pub(crate) fn core(&self) -> &Arc<NodeCore> {
        &self.core
    }

    pub fn id(&self) -> NodeId {
        self.core.id()
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn affinity(&self) -> Affinity {
        self.core.affinity()
    }

    pub fn state(&self) -> NodeState {
        self.core.state()
    }

    /// `true` only once the node reached `Completed`.
    pub fn is_successful(&self) -> bool {
        self.core.is_successful()
    }

    /// `true` once the node reached any terminal state.
    pub fn is_completed(&self) -> bool {
        self.core.state().is_terminal()
    }

    /// The node's own fault, or the upstream fault that prevents it from
    /// ever running.
    pub fn error(&self) -> Option<TaskError> {
        self.core.error()
    }

    /// Type-erased handle to the same node.
    pub fn handle(&self) -> AnyNode {
        AnyNode::from_core(Arc::clone(&self.core))
    }

    /// Register `next` to run after this node completes successfully.
    /// Returns `next` so chains read left to right.
    pub fn then<U>(&self, next: TaskNode<U>) -> Result<TaskNode<U>> {
        self.core.attach_continuation(&next.core, false)?;
        Ok(next)
    }

    /// Register `next` to run after this node reaches any terminal state.
    pub fn then_always<U>(&self, next: TaskNode<U>) -> Result<TaskNode<U>> {
        self.core.attach_continuation(&next.core, true)?;
        Ok(next)
    }

    /// Observe a fault of this node or of any upstream node in the chain.
    pub fn catch<F>(&self, handler: F) -> Self
    where
        F: Fn(&TaskError) + Send + Sync + 'static,
    {
        let observer = FaultObserver::Catch {
            id: HandlerId::next(),
            handler: Arc::new(handler),
        };
        fault::register_chain(&self.core, observer);
        self.clone()
    }

    /// Attach a handler that runs exactly once when this node finishes or
    /// when anything upstream faults, whichever comes first. Returns the new
    /// `finally` node, which is the tail of the chain from here on.
    pub fn finally<F>(&self, affinity: Affinity, handler: F) -> Result<TaskNode<()>>
    where
        F: FnOnce(bool, Option<TaskError>) + Send + 'static,
    {
        let shared = self.core.scheduler()?;
        let body: Body = Box::new(move |ctx: RunContext| {
            handler(ctx.antecedent.success, ctx.antecedent.error);
            Ok(Arc::new(()) as Output)
        });
        let params = NodeParams {
            name: format!("{} (finally)", self.core.name()),
            affinity,
            kind: NodeKind::Finally,
            output_type: TypeTag::of::<()>(),
            input_type: None,
        };
        let node = NodeCore::new(&shared, params, body);
        self.core.attach_continuation(&node, true)?;
        fault::register_chain(
            &self.core,
            FaultObserver::Finally {
                id: HandlerId::next(),
                node: node.id(),
            },
        );
        Ok(TaskNode::from_core(node))
    }

    pub fn on_start<F>(&self, callback: F) -> Self
    where
        F: Fn(&AnyNode) + Send + Sync + 'static,
    {
        self.core.add_observer(ObserverKind::Start, Arc::new(callback));
        self.clone()
    }

    pub fn on_end<F>(&self, callback: F) -> Self
    where
        F: Fn(&AnyNode) + Send + Sync + 'static,
    {
        self.core.add_observer(ObserverKind::End, Arc::new(callback));
        self.clone()
    }

    /// Start the chain this node belongs to.
    ///
    /// Fails with [`TaskError::InvalidState`] if this node was already
    /// started, and with a configuration error if a node in the chain is not
    /// ready to run.
    pub fn start(&self) -> Result<()> {
        self.core.start()
    }

    /// Block until the node finishes. Returns the node's fault, the upstream
    /// fault if the node will never run, or a cancellation error if the
    /// scheduler was canceled while waiting.
    pub fn wait(&self) -> Result<()> {
        self.core.wait_settled(None)?;
        self.core.outcome().map(|_| ())
    }

    /// Like [`wait`](TaskNode::wait) with a bound. `Ok(false)` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        if !self.core.wait_settled(Some(timeout))? {
            return Ok(false);
        }
        self.core.outcome().map(|_| true)
    }
}

impl<T: Clone + 'static> TaskNode<T> {
    /// Wait for the node and clone its output.
    pub fn result(&self) -> Result<T> {
        self.core.wait_settled(None)?;
        self.try_result()
    }

    /// The output if the node already completed.
    pub fn try_result(&self) -> Result<T> {
        let output = self.core.outcome()?.ok_or_else(|| TaskError::InvalidState {
            task: self.core.name().to_string(),
            state: self.core.state(),
        })?;
        downcast_cloned::<T>(&output).ok_or_else(|| {
            TaskError::Configuration(format!(
                "task '{}' produced an output of an unexpected type",
                self.core.name()
            ))
        })
    }
}

fn downcast_cloned<T: Clone + 'static>(output: &Output) -> Option<T> {
    let any: &(dyn std::any::Any + Send + Sync) = output.as_ref();
    any.downcast_ref::<T>().cloned()
}

/// Type-erased node handle, used by observers and by
/// [`Scheduler::schedule`](crate::engine::Scheduler::schedule).
#[derive(Clone)]
pub struct AnyNode {
    core: Arc<NodeCore>,
}

impl AnyNode {
    pub(crate) fn from_core(core: Arc<NodeCore>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &Arc<NodeCore> {
        &self.core
    }

    pub fn id(&self) -> NodeId {
        self.core.id()
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn affinity(&self) -> Affinity {
        self.core.affinity()
    }

    pub fn state(&self) -> NodeState {
        self.core.state()
    }

    pub fn is_successful(&self) -> bool {
        self.core.is_successful()
    }

    pub fn error(&self) -> Option<TaskError> {
        self.core.error()
    }

    pub fn start(&self) -> Result<()> {
        self.core.start()
    }

    pub fn wait(&self) -> Result<()> {
        self.core.wait_settled(None)?;
        self.core.outcome().map(|_| ())
    }
}

impl fmt::Debug for AnyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyNode")
            .field("id", &self.core.id())
            .field("name", &self.core.name())
            .field("state", &self.core.state())
            .finish()
    }
}

impl<T> From<TaskNode<T>> for AnyNode {
    fn from(node: TaskNode<T>) -> Self {
        AnyNode::from_core(node.core)
    }
}

impl<T> From<&TaskNode<T>> for AnyNode {
    fn from(node: &TaskNode<T>) -> Self {
        node.handle()
    }
}
