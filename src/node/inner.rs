// src/node/inner.rs

//! Type-erased node: state machine, links and the run algorithm.
//!
//! `TaskNode<T>` is a typed facade over `Arc<NodeCore>`; everything that
//! does not depend on the output type lives here.

use std::any::{Any, TypeId};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::engine::SchedulerShared;
use crate::errors::{Result, TaskError};
use crate::node::AnyNode;
use crate::node::fault::{self, FaultChannel};
use crate::sync::{lock, panic_message};
use crate::types::{Affinity, NodeId, NodeState};

pub(crate) type Output = Arc<dyn Any + Send + Sync>;
pub(crate) type Body = Box<dyn FnOnce(RunContext) -> Result<Output> + Send>;
pub(crate) type Preflight = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Callback fired when a node starts or ends its body.
pub type NodeCallback = Arc<dyn Fn(&AnyNode) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    pub(crate) fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Task,
    /// Absorbs faults: handler registration walks stop here.
    Finally,
}

/// What a node sees of its predecessor when it runs.
#[derive(Clone)]
pub(crate) struct Antecedent {
    pub success: bool,
    pub error: Option<TaskError>,
    pub value: Option<Output>,
}

impl Antecedent {
    pub(crate) fn root() -> Self {
        Self {
            success: true,
            error: None,
            value: None,
        }
    }

    pub(crate) fn faulted(error: TaskError) -> Self {
        Self {
            success: false,
            error: Some(error),
            value: None,
        }
    }
}

pub(crate) struct RunContext {
    pub task: String,
    pub antecedent: Antecedent,
    pub cancel: CancellationToken,
    pub runtime: Handle,
    pub poll_interval: Duration,
    pub kill_on_drop: bool,
}

pub(crate) struct NodeParams {
    pub name: String,
    pub affinity: Affinity,
    pub kind: NodeKind,
    pub output_type: TypeTag,
    pub input_type: Option<TypeTag>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Continuation {
    pub id: NodeId,
    pub always: bool,
}

struct Status {
    state: NodeState,
    output: Option<Output>,
    error: Option<TaskError>,
    /// Set when an upstream fault means this node will never start.
    dead: Option<TaskError>,
}

#[derive(Default)]
struct Links {
    predecessor: Option<Arc<NodeCore>>,
    continuation: Option<Continuation>,
}

#[derive(Default)]
struct Observers {
    on_start: Vec<NodeCallback>,
    on_end: Vec<NodeCallback>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum ObserverKind {
    Start,
    End,
}

pub(crate) struct NodeCore {
    id: NodeId,
    name: String,
    affinity: Affinity,
    kind: NodeKind,
    output_type: TypeTag,
    input_type: Option<TypeTag>,
    scheduler: Weak<SchedulerShared>,
    cancel: CancellationToken,
    wait_slice: Duration,
    status: Mutex<Status>,
    done: Condvar,
    links: Mutex<Links>,
    body: Mutex<Option<Body>>,
    preflight: Mutex<Option<Preflight>>,
    observers: Mutex<Observers>,
    pub(crate) faults: FaultChannel,
}

impl NodeCore {
    pub(crate) fn new(shared: &Arc<SchedulerShared>, params: NodeParams, body: Body) -> Arc<Self> {
        let node = Arc::new(Self {
            id: NodeId::next(),
            name: params.name,
            affinity: params.affinity,
            kind: params.kind,
            output_type: params.output_type,
            input_type: params.input_type,
            scheduler: Arc::downgrade(shared),
            cancel: shared.cancel.clone(),
            wait_slice: shared.config.wait_slice(),
            status: Mutex::new(Status {
                state: NodeState::Created,
                output: None,
                error: None,
                dead: None,
            }),
            done: Condvar::new(),
            links: Mutex::new(Links::default()),
            body: Mutex::new(Some(body)),
            preflight: Mutex::new(None),
            observers: Mutex::new(Observers::default()),
            faults: FaultChannel::default(),
        });
        trace!(node = %node.name, id = %node.id, affinity = %node.affinity, "node created");
        node
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn affinity(&self) -> Affinity {
        self.affinity
    }

    pub(crate) fn kind(&self) -> NodeKind {
        self.kind
    }

    pub(crate) fn scheduler(&self) -> Result<Arc<SchedulerShared>> {
        self.scheduler
            .upgrade()
            .ok_or_else(|| TaskError::canceled(&self.name))
    }

    pub(crate) fn state(&self) -> NodeState {
        lock(&self.status).state
    }

    pub(crate) fn is_successful(&self) -> bool {
        self.state() == NodeState::Completed
    }

    pub(crate) fn error(&self) -> Option<TaskError> {
        let status = lock(&self.status);
        status.error.clone().or_else(|| status.dead.clone())
    }

    pub(crate) fn dead_cause(&self) -> Option<TaskError> {
        lock(&self.status).dead.clone()
    }

    pub(crate) fn predecessor(&self) -> Option<Arc<NodeCore>> {
        lock(&self.links).predecessor.clone()
    }

    pub(crate) fn continuation(&self) -> Option<Continuation> {
        lock(&self.links).continuation
    }

    pub(crate) fn set_preflight(&self, check: Preflight) {
        *lock(&self.preflight) = Some(check);
    }

    pub(crate) fn add_observer(&self, kind: ObserverKind, callback: NodeCallback) {
        let mut observers = lock(&self.observers);
        match kind {
            ObserverKind::Start => observers.on_start.push(callback),
            ObserverKind::End => observers.on_end.push(callback),
        }
    }

    fn antecedent(&self) -> Antecedent {
        let status = lock(&self.status);
        Antecedent {
            success: status.state == NodeState::Completed,
            error: status.error.clone(),
            value: status.output.clone(),
        }
    }

    fn preflight(&self) -> Result<()> {
        match lock(&self.preflight).as_ref() {
            Some(check) => check(),
            None => Ok(()),
        }
    }

    /// Created -> Scheduled. False if the node already left `Created` or is dead.
    pub(crate) fn mark_scheduled(&self) -> bool {
        let mut status = lock(&self.status);
        if status.state != NodeState::Created || status.dead.is_some() {
            return false;
        }
        status.state = NodeState::Scheduled;
        true
    }

    fn mark_dead(&self, cause: &TaskError) -> bool {
        {
            let mut status = lock(&self.status);
            if status.state != NodeState::Created || status.dead.is_some() {
                return false;
            }
            status.dead = Some(TaskError::predecessor(&self.name, cause.clone()));
        }
        self.done.notify_all();
        debug!(node = %self.name, id = %self.id, cause = %cause, "node will never run");
        true
    }

    fn advance(&self, next: NodeState) {
        let mut status = lock(&self.status);
        if status.state.can_advance_to(next) {
            status.state = next;
        } else {
            warn!(
                node = %self.name,
                from = ?status.state,
                to = ?next,
                "ignoring backwards state transition"
            );
        }
    }

    /// Link `next` as this node's continuation.
    pub(crate) fn attach_continuation(
        self: &Arc<Self>,
        next: &Arc<NodeCore>,
        always: bool,
    ) -> Result<()> {
        if Arc::ptr_eq(self, next) {
            return Err(TaskError::Configuration(format!(
                "task '{}' cannot be its own continuation",
                self.name
            )));
        }
        if !Weak::ptr_eq(&self.scheduler, &next.scheduler) {
            return Err(TaskError::Configuration(format!(
                "tasks '{}' and '{}' belong to different schedulers",
                self.name, next.name
            )));
        }
        if let Some(input) = next.input_type
            && input.id != self.output_type.id
        {
            return Err(TaskError::Configuration(format!(
                "task '{}' expects input of type {} but '{}' produces {}",
                next.name, input.name, self.name, self.output_type.name
            )));
        }
        if next.state() != NodeState::Created {
            return Err(TaskError::Configuration(format!(
                "task '{}' has already been started",
                next.name
            )));
        }
        if self.has_ancestor(next) {
            return Err(TaskError::Configuration(format!(
                "linking '{}' after '{}' would create a cycle",
                next.name, self.name
            )));
        }
        let shared = self.scheduler()?;

        // Lock both link sets in id order so concurrent links cannot deadlock.
        {
            let (low, high) = if self.id < next.id {
                (self, next)
            } else {
                (next, self)
            };
            let mut low_links = lock(&low.links);
            let mut high_links = lock(&high.links);
            let (mine, theirs) = if self.id < next.id {
                (&mut *low_links, &mut *high_links)
            } else {
                (&mut *high_links, &mut *low_links)
            };

            if let Some(existing) = mine.continuation {
                return Err(TaskError::Configuration(format!(
                    "task '{}' already has a continuation ({}); build a separate chain to fan out",
                    self.name, existing.id
                )));
            }
            if theirs.predecessor.is_some() {
                return Err(TaskError::Configuration(format!(
                    "task '{}' already has a predecessor",
                    next.name
                )));
            }
            mine.continuation = Some(Continuation { id: next.id, always });
            theirs.predecessor = Some(Arc::clone(self));
        }

        shared.table.insert(Arc::clone(next));
        debug!(node = %self.name, next = %next.name, always, "continuation linked");

        // Handlers already attached downstream must also see faults raised
        // by the ancestors just linked in. A finally node absorbs faults, so
        // handlers attached after it stay on it.
        if next.kind() != NodeKind::Finally {
            for observer in next.faults.observers() {
                if observer.is_handler() {
                    fault::register_chain(self, observer);
                }
            }
        }
        Ok(())
    }

    fn has_ancestor(&self, candidate: &Arc<NodeCore>) -> bool {
        let mut current = self.predecessor();
        while let Some(node) = current {
            if Arc::ptr_eq(&node, candidate) {
                return true;
            }
            current = node.predecessor();
        }
        false
    }

    /// Start the chain this node belongs to.
    ///
    /// Walks back to the earliest node that is still `Created` (running any
    /// preflight check along the way) and dispatches it. If that node's
    /// predecessor is still in flight, its completion dispatches the chain.
    pub(crate) fn start(self: &Arc<Self>) -> Result<()> {
        let shared = self.scheduler()?;
        let state = self.state();
        if state != NodeState::Created {
            return Err(TaskError::InvalidState {
                task: self.name.clone(),
                state,
            });
        }

        let root = self.find_root()?;
        match root.predecessor() {
            None => {
                debug!(node = %root.name, id = %root.id, "starting chain");
                shared.dispatch(root, Antecedent::root());
            }
            Some(pred) => {
                if let Some(dead) = pred.dead_cause() {
                    release_dead_chain(&shared, root, dead.root_cause().clone());
                } else if pred.state().is_terminal() {
                    let antecedent = pred.antecedent();
                    let always = pred.continuation().is_some_and(|c| c.always);
                    if antecedent.success || always {
                        debug!(node = %root.name, predecessor = %pred.name, "predecessor already finished; starting");
                        shared.dispatch(root, antecedent);
                    } else {
                        let cause = antecedent
                            .error
                            .unwrap_or_else(|| TaskError::canceled(&pred.name));
                        release_dead_chain(&shared, root, cause);
                    }
                } else {
                    debug!(
                        node = %root.name,
                        predecessor = %pred.name,
                        "predecessor in flight; chain continues on its completion"
                    );
                }
            }
        }
        Ok(())
    }

    fn find_root(self: &Arc<Self>) -> Result<Arc<NodeCore>> {
        let mut root = Arc::clone(self);
        root.preflight()?;
        while let Some(pred) = root.predecessor() {
            if pred.state() != NodeState::Created || pred.dead_cause().is_some() {
                break;
            }
            pred.preflight()?;
            root = pred;
        }
        Ok(root)
    }

    /// Run this node on the current (executor) thread.
    pub(crate) fn execute(self: &Arc<Self>, shared: &Arc<SchedulerShared>, antecedent: Antecedent) {
        if shared.cancel.is_cancelled() {
            debug!(node = %self.name, id = %self.id, "scheduler canceled before start");
            self.finish(shared, Err(TaskError::canceled(&self.name)));
            return;
        }

        self.advance(NodeState::Running);
        trace!(
            node = %self.name,
            id = %self.id,
            affinity = %self.affinity,
            antecedent_ok = antecedent.success,
            "running node"
        );
        self.notify_observers(ObserverKind::Start);

        let body = lock(&self.body).take();
        let outcome = match body {
            Some(body) => {
                let ctx = RunContext {
                    task: self.name.clone(),
                    antecedent,
                    cancel: shared.cancel.clone(),
                    runtime: shared.runtime.clone(),
                    poll_interval: shared.config.poll_interval(),
                    kill_on_drop: shared.config.process.kill_on_drop,
                };
                match panic::catch_unwind(AssertUnwindSafe(move || body(ctx))) {
                    Ok(outcome) => outcome,
                    Err(payload) => Err(TaskError::from(anyhow!(
                        "task '{}' panicked: {}",
                        self.name,
                        panic_message(payload.as_ref())
                    ))),
                }
            }
            None => Err(TaskError::Configuration(format!(
                "task '{}' has no work to run",
                self.name
            ))),
        };

        self.notify_observers(ObserverKind::End);
        self.finish(shared, outcome);
    }

    /// Finish a node that never reached an executor.
    pub(crate) fn abandon(self: &Arc<Self>, shared: &Arc<SchedulerShared>) {
        self.finish(shared, Err(TaskError::canceled(&self.name)));
    }

    fn finish(self: &Arc<Self>, shared: &Arc<SchedulerShared>, outcome: Result<Output>) {
        let fault = {
            let mut status = lock(&self.status);
            match outcome {
                Ok(value) => {
                    status.state = NodeState::Completed;
                    status.output = Some(value);
                    None
                }
                Err(err) => {
                    status.state = if err.is_cancellation() {
                        NodeState::Canceled
                    } else {
                        NodeState::Faulted
                    };
                    status.error = Some(err.clone());
                    Some(err)
                }
            }
        };
        self.done.notify_all();

        match &fault {
            None => debug!(node = %self.name, id = %self.id, "node completed"),
            Some(err) => {
                debug!(node = %self.name, id = %self.id, error = %err, "node did not complete");
                fault::dispatch(self, shared, err);
            }
        }
        self.dispatch_continuation(shared);
    }

    fn dispatch_continuation(&self, shared: &Arc<SchedulerShared>) {
        let Some(cont) = self.continuation() else {
            return;
        };
        let Some(next) = shared.table.get(cont.id) else {
            trace!(node = %self.name, next = %cont.id, "continuation already started");
            return;
        };

        let antecedent = self.antecedent();
        if antecedent.success || cont.always {
            shared.dispatch(next, antecedent);
        } else {
            let cause = antecedent
                .error
                .unwrap_or_else(|| TaskError::canceled(&self.name));
            release_dead_chain(shared, next, cause);
        }
    }

    fn notify_observers(self: &Arc<Self>, kind: ObserverKind) {
        let callbacks = {
            let observers = lock(&self.observers);
            match kind {
                ObserverKind::Start => observers.on_start.clone(),
                ObserverKind::End => observers.on_end.clone(),
            }
        };
        if callbacks.is_empty() {
            return;
        }
        let handle = AnyNode::from_core(Arc::clone(self));
        for callback in callbacks {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(&handle))) {
                warn!(
                    node = %self.name,
                    event = ?kind,
                    panic = %panic_message(payload.as_ref()),
                    "node observer panicked"
                );
            }
        }
    }

    /// Block until the node is terminal (`Ok(true)`), the timeout expires
    /// (`Ok(false)`), the node is known never to run, or the scheduler is
    /// canceled. The latter two are errors.
    pub(crate) fn wait_settled(&self, timeout: Option<Duration>) -> Result<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut status = lock(&self.status);
        loop {
            if status.state.is_terminal() {
                return Ok(true);
            }
            if let Some(dead) = &status.dead {
                return Err(dead.clone());
            }
            if self.cancel.is_cancelled() {
                return Err(TaskError::canceled(&self.name));
            }
            let mut slice = self.wait_slice;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(false);
                }
                slice = slice.min(deadline - now);
            }
            status = self
                .done
                .wait_timeout(status, slice)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Output of a settled node, or its error.
    pub(crate) fn outcome(&self) -> Result<Option<Output>> {
        let status = lock(&self.status);
        match &status.error {
            Some(err) => Err(err.clone()),
            None => Ok(status.output.clone()),
        }
    }
}

/// Mark `first` and every continuation after it as dead, releasing them
/// from the node table. Stops at the first node that already left `Created`.
pub(crate) fn release_dead_chain(
    shared: &Arc<SchedulerShared>,
    first: Arc<NodeCore>,
    cause: TaskError,
) {
    let mut current = Some(first);
    while let Some(node) = current.take() {
        // Out of the table before waiters are woken.
        shared.table.release(node.id());
        if !node.mark_dead(&cause) {
            break;
        }
        current = node
            .continuation()
            .and_then(|cont| shared.table.get(cont.id));
    }
}
