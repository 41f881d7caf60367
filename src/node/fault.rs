// src/node/fault.rs

//! Fault observers: the `catch` and `finally` side channel of a chain.
//!
//! A handler attached anywhere in a chain is registered on that node and on
//! each ancestor, so a fault raised upstream reaches it even though the nodes
//! in between never run. The walk stops after the first node that absorbs
//! faults (a `finally` node), which means a handler attached after a
//! `finally` only observes faults of the `finally` node itself.
//!
//! Each node dispatches its observers at most once. Catch handlers run
//! synchronously, in registration order, before any `finally` node is
//! handed to an executor.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, trace, warn};

use crate::engine::SchedulerShared;
use crate::errors::TaskError;
use crate::node::inner::{Antecedent, NodeCore, NodeKind};
use crate::sync::{lock, panic_message};
use crate::types::NodeId;

/// Handler invoked with the error of a faulted node.
pub type CatchHandler = Arc<dyn Fn(&TaskError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HandlerId(u64);

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

impl HandlerId {
    /// Shared by every scheduler fault report, so scheduling twice never
    /// reports twice.
    pub(crate) const REPORT: HandlerId = HandlerId(0);

    pub(crate) fn next() -> Self {
        HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone)]
pub(crate) enum FaultObserver {
    Catch { id: HandlerId, handler: CatchHandler },
    Finally { id: HandlerId, node: NodeId },
    Report,
}

impl FaultObserver {
    fn id(&self) -> HandlerId {
        match self {
            FaultObserver::Catch { id, .. } | FaultObserver::Finally { id, .. } => *id,
            FaultObserver::Report => HandlerId::REPORT,
        }
    }

    pub(crate) fn is_handler(&self) -> bool {
        !matches!(self, FaultObserver::Report)
    }
}

pub(crate) enum Registration {
    Added,
    Duplicate,
    /// The node already dispatched its fault; deliver to the newcomer now.
    AlreadyFaulted(TaskError),
}

#[derive(Default)]
pub(crate) struct FaultChannel {
    inner: Mutex<ChannelState>,
}

#[derive(Default)]
struct ChannelState {
    observers: Vec<FaultObserver>,
    fired: Option<TaskError>,
}

impl FaultChannel {
    pub(crate) fn register(&self, observer: FaultObserver) -> Registration {
        let mut state = lock(&self.inner);
        if let Some(err) = &state.fired {
            return Registration::AlreadyFaulted(err.clone());
        }
        if state.observers.iter().any(|o| o.id() == observer.id()) {
            return Registration::Duplicate;
        }
        state.observers.push(observer);
        Registration::Added
    }

    /// Snapshot of the registered observers, in registration order.
    pub(crate) fn observers(&self) -> Vec<FaultObserver> {
        lock(&self.inner).observers.clone()
    }

    /// A catch or finally observer is registered.
    fn has_handlers(&self) -> bool {
        lock(&self.inner)
            .observers
            .iter()
            .any(FaultObserver::is_handler)
    }

    /// Mark the channel as fired and hand out the observers to notify.
    /// Returns `None` if it already fired.
    fn take_for_dispatch(&self, err: &TaskError) -> Option<Vec<FaultObserver>> {
        let mut state = lock(&self.inner);
        if state.fired.is_some() {
            return None;
        }
        state.fired = Some(err.clone());
        Some(state.observers.clone())
    }
}

/// Register `observer` on `start` and on each ancestor up to and including
/// the first fault-absorbing node.
pub(crate) fn register_chain(start: &Arc<NodeCore>, observer: FaultObserver) {
    let mut current = Some(Arc::clone(start));
    while let Some(node) = current.take() {
        match node.faults.register(observer.clone()) {
            Registration::AlreadyFaulted(err) => {
                debug!(
                    node = %node.name(),
                    id = %node.id(),
                    "handler attached to an already faulted node; delivering now"
                );
                if let Ok(shared) = node.scheduler() {
                    deliver(&node, &shared, &err, std::slice::from_ref(&observer));
                }
            }
            Registration::Added | Registration::Duplicate => {}
        }
        if node.kind() == NodeKind::Finally {
            break;
        }
        current = node.predecessor();
    }
}

/// Notify the observers of `node`, once.
pub(crate) fn dispatch(node: &Arc<NodeCore>, shared: &Arc<SchedulerShared>, err: &TaskError) {
    let Some(observers) = node.faults.take_for_dispatch(err) else {
        trace!(node = %node.name(), "fault observers already notified");
        return;
    };
    deliver(node, shared, err, &observers);
}

fn deliver(
    node: &Arc<NodeCore>,
    shared: &Arc<SchedulerShared>,
    err: &TaskError,
    observers: &[FaultObserver],
) {
    // A late registration delivers only itself; the node's own list still
    // says whether the fault was handled.
    let handled = observers.iter().any(FaultObserver::is_handler) || node.faults.has_handlers();

    for observer in observers {
        if let FaultObserver::Catch { handler, .. } = observer {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(err)));
            if let Err(payload) = outcome {
                warn!(
                    node = %node.name(),
                    panic = %panic_message(payload.as_ref()),
                    "catch handler panicked"
                );
            }
        }
    }

    if observers.iter().any(|o| matches!(o, FaultObserver::Report)) {
        if handled {
            debug!(node = %node.name(), id = %node.id(), error = %err, "fault handled by chain");
        } else {
            error!(
                node = %node.name(),
                id = %node.id(),
                affinity = %node.affinity(),
                error = %err,
                "unhandled task fault"
            );
        }
    }

    for observer in observers {
        if let FaultObserver::Finally { node: finally_id, .. } = observer {
            match shared.table.get(*finally_id) {
                Some(finally) => shared.dispatch(finally, Antecedent::faulted(err.clone())),
                None => trace!(node = %node.name(), finally = %finally_id, "finally already started"),
            }
        }
    }
}
