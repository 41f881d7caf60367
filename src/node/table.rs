// src/node/table.rs

//! Arena of nodes that are registered as somebody's continuation.
//!
//! A predecessor only knows the `NodeId` of its continuation; the strong
//! reference lives here until the continuation is dispatched or found dead.
//! Successors own their predecessor directly, so no node ever owns a node
//! that owns it back.
//!
//! Entries are not tied to the user's handles. A chain that is linked but
//! never started keeps its continuations here, even after every handle to it
//! is dropped, until the chain runs or `Scheduler::stop` clears the table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::node::inner::NodeCore;
use crate::sync::lock;
use crate::types::NodeId;

#[derive(Default)]
pub(crate) struct NodeTable {
    nodes: Mutex<HashMap<NodeId, Arc<NodeCore>>>,
}

impl NodeTable {
    pub(crate) fn insert(&self, node: Arc<NodeCore>) {
        lock(&self.nodes).insert(node.id(), node);
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<Arc<NodeCore>> {
        lock(&self.nodes).get(&id).cloned()
    }

    pub(crate) fn release(&self, id: NodeId) -> Option<Arc<NodeCore>> {
        lock(&self.nodes).remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.nodes).len()
    }

    pub(crate) fn clear(&self) {
        lock(&self.nodes).clear();
    }
}
