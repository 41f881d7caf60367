use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;

/// Which executor a node runs on.
///
/// - `Parallel`: unordered pool, may run concurrently with other parallel nodes.
/// - `Serial`: single worker, strict FIFO, never overlaps with parallel work.
/// - `Pump`: the dedicated single-consumer pump thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Affinity {
    #[default]
    Parallel,
    Serial,
    Pump,
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Affinity::Parallel => write!(f, "parallel"),
            Affinity::Serial => write!(f, "serial"),
            Affinity::Pump => write!(f, "pump"),
        }
    }
}

impl FromStr for Affinity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "parallel" | "concurrent" => Ok(Affinity::Parallel),
            "serial" | "exclusive" => Ok(Affinity::Serial),
            "pump" | "ui" => Ok(Affinity::Pump),
            other => Err(format!(
                "invalid affinity: {other} (expected \"parallel\", \"serial\" or \"pump\")"
            )),
        }
    }
}

/// Lifecycle of a node. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Created,
    Scheduled,
    Running,
    Completed,
    Faulted,
    Canceled,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeState::Completed | NodeState::Faulted | NodeState::Canceled
        )
    }

    fn rank(self) -> u8 {
        match self {
            NodeState::Created => 0,
            NodeState::Scheduled => 1,
            NodeState::Running => 2,
            NodeState::Completed | NodeState::Faulted | NodeState::Canceled => 3,
        }
    }

    /// Whether moving from `self` to `next` respects the one-way state machine.
    pub fn can_advance_to(self, next: NodeState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// Process-unique node identifier, used as the key of the node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

impl NodeId {
    pub(crate) fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
