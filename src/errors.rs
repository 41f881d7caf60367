// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! `TaskError` is `Clone` because a single fault is handed to every waiter,
//! every `catch` handler and the `finally` node of a chain.

use std::sync::Arc;

use thiserror::Error;

use crate::types::NodeState;

#[derive(Error, Debug, Clone)]
pub enum TaskError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("task '{task}' cannot be started from state {state:?}")]
    InvalidState { task: String, state: NodeState },

    #[error("{cause}")]
    PredecessorFault {
        task: String,
        #[source]
        cause: Box<TaskError>,
    },

    /// Display text is the captured stderr, verbatim.
    #[error("{stderr}")]
    ProcessExit { exit_code: i32, stderr: String },

    #[error("failed to start process '{executable}': {message}")]
    Spawn { executable: String, message: String },

    #[error("task '{task}' was canceled")]
    Canceled { task: String },

    #[error("{0}")]
    Body(Arc<anyhow::Error>),

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("TOML parsing error: {0}")]
    Toml(Arc<toml::de::Error>),
}

impl TaskError {
    pub fn predecessor(task: impl Into<String>, cause: TaskError) -> Self {
        TaskError::PredecessorFault {
            task: task.into(),
            cause: Box::new(cause),
        }
    }

    pub fn canceled(task: impl Into<String>) -> Self {
        TaskError::Canceled { task: task.into() }
    }

    /// True for errors that end a node in `Canceled` rather than `Faulted`.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TaskError::Canceled { .. })
    }

    /// The innermost error of a predecessor-fault chain.
    pub fn root_cause(&self) -> &TaskError {
        match self {
            TaskError::PredecessorFault { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        // Bodies may bubble a TaskError through anyhow; keep its identity.
        match err.downcast::<TaskError>() {
            Ok(task_err) => task_err,
            Err(other) => TaskError::Body(Arc::new(other)),
        }
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        TaskError::Io(Arc::new(err))
    }
}

impl From<toml::de::Error> for TaskError {
    fn from(err: toml::de::Error) -> Self {
        TaskError::Toml(Arc::new(err))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskError>;
