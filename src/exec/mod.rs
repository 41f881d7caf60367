// src/exec/mod.rs

//! External-process nodes.
//!
//! - [`descriptor`]: what to spawn (`ProcessDescriptor`) and argument-string
//!   splitting.
//! - [`manager`]: `ProcessManager` and the pluggable `ProcessEnvironment`
//!   that build descriptors.
//! - [`process_node`]: `ProcessNode<P>`, a task node that runs a process and
//!   turns its stdout into a typed result.
//! - `runner`: the async spawn / read / poll / kill loop.

pub mod descriptor;
pub mod manager;
pub mod process_node;
mod runner;

pub use descriptor::{ProcessDescriptor, split_arguments};
pub use manager::{InheritedEnvironment, ProcessEnvironment, ProcessManager, StaticEnvironment};
pub use process_node::ProcessNode;
