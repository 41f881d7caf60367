// src/exec/manager.rs

//! Building process descriptors.
//!
//! `ProcessManager` is the single place that decides how a process is set
//! up (redirection, working directory); a `ProcessEnvironment` strategy
//! adjusts the environment, so tests and embedders can swap it out.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::errors::Result;
use crate::exec::descriptor::ProcessDescriptor;
use crate::exec::process_node::ProcessNode;
use crate::output::OutputProcessor;

pub trait ProcessEnvironment: Send + Sync + Debug {
    fn configure(&self, descriptor: &mut ProcessDescriptor, working_directory: Option<&Path>);
}

/// Leaves the inherited environment untouched.
#[derive(Debug, Default, Clone)]
pub struct InheritedEnvironment;

impl ProcessEnvironment for InheritedEnvironment {
    fn configure(&self, descriptor: &mut ProcessDescriptor, working_directory: Option<&Path>) {
        if let Some(dir) = working_directory {
            descriptor.working_directory = Some(dir.to_path_buf());
        }
    }
}

/// Applies a fixed set of environment overrides.
#[derive(Debug, Default, Clone)]
pub struct StaticEnvironment {
    vars: BTreeMap<String, String>,
}

impl StaticEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl ProcessEnvironment for StaticEnvironment {
    fn configure(&self, descriptor: &mut ProcessDescriptor, working_directory: Option<&Path>) {
        InheritedEnvironment.configure(descriptor, working_directory);
        for (key, value) in &self.vars {
            descriptor
                .environment
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessManager {
    environment: Arc<dyn ProcessEnvironment>,
    default_working_directory: Option<PathBuf>,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new(InheritedEnvironment)
    }
}

impl ProcessManager {
    pub fn new(environment: impl ProcessEnvironment + 'static) -> Self {
        Self {
            environment: Arc::new(environment),
            default_working_directory: None,
        }
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_working_directory = Some(dir.into());
        self
    }

    /// Descriptor with stdout and stderr redirected and stdin closed.
    pub fn configure(
        &self,
        executable: &str,
        arguments: &str,
        working_directory: Option<&Path>,
    ) -> Result<ProcessDescriptor> {
        let mut descriptor = ProcessDescriptor::new(executable, arguments)?;
        let dir = working_directory.or(self.default_working_directory.as_deref());
        self.environment.configure(&mut descriptor, dir);
        debug!(
            executable,
            args = %descriptor.argument_string(),
            cwd = ?descriptor.working_directory,
            "process configured"
        );
        Ok(descriptor)
    }

    /// Build a descriptor and attach it to `node`.
    pub fn configure_node<P: OutputProcessor>(
        &self,
        node: &ProcessNode<P>,
        executable: &str,
        arguments: &str,
        working_directory: Option<&Path>,
    ) -> Result<()> {
        let descriptor = self.configure(executable, arguments, working_directory)?;
        node.configure(descriptor)?;
        Ok(())
    }
}
