// src/output/mod.rs

//! Output processors: turn a child's stdout, one line at a time, into a
//! typed result.
//!
//! A processor may reject a line or turn it into one entry. Entries are
//! broadcast to subscribers as soon as they are produced, so consumers can
//! stream partial results while the process is still running; the final
//! result is assembled by [`OutputProcessor::result`] once the process exits.

pub mod processors;

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::sync::lock;

pub use processors::{
    FirstLineOutputProcessor, KeyValueOutputProcessor, LastLineOutputProcessor,
    LineListOutputProcessor, PatternOutputProcessor, StringOutputProcessor,
};

pub trait OutputProcessor: Send + 'static {
    /// What a single accepted line turns into.
    type Entry: Clone + Send + 'static;
    /// The node's result.
    type Output: Clone + Send + Sync + 'static;

    /// Consume one non-empty line. `None` rejects it.
    fn receive_line(&mut self, line: &str) -> Option<Self::Entry>;

    fn result(&self) -> Self::Output;
}

type Subscriber<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Shared, thread-safe wrapper around a processor plus its subscribers.
///
/// Stdout is read on a runtime task while subscribers are registered and
/// results read from other threads, hence the locking.
pub struct ProcessorHandle<P: OutputProcessor> {
    processor: Arc<Mutex<P>>,
    subscribers: Arc<Mutex<Vec<Subscriber<P::Entry>>>>,
}

impl<P: OutputProcessor> Clone for ProcessorHandle<P> {
    fn clone(&self) -> Self {
        Self {
            processor: Arc::clone(&self.processor),
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<P: OutputProcessor> fmt::Debug for ProcessorHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorHandle")
            .field("processor", &std::any::type_name::<P>())
            .field("subscribers", &lock(&self.subscribers).len())
            .finish()
    }
}

impl<P: OutputProcessor> ProcessorHandle<P> {
    pub fn new(processor: P) -> Self {
        Self {
            processor: Arc::new(Mutex::new(processor)),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Call `callback` for every entry produced from now on.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&P::Entry) + Send + Sync + 'static,
    {
        lock(&self.subscribers).push(Arc::new(callback));
    }

    /// Feed one line. Empty lines are skipped. Returns whether the line
    /// produced an entry.
    pub fn receive_line(&self, line: &str) -> bool {
        if line.is_empty() {
            return false;
        }
        let entry = lock(&self.processor).receive_line(line);
        let Some(entry) = entry else {
            return false;
        };
        let subscribers = lock(&self.subscribers).clone();
        for subscriber in subscribers {
            subscriber(&entry);
        }
        true
    }

    pub fn result(&self) -> P::Output {
        lock(&self.processor).result()
    }
}
