use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

/// Thread-safe, ordered log of events for asserting on execution order.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(String, ThreadId)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `event` together with the calling thread.
    pub fn record(&self, event: impl Into<String>) {
        self.events
            .lock()
            .unwrap()
            .push((event.into(), thread::current().id()));
    }

    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(e, _)| e.clone())
            .collect()
    }

    /// Thread that recorded `event` first.
    pub fn thread_of(&self, event: &str) -> Option<ThreadId> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|(e, _)| e == event)
            .map(|(_, t)| *t)
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
