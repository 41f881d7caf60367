// src/engine/serial.rs

//! Single-worker FIFO executor.

use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::Job;
use super::interleave::InterleaveCoordinator;
use crate::sync::lock;

enum SerialMessage {
    Run(Job),
    Shutdown,
}

/// Runs jobs one at a time, in submission order, on a dedicated thread.
/// Each job holds an exclusive admission, so no parallel job overlaps it.
pub struct SerialExecutor {
    tx: mpsc::UnboundedSender<SerialMessage>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SerialExecutor {
    pub(crate) fn spawn(coordinator: Arc<InterleaveCoordinator>) -> io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<SerialMessage>();
        let thread = thread::Builder::new()
            .name("taskchain-serial".to_string())
            .spawn(move || {
                info!("serial executor started");
                while let Some(message) = rx.blocking_recv() {
                    match message {
                        SerialMessage::Run(job) => {
                            let _admission = coordinator.enter_serial();
                            job();
                        }
                        SerialMessage::Shutdown => break,
                    }
                }
                info!("serial executor stopped");
            })?;

        Ok(Self {
            tx,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Queue a job. Hands the job back if the worker is gone.
    pub fn submit(&self, job: Job) -> Result<(), Job> {
        match self.tx.send(SerialMessage::Run(job)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(SerialMessage::Run(job))) => Err(job),
            Err(mpsc::error::SendError(SerialMessage::Shutdown)) => Ok(()),
        }
    }

    /// Ask the worker to exit after the jobs queued so far, and join it.
    pub(crate) fn shutdown(&self) {
        let Some(thread) = lock(&self.thread).take() else {
            return;
        };
        if self.tx.send(SerialMessage::Shutdown).is_err() {
            debug!("serial executor already gone");
        }
        if thread.join().is_err() {
            warn!("serial executor thread panicked");
        }
    }
}
