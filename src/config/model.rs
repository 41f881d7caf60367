// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

/// Scheduler configuration as read from a TOML file.
///
/// ```toml
/// [scheduler]
/// parallel_workers = 8
/// io_threads = 2
/// pump_tick_ms = 10
/// wait_slice_ms = 50
///
/// [process]
/// poll_interval_ms = 500
/// kill_on_drop = true
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSchedulerConfig {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub process: ProcessSection,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// Upper bound on threads in the Parallel pool.
    #[serde(default = "default_parallel_workers")]
    pub parallel_workers: usize,

    /// Async worker threads driving child-process IO.
    #[serde(default = "default_io_threads")]
    pub io_threads: usize,

    /// Period of one pump tick.
    #[serde(default = "default_pump_tick_ms")]
    pub pump_tick_ms: u64,

    /// How often blocking waits re-check the cancellation signal.
    #[serde(default = "default_wait_slice_ms")]
    pub wait_slice_ms: u64,
}

fn default_parallel_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .max(2)
}

fn default_io_threads() -> usize {
    2
}

fn default_pump_tick_ms() -> u64 {
    10
}

fn default_wait_slice_ms() -> u64 {
    50
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            parallel_workers: default_parallel_workers(),
            io_threads: default_io_threads(),
            pump_tick_ms: default_pump_tick_ms(),
            wait_slice_ms: default_wait_slice_ms(),
        }
    }
}

/// `[process]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessSection {
    /// Upper bound of one exit-poll wait; cancellation is observed at least
    /// this often.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Kill children whose handle is dropped without being waited on.
    #[serde(default = "default_kill_on_drop")]
    pub kill_on_drop: bool,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_kill_on_drop() -> bool {
    true
}

impl Default for ProcessSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            kill_on_drop: default_kill_on_drop(),
        }
    }
}

/// Validated scheduler configuration.
///
/// Only obtainable through `TryFrom<RawSchedulerConfig>` (see `validate.rs`)
/// or `Default`.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub scheduler: SchedulerSection,
    pub process: ProcessSection,
}

impl SchedulerConfig {
    pub(crate) fn new_unchecked(scheduler: SchedulerSection, process: ProcessSection) -> Self {
        Self { scheduler, process }
    }

    pub fn pump_tick(&self) -> Duration {
        Duration::from_millis(self.scheduler.pump_tick_ms)
    }

    pub fn wait_slice(&self) -> Duration {
        Duration::from_millis(self.scheduler.wait_slice_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.process.poll_interval_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new_unchecked(SchedulerSection::default(), ProcessSection::default())
    }
}
