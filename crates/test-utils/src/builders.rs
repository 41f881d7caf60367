#![allow(dead_code)]

use taskchain::config::{ProcessSection, RawSchedulerConfig, SchedulerConfig, SchedulerSection};
use taskchain::{ProcessDescriptor, Scheduler};

/// Builder for `SchedulerConfig` to simplify test setup.
pub struct SchedulerConfigBuilder {
    config: RawSchedulerConfig,
}

impl SchedulerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawSchedulerConfig {
                scheduler: SchedulerSection::default(),
                process: ProcessSection::default(),
            },
        }
    }

    pub fn parallel_workers(mut self, n: usize) -> Self {
        self.config.scheduler.parallel_workers = n;
        self
    }

    pub fn pump_tick_ms(mut self, ms: u64) -> Self {
        self.config.scheduler.pump_tick_ms = ms;
        self
    }

    pub fn wait_slice_ms(mut self, ms: u64) -> Self {
        self.config.scheduler.wait_slice_ms = ms;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.process.poll_interval_ms = ms;
        self
    }

    pub fn build(self) -> SchedulerConfig {
        SchedulerConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }

    pub fn start(self) -> Scheduler {
        Scheduler::new(self.build()).expect("Failed to start scheduler")
    }
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A scheduler with four parallel workers and short timing values.
pub fn test_scheduler() -> Scheduler {
    SchedulerConfigBuilder::new()
        .parallel_workers(4)
        .pump_tick_ms(2)
        .wait_slice_ms(10)
        .poll_interval_ms(100)
        .start()
}

/// Descriptor running `script` through `sh -c`.
pub fn shell(script: &str) -> ProcessDescriptor {
    ProcessDescriptor::from_args("sh", ["-c", script])
}
