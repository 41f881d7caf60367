// src/config/validate.rs

use crate::config::model::{RawSchedulerConfig, SchedulerConfig};
use crate::errors::{Result, TaskError};

/// Longest accepted exit-poll interval; cancellation latency is bounded by it.
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

impl TryFrom<RawSchedulerConfig> for SchedulerConfig {
    type Error = TaskError;

    fn try_from(raw: RawSchedulerConfig) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(SchedulerConfig::new_unchecked(raw.scheduler, raw.process))
    }
}

pub fn validate_config(cfg: &RawSchedulerConfig) -> Result<()> {
    validate_scheduler_section(cfg)?;
    validate_process_section(cfg)?;
    Ok(())
}

fn validate_scheduler_section(cfg: &RawSchedulerConfig) -> Result<()> {
    let s = &cfg.scheduler;

    if s.parallel_workers == 0 {
        return Err(TaskError::Configuration(
            "[scheduler].parallel_workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if s.io_threads == 0 {
        return Err(TaskError::Configuration(
            "[scheduler].io_threads must be >= 1 (got 0)".to_string(),
        ));
    }
    if s.pump_tick_ms == 0 {
        return Err(TaskError::Configuration(
            "[scheduler].pump_tick_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if s.wait_slice_ms == 0 {
        return Err(TaskError::Configuration(
            "[scheduler].wait_slice_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_process_section(cfg: &RawSchedulerConfig) -> Result<()> {
    let p = &cfg.process;

    if p.poll_interval_ms == 0 || p.poll_interval_ms > MAX_POLL_INTERVAL_MS {
        return Err(TaskError::Configuration(format!(
            "[process].poll_interval_ms must be within 1..={} (got {})",
            MAX_POLL_INTERVAL_MS, p.poll_interval_ms
        )));
    }

    Ok(())
}
