// src/logging.rs

//! Logging setup for `taskchain` using `tracing` + `tracing-subscriber`.
//!
//! The library itself only emits `tracing` events; every module logs under
//! its own target (`taskchain::engine::pump`, `taskchain::exec::runner`, ...)
//! which doubles as the component name. Without a subscriber nothing is
//! recorded.
//!
//! Priority for determining the log level:
//! 1. the `level` argument (if provided)
//! 2. `TASKCHAIN_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`

use anyhow::{Result, anyhow};
use tracing_subscriber::fmt;

pub const LOG_ENV_VAR: &str = "TASKCHAIN_LOG";

/// Initialise the global logging subscriber.
///
/// Fails if a global subscriber was already installed.
pub fn init_logging(level: Option<tracing::Level>) -> Result<()> {
    let level = match level {
        Some(lvl) => lvl,
        None => std::env::var(LOG_ENV_VAR)
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(tracing::Level::INFO),
    };

    // Process stdout belongs to the nodes' children; log to stderr.
    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

pub fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
