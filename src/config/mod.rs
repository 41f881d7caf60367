// src/config/mod.rs

//! Scheduler configuration.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate executor sizing and timing values (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{ProcessSection, RawSchedulerConfig, SchedulerConfig, SchedulerSection};
pub use validate::validate_config;
