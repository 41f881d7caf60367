mod common;
use crate::common::{TestResult, init_tracing};

use std::fs;
use std::str::FromStr;
use std::time::Duration;

use taskchain::config::{load_and_validate, load_from_str, validate_config};
use taskchain::logging::parse_level_str;
use taskchain::{Affinity, Scheduler, SchedulerConfig, TaskError};
use tempfile::TempDir;

fn write_config(contents: &str) -> Result<(TempDir, std::path::PathBuf), std::io::Error> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("taskchain.toml");
    fs::write(&path, contents)?;
    Ok((dir, path))
}

#[test]
fn empty_file_yields_defaults() -> TestResult {
    let (_dir, path) = write_config("")?;
    let config = load_and_validate(&path)?;

    assert!(config.scheduler.parallel_workers >= 2);
    assert_eq!(config.scheduler.io_threads, 2);
    assert_eq!(config.pump_tick(), Duration::from_millis(10));
    assert_eq!(config.wait_slice(), Duration::from_millis(50));
    assert_eq!(config.poll_interval(), Duration::from_millis(500));
    assert!(config.process.kill_on_drop);
    Ok(())
}

#[test]
fn explicit_values_override_defaults() -> TestResult {
    let (_dir, path) = write_config(
        r#"
[scheduler]
parallel_workers = 3
pump_tick_ms = 4

[process]
poll_interval_ms = 250
kill_on_drop = false
"#,
    )?;
    let config = load_and_validate(&path)?;

    assert_eq!(config.scheduler.parallel_workers, 3);
    assert_eq!(config.scheduler.pump_tick_ms, 4);
    assert_eq!(config.scheduler.wait_slice_ms, 50);
    assert_eq!(config.poll_interval(), Duration::from_millis(250));
    assert!(!config.process.kill_on_drop);
    Ok(())
}

#[test]
fn zero_sizes_and_periods_are_rejected() -> TestResult {
    for (section, key) in [
        ("scheduler", "parallel_workers"),
        ("scheduler", "io_threads"),
        ("scheduler", "pump_tick_ms"),
        ("scheduler", "wait_slice_ms"),
        ("process", "poll_interval_ms"),
    ] {
        let raw = load_from_str(&format!("[{section}]\n{key} = 0\n"))?;
        let err = validate_config(&raw).unwrap_err();
        match err {
            TaskError::Configuration(msg) => assert!(msg.contains(key), "{msg}"),
            other => panic!("expected a configuration error for {key}, got {other:?}"),
        }
    }
    Ok(())
}

#[test]
fn overlong_poll_interval_is_rejected() -> TestResult {
    let raw = load_from_str("[process]\npoll_interval_ms = 60001\n")?;
    assert!(SchedulerConfig::try_from(raw).is_err());

    let raw = load_from_str("[process]\npoll_interval_ms = 60000\n")?;
    assert!(SchedulerConfig::try_from(raw).is_ok());
    Ok(())
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let err = load_from_str("[scheduler\nparallel_workers = ").unwrap_err();
    assert!(matches!(err, TaskError::Toml(_)), "{err:?}");

    let err = load_from_str("[scheduler]\nparallel_workers = \"many\"\n").unwrap_err();
    assert!(matches!(err, TaskError::Toml(_)), "{err:?}");
}

#[test]
fn missing_file_is_an_io_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, TaskError::Io(_)), "{err:?}");
    Ok(())
}

#[test]
fn scheduler_starts_from_a_config_file() -> TestResult {
    init_tracing();
    let (_dir, path) = write_config("[scheduler]\nparallel_workers = 2\npump_tick_ms = 1\n")?;

    let scheduler = Scheduler::from_config_file(&path)?;
    assert_eq!(scheduler.config().scheduler.parallel_workers, 2);
    assert_eq!(scheduler.pump().invoke(|| 7)?, 7);
    Ok(())
}

#[test]
fn affinity_parses_names_and_aliases() {
    assert_eq!(Affinity::from_str("parallel"), Ok(Affinity::Parallel));
    assert_eq!(Affinity::from_str(" Serial "), Ok(Affinity::Serial));
    assert_eq!(Affinity::from_str("exclusive"), Ok(Affinity::Serial));
    assert_eq!(Affinity::from_str("ui"), Ok(Affinity::Pump));
    assert!(Affinity::from_str("gpu").is_err());
    assert_eq!(Affinity::default(), Affinity::Parallel);
    assert_eq!(Affinity::Pump.to_string(), "pump");
}

#[test]
fn log_levels_parse_case_insensitively() {
    assert_eq!(parse_level_str("DEBUG"), Some(tracing::Level::DEBUG));
    assert_eq!(parse_level_str(" warning "), Some(tracing::Level::WARN));
    assert_eq!(parse_level_str("verbose"), None);
}
