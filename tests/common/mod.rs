#![allow(dead_code)]

pub use taskchain_test_utils::{
    LogCapture, Recorder, SchedulerConfigBuilder, init_log_capture, init_tracing, shell,
    test_scheduler, wait_until,
};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
