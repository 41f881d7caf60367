mod common;
use crate::common::{Recorder, TestResult};

use taskchain::output::{
    FirstLineOutputProcessor, KeyValueOutputProcessor, LastLineOutputProcessor,
    LineListOutputProcessor, PatternOutputProcessor, StringOutputProcessor,
};
use taskchain::{OutputProcessor, ProcessorHandle, TaskError};

fn feed<P: OutputProcessor>(handle: &ProcessorHandle<P>, lines: &[&str]) -> Vec<bool> {
    lines.iter().map(|line| handle.receive_line(line)).collect()
}

#[test]
fn key_value_lines_skip_blanks_and_keep_arrival_order() {
    let handle = ProcessorHandle::new(KeyValueOutputProcessor::new());
    let seen = Recorder::new();
    let s = seen.clone();
    handle.subscribe(move |(key, value): &(String, String)| s.record(format!("{key}={value}")));

    let accepted = feed(&handle, &["user.name=Ada", "", "core.editor=vim"]);

    assert_eq!(accepted, vec![true, false, true]);
    assert_eq!(
        handle.result(),
        vec![
            ("user.name".to_string(), "Ada".to_string()),
            ("core.editor".to_string(), "vim".to_string()),
        ]
    );
    assert_eq!(seen.events(), vec!["user.name=Ada", "core.editor=vim"]);
}

#[test]
fn key_value_rejects_lines_without_a_key() {
    let mut processor = KeyValueOutputProcessor::new();
    assert_eq!(processor.receive_line("no separator"), None);
    assert_eq!(processor.receive_line("=orphan"), None);
    assert_eq!(
        processor.receive_line("url=https://host/?a=b"),
        Some(("url".to_string(), "https://host/?a=b".to_string()))
    );
    assert_eq!(processor.receive_line("empty="), Some(("empty".to_string(), String::new())));
    assert_eq!(processor.result().len(), 2);
}

#[test]
fn string_processor_joins_lines() {
    let handle = ProcessorHandle::new(StringOutputProcessor::new());
    feed(&handle, &["first", "", "second"]);
    assert_eq!(handle.result(), "first\nsecond");
}

#[test]
fn first_and_last_line_processors() {
    let first = ProcessorHandle::new(FirstLineOutputProcessor::new());
    let last = ProcessorHandle::new(LastLineOutputProcessor::new());
    assert_eq!(first.result(), None);
    assert_eq!(last.result(), None);

    assert_eq!(feed(&first, &["a", "b", "c"]), vec![true, false, false]);
    feed(&last, &["a", "b", "c"]);

    assert_eq!(first.result().as_deref(), Some("a"));
    assert_eq!(last.result().as_deref(), Some("c"));
}

#[test]
fn line_list_keeps_every_non_empty_line() {
    let handle = ProcessorHandle::new(LineListOutputProcessor::new());
    feed(&handle, &["x", "", "y", "x"]);
    assert_eq!(handle.result(), vec!["x", "y", "x"]);
}

#[test]
fn pattern_processor_prefers_the_first_capture_group() -> TestResult {
    let grouped = ProcessorHandle::new(PatternOutputProcessor::new(r"^version (\d+\.\d+)")?);
    let accepted = feed(&grouped, &["version 1.42 (stable)", "ignored", "version 2.0"]);
    assert_eq!(accepted, vec![true, false, true]);
    assert_eq!(grouped.result(), vec!["1.42", "2.0"]);

    let whole = ProcessorHandle::new(PatternOutputProcessor::new(r"[a-f0-9]{7}")?);
    feed(&whole, &["commit 3f2a9c1 fix", "no hash here"]);
    assert_eq!(whole.result(), vec!["3f2a9c1"]);
    Ok(())
}

#[test]
fn invalid_pattern_is_a_configuration_error() {
    let err = PatternOutputProcessor::new("(unclosed").unwrap_err();
    assert!(matches!(err, TaskError::Configuration(ref msg) if msg.contains("(unclosed")), "{err:?}");
}

#[test]
fn rejected_lines_are_not_broadcast() {
    let handle = ProcessorHandle::new(FirstLineOutputProcessor::new());
    let seen = Recorder::new();
    let s = seen.clone();
    handle.subscribe(move |line: &String| s.record(line.clone()));
    let other = handle.clone();

    feed(&handle, &["only", "dropped"]);
    assert_eq!(seen.events(), vec!["only"]);
    assert_eq!(other.result().as_deref(), Some("only"));
}
