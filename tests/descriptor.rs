mod common;
use crate::common::TestResult;

use std::path::PathBuf;

use taskchain::exec::split_arguments;
use taskchain::{ProcessDescriptor, TaskError};

#[test]
fn split_plain_words_on_any_whitespace() -> TestResult {
    assert_eq!(
        split_arguments("  log --oneline\t-n   5 ")?,
        vec!["log", "--oneline", "-n", "5"]
    );
    assert!(split_arguments("")?.is_empty());
    assert!(split_arguments("   ")?.is_empty());
    Ok(())
}

#[test]
fn split_honours_quotes() -> TestResult {
    assert_eq!(
        split_arguments(r#"commit -m "fix the thing" --author='A B'"#)?,
        vec!["commit", "-m", "fix the thing", "--author=A B"]
    );
    assert_eq!(split_arguments(r#"'it\s' "a \"b\" \\c""#)?, vec![r"it\s", r#"a "b" \c"#]);
    assert_eq!(split_arguments(r#"x "" y"#)?, vec!["x", "", "y"]);
    assert_eq!(split_arguments(r#"pre"mid dle"post"#)?, vec!["premid dlepost"]);
    Ok(())
}

#[test]
fn unterminated_quote_is_a_configuration_error() {
    for input in [r#"echo "open"#, "echo 'open"] {
        let err = split_arguments(input).unwrap_err();
        assert!(matches!(err, TaskError::Configuration(_)), "{input}: {err:?}");
    }
}

#[test]
fn argument_string_quotes_only_where_needed() -> TestResult {
    let descriptor = ProcessDescriptor::from_args("git", ["commit", "-m", "two words", "", r#"say "hi""#]);
    assert_eq!(
        descriptor.argument_string(),
        r#"commit -m "two words" "" "say \"hi\"""#
    );
    Ok(())
}

#[test]
fn argument_string_splits_back_to_the_same_arguments() -> TestResult {
    let original = ProcessDescriptor::new("tool", r#"--name "A B" plain 'x"y' "back\\slash""#)?;
    let reparsed = split_arguments(&original.argument_string())?;
    assert_eq!(reparsed, original.arguments);
    Ok(())
}

#[test]
fn builder_sets_streams_environment_and_directory() -> TestResult {
    let descriptor = ProcessDescriptor::new("make", "-j4")?
        .working_directory("/tmp/build")
        .env("CC", "clang")
        .redirect(true, false)
        .stdin("input");

    assert_eq!(descriptor.executable, "make");
    assert_eq!(descriptor.arguments, vec!["-j4"]);
    assert_eq!(descriptor.working_directory, Some(PathBuf::from("/tmp/build")));
    assert_eq!(descriptor.environment.get("CC").map(String::as_str), Some("clang"));
    assert!(descriptor.redirect_stdout);
    assert!(!descriptor.redirect_stderr);
    assert!(descriptor.redirect_stdin);
    assert_eq!(descriptor.stdin.as_deref(), Some("input"));
    Ok(())
}
