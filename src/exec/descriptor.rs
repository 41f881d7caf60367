// src/exec/descriptor.rs

//! What to spawn, and how.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::errors::{Result, TaskError};

/// Everything needed to spawn a child process.
///
/// Streams that are not redirected are inherited (stdout/stderr) or closed
/// (stdin).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDescriptor {
    pub executable: String,
    pub arguments: Vec<String>,
    pub working_directory: Option<PathBuf>,
    /// Overrides applied on top of the inherited environment.
    pub environment: BTreeMap<String, String>,
    pub redirect_stdout: bool,
    pub redirect_stderr: bool,
    pub redirect_stdin: bool,
    /// Written to stdin (when redirected) before it is closed.
    pub stdin: Option<String>,
}

impl ProcessDescriptor {
    /// Descriptor from an argument string, with stdout and stderr redirected.
    pub fn new(executable: impl Into<String>, arguments: &str) -> Result<Self> {
        Ok(Self::from_args(executable, split_arguments(arguments)?))
    }

    pub fn from_args<I, S>(executable: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            executable: executable.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            working_directory: None,
            environment: BTreeMap::new(),
            redirect_stdout: true,
            redirect_stderr: true,
            redirect_stdin: false,
            stdin: None,
        }
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn redirect(mut self, stdout: bool, stderr: bool) -> Self {
        self.redirect_stdout = stdout;
        self.redirect_stderr = stderr;
        self
    }

    /// Redirect stdin and feed it `input`.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.redirect_stdin = true;
        self.stdin = Some(input.into());
        self
    }

    /// Arguments joined back into one string, quoting where needed.
    pub fn argument_string(&self) -> String {
        self.arguments
            .iter()
            .map(|arg| quote_argument(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn to_command(&self, kill_on_drop: bool) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(&self.arguments).envs(&self.environment);
        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }
        cmd.stdin(if self.redirect_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(if self.redirect_stdout {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });
        cmd.stderr(if self.redirect_stderr {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });
        cmd.kill_on_drop(kill_on_drop);
        cmd
    }
}

/// Split an argument string the way a POSIX shell would for plain words:
/// whitespace separates arguments, single quotes are literal, and inside
/// double quotes `\"` and `\\` are escapes. No expansion of any kind.
pub fn split_arguments(input: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some('\'') => {
                if c == '\'' {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            Some(_) => match c {
                '"' => quote = None,
                '\\' => match chars.peek() {
                    Some(&next) if next == '"' || next == '\\' => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push('\\'),
                },
                _ => current.push(c),
            },
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        args.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    if let Some(q) = quote {
        return Err(TaskError::Configuration(format!(
            "unterminated {q} quote in arguments: {input}"
        )));
    }
    if in_word {
        args.push(current);
    }
    Ok(args)
}

fn quote_argument(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        return arg.to_string();
    }
    let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
