// src/exec/runner.rs

//! Child-process runner behind `ProcessNode`.
//!
//! Runs on the node's own executor thread, blocking on the scheduler's
//! runtime while the child is alive:
//! - stdout lines go to the output processor, stderr lines are collected;
//! - the exit is polled with a bounded wait, racing the scheduler's
//!   cancellation token; cancellation kills the child;
//! - both readers are drained before the result is taken, so no line that
//!   the child wrote before exiting is lost.

use std::fmt::Write as _;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::errors::{Result, TaskError};
use crate::exec::descriptor::ProcessDescriptor;
use crate::exec::process_node::ProcessState;
use crate::node::inner::RunContext;
use crate::output::OutputProcessor;

pub(crate) fn run_blocking<P: OutputProcessor>(
    state: &Arc<ProcessState<P>>,
    ctx: RunContext,
) -> Result<P::Output> {
    if !ctx.antecedent.success {
        let cause = ctx
            .antecedent
            .error
            .clone()
            .unwrap_or_else(|| TaskError::canceled(format!("predecessor of '{}'", ctx.task)));
        return Err(TaskError::predecessor(&ctx.task, cause));
    }
    let descriptor = state.descriptor()?;
    let runtime = ctx.runtime.clone();
    runtime.block_on(run_process(Arc::clone(state), descriptor, ctx))
}

async fn run_process<P: OutputProcessor>(
    state: Arc<ProcessState<P>>,
    descriptor: ProcessDescriptor,
    ctx: RunContext,
) -> Result<P::Output> {
    info!(
        task = %ctx.task,
        executable = %descriptor.executable,
        args = %descriptor.argument_string(),
        "starting process"
    );

    let mut child = match descriptor.to_command(ctx.kill_on_drop).spawn() {
        Ok(child) => child,
        Err(err) => {
            let message = spawn_failure_message(&err, &descriptor);
            warn!(task = %ctx.task, executable = %descriptor.executable, error = %err, "failed to spawn process");
            state.raise_error_data(&message);
            return Err(TaskError::Spawn {
                executable: descriptor.executable.clone(),
                message,
            });
        }
    };
    if let Some(pid) = child.id() {
        state.set_process_id(pid);
    }

    let stdout_reader = child.stdout.take().map(|stdout| {
        let processor = state.processor().clone();
        let task = ctx.task.clone();
        tokio::spawn(async move {
            read_lines(stdout, |line| {
                trace!(task = %task, line = %line, "stdout");
                processor.receive_line(&line);
            })
            .await;
        })
    });

    let stderr_reader = child.stderr.take().map(|stderr| {
        let state = Arc::clone(&state);
        let task = ctx.task.clone();
        tokio::spawn(async move {
            read_lines(stderr, |line| {
                debug!(task = %task, "stderr: {}", line);
                state.push_error_line(line);
            })
            .await;
        })
    });

    if let Some(mut stdin) = child.stdin.take() {
        let input = descriptor.stdin.clone();
        let task = ctx.task.clone();
        tokio::spawn(async move {
            if let Some(input) = input
                && let Err(err) = stdin.write_all(input.as_bytes()).await
            {
                debug!(task = %task, error = %err, "child closed stdin early");
            }
            // Dropping the handle closes the pipe.
        });
    }

    let status = loop {
        tokio::select! {
            waited = timeout(ctx.poll_interval, child.wait()) => match waited {
                Ok(Ok(status)) => break status,
                Ok(Err(err)) => {
                    abort_reader(stdout_reader);
                    abort_reader(stderr_reader);
                    return Err(err.into());
                }
                Err(_) => trace!(task = %ctx.task, "process still running"),
            },
            _ = ctx.cancel.cancelled() => {
                info!(task = %ctx.task, "cancellation requested; killing process");
                if let Err(err) = child.kill().await {
                    warn!(task = %ctx.task, error = %err, "failed to kill child process on cancellation");
                }
                abort_reader(stdout_reader);
                abort_reader(stderr_reader);
                return Err(TaskError::canceled(&ctx.task));
            }
        }
    };

    // Grandchildren may keep the pipes open; do not wait on them forever.
    drain_reader(stdout_reader, ctx.poll_interval, &ctx.task).await;
    drain_reader(stderr_reader, ctx.poll_interval, &ctx.task).await;

    let exit_code = status.code().unwrap_or(-1);
    state.set_exit_code(exit_code);
    info!(task = %ctx.task, exit_code, success = status.success(), "process exited");

    if status.success() {
        Ok(state.processor().result())
    } else {
        Err(TaskError::ProcessExit {
            exit_code,
            stderr: state.errors().join("\n"),
        })
    }
}

async fn read_lines<R, F>(reader: R, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut segments = BufReader::new(reader).split(b'\n');
    loop {
        match segments.next_segment().await {
            Ok(Some(bytes)) => on_line(decode_line(&bytes)),
            Ok(None) => break,
            Err(err) => {
                debug!(error = %err, "stream read failed");
                break;
            }
        }
    }
}

/// Lossy UTF-8 with a trailing `\r` removed.
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

async fn drain_reader(reader: Option<JoinHandle<()>>, limit: Duration, task: &str) {
    let Some(mut reader) = reader else {
        return;
    };
    match timeout(limit, &mut reader).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(task = %task, error = %err, "output reader failed"),
        Err(_) => {
            warn!(task = %task, "output stream still open after exit; abandoning reader");
            reader.abort();
        }
    }
}

fn abort_reader(reader: Option<JoinHandle<()>>) {
    if let Some(reader) = reader {
        reader.abort();
    }
}

fn spawn_failure_message(err: &io::Error, descriptor: &ProcessDescriptor) -> String {
    let mut message = String::new();
    let _ = writeln!(message, "{err}");
    let _ = writeln!(message, "error code {}", err.raw_os_error().unwrap_or(-1));
    if err.kind() == io::ErrorKind::NotFound {
        let _ = writeln!(message, "The system cannot find the file specified.");
    }
    for (key, value) in &descriptor.environment {
        let _ = writeln!(message, "{key}:{value}");
    }
    if !descriptor.environment.contains_key("PATH")
        && let Ok(path) = std::env::var("PATH")
    {
        let _ = writeln!(message, "PATH:{path}");
    }
    message.trim_end().to_string()
}
