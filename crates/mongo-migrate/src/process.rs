//! External process execution with live output streaming.
//!
//! [`ProcessRunner::spawn`] launches an executable without a shell and
//! returns a [`RunningProcess`]. Its output is a finite stream of
//! [`OutputLine`]s (stdout and stderr interleaved in arrival order), read
//! with [`RunningProcess::next_line`]; [`RunningProcess::wait`] drains the
//! remaining lines into a sink and resolves once the process exits.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Number of trailing stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Errors from launching or supervising an external process.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The executable could not be started (not found, permission denied).
    #[error("{program}: failed to start: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited with a non-zero status.
    #[error("{program} exited with {}{}", exit_label(.code), stderr_suffix(.stderr))]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The process exceeded its time budget and was killed.
    #[error("{program} timed out after {}s and was killed", .after.as_secs())]
    TimedOut { program: String, after: Duration },

    /// The run was cancelled and the process was killed.
    #[error("{program} cancelled")]
    Cancelled { program: String },

    /// Waiting on the child failed.
    #[error("{program}: failed to wait for exit: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (killed by signal)".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of process output, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Successful process completion.
#[derive(Debug, Clone)]
pub struct ExitInfo {
    pub program: String,
    pub code: i32,
    pub duration: Duration,
}

/// Supervision options for a single process run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Kill the process once it has run this long.
    pub timeout: Option<Duration>,
    /// Kill the process when this token is cancelled.
    pub cancel: CancellationToken,
}

impl RunOptions {
    pub fn new(timeout: Option<Duration>, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }
}

/// Launches external executables.
pub struct ProcessRunner;

impl ProcessRunner {
    /// Spawn `program` with `args`. Output is captured line by line from the
    /// moment the process starts.
    pub fn spawn(program: &str, args: &[String]) -> Result<RunningProcess, ProcessError> {
        debug!("Spawning {} with {} arguments", program, args.len());

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Launch {
                program: program.to_string(),
                source,
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, OutputStream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, OutputStream::Stderr, tx);
        }

        Ok(RunningProcess {
            program: program.to_string(),
            child,
            lines: rx,
            stderr_tail: VecDeque::with_capacity(STDERR_TAIL_LINES),
            started: Instant::now(),
        })
    }

    /// Run `program` to completion, forwarding every output line to `sink`
    /// as it arrives.
    pub async fn run<F>(
        program: &str,
        args: &[String],
        options: &RunOptions,
        sink: F,
    ) -> Result<ExitInfo, ProcessError>
    where
        F: FnMut(&OutputLine),
    {
        Self::spawn(program, args)?.wait(options, sink).await
    }

    /// Run `program` to completion and return its stdout.
    pub async fn capture(
        program: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<String, ProcessError> {
        let mut stdout = String::new();
        Self::run(program, args, options, |line| {
            if line.stream == OutputStream::Stdout {
                stdout.push_str(&line.text);
                stdout.push('\n');
            }
        })
        .await?;
        Ok(stdout)
    }
}

/// A launched process whose output has not been fully consumed yet.
pub struct RunningProcess {
    program: String,
    child: Child,
    lines: mpsc::UnboundedReceiver<OutputLine>,
    stderr_tail: VecDeque<String>,
    started: Instant,
}

impl RunningProcess {
    /// Program name this process was launched as.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Next output line, or `None` once both pipes are closed.
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        let line = self.lines.recv().await?;
        if line.stream == OutputStream::Stderr {
            if self.stderr_tail.len() == STDERR_TAIL_LINES {
                self.stderr_tail.pop_front();
            }
            self.stderr_tail.push_back(line.text.clone());
        }
        Some(line)
    }

    /// Drain remaining output into `sink` and wait for the process to exit.
    ///
    /// Resolves `Ok` only for exit status 0. Timeout and cancellation kill
    /// the process.
    pub async fn wait<F>(mut self, options: &RunOptions, mut sink: F) -> Result<ExitInfo, ProcessError>
    where
        F: FnMut(&OutputLine),
    {
        let deadline = options.timeout.map(|t| self.started + t);
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expired);

        loop {
            tokio::select! {
                line = self.next_line() => match line {
                    Some(line) => sink(&line),
                    None => break,
                },
                _ = options.cancel.cancelled() => return Err(self.abort(None).await),
                _ = &mut expired => return Err(self.abort(options.timeout).await),
            }
        }

        let status = tokio::select! {
            status = self.child.wait() => status.map_err(|source| ProcessError::Wait {
                program: self.program.clone(),
                source,
            })?,
            _ = options.cancel.cancelled() => return Err(self.abort(None).await),
            _ = &mut expired => return Err(self.abort(options.timeout).await),
        };

        match status.code() {
            Some(0) => Ok(ExitInfo {
                program: self.program,
                code: 0,
                duration: self.started.elapsed(),
            }),
            code => Err(ProcessError::Exit {
                program: self.program,
                code,
                stderr: self.stderr_tail.into_iter().collect::<Vec<_>>().join("\n"),
            }),
        }
    }

    /// Kill the process; `timeout` set means the deadline expired.
    async fn abort(&mut self, timeout: Option<Duration>) -> ProcessError {
        if let Err(e) = self.child.kill().await {
            debug!("Failed to kill {}: {}", self.program, e);
        }
        match timeout {
            Some(after) => ProcessError::TimedOut {
                program: self.program.clone(),
                after,
            },
            None => ProcessError::Cancelled {
                program: self.program.clone(),
            },
        }
    }
}

fn forward_lines<R>(reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf)
                        .trim_end_matches(|c| c == '\n' || c == '\r')
                        .to_string();
                    if tx.send(OutputLine { stream, text }).is_err() {
                        break;
                    }
                }
            }
        }
    });
}
