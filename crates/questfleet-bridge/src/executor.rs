//! Running external programs with captured output, streamed progress and
//! a hard time limit.
//!
//! # Panic-Free Guarantees
//!
//! Every failure (spawn, read, timeout, exit status) is reported through
//! [`CommandOutcome::error`]; nothing here panics. Children are spawned with
//! `kill_on_drop`, so an abandoned execution never leaves a process behind.

use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, warn};

use crate::ExecError;

/// Size of a single pipe read.
const READ_CHUNK_SIZE: usize = 4096;

/// Executions slower than this are logged at `warn`.
const SLOW_COMMAND_THRESHOLD: Duration = Duration::from_secs(5);

/// Receives standard output text as it arrives.
pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

// ============================================================================
// Command Line
// ============================================================================

/// A program and its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let program = self.program.display().to_string();
        if program.chars().any(char::is_whitespace) {
            write!(f, "\"{program}\"")?;
        } else {
            f.write_str(&program)?;
        }
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Result of one execution.
///
/// `exit_code` is -1 when the program never ran, timed out or was
/// terminated by a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub error: Option<ExecError>,
}

impl CommandOutcome {
    pub fn succeeded(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code: 0,
            error: None,
        }
    }

    pub fn failed(
        error: ExecError,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            error: Some(error),
        }
    }

    /// Builds the outcome for a program that ran to completion.
    fn from_exit(status: ExitStatus, stdout: String, stderr: String) -> Self {
        match status.code() {
            Some(0) => Self::succeeded(stdout, stderr),
            Some(code) => {
                let error = ExecError::ExitStatus {
                    code,
                    stderr: stderr.clone(),
                };
                Self::failed(error, code, stdout, stderr)
            }
            None => Self::failed(ExecError::Signaled, -1, stdout, stderr),
        }
    }
}

// ============================================================================
// Executor Trait
// ============================================================================

/// Runs a command line to completion.
///
/// Implementations must deliver stdout chunks to `progress` in arrival order
/// and before returning, and must not let the child outlive the call.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        line: &CommandLine,
        timeout: Duration,
        progress: Option<ProgressCallback>,
    ) -> CommandOutcome;
}

/// [`Executor`] backed by real operating-system processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(
        &self,
        line: &CommandLine,
        timeout: Duration,
        progress: Option<ProgressCallback>,
    ) -> CommandOutcome {
        let started = Instant::now();
        let outcome = run_child(line, timeout, progress.as_deref()).await;
        let elapsed = started.elapsed();

        if elapsed > SLOW_COMMAND_THRESHOLD {
            warn!(
                command = %line,
                elapsed_ms = elapsed.as_millis() as u64,
                success = outcome.success,
                "Slow bridge command"
            );
        } else {
            debug!(
                command = %line,
                elapsed_ms = elapsed.as_millis() as u64,
                success = outcome.success,
                "Executed command"
            );
        }

        outcome
    }
}

/// Suppresses the console window Windows would open for each child.
trait NoWindowExt {
    fn no_window(&mut self) -> &mut Self;
}

impl NoWindowExt for Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            self.creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

async fn run_child(
    line: &CommandLine,
    timeout: Duration,
    progress: Option<&(dyn Fn(&str) + Send + Sync)>,
) -> CommandOutcome {
    let mut command = Command::new(&line.program);
    command
        .args(&line.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .no_window();

    let spawn_error = |reason: String| ExecError::Spawn {
        program: line.program.display().to_string(),
        reason,
    };

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return CommandOutcome::failed(spawn_error(e.to_string()), -1, "", ""),
    };

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let _ = child.kill().await;
        return CommandOutcome::failed(
            spawn_error("standard streams were not captured".to_string()),
            -1,
            "",
            "",
        );
    };

    let mut out = Utf8Stream::default();
    let mut err = Vec::new();
    let collected = tokio::time::timeout(
        timeout,
        collect(&mut child, stdout, stderr, &mut out, &mut err, progress),
    )
    .await;

    let result = match collected {
        Ok(result) => result,
        Err(_) => {
            // Kill and reap; the pipes were dropped with the collect future
            let _ = child.kill().await;
            Err(ExecError::Timeout(timeout))
        }
    };

    if let Some(rest) = out.finish() {
        if let Some(callback) = progress {
            callback(&rest);
        }
    }
    let stdout = out.into_text();
    let stderr = String::from_utf8_lossy(&err).into_owned();

    match result {
        Ok(status) => CommandOutcome::from_exit(status, stdout, stderr),
        Err(error) => {
            if !matches!(error, ExecError::Timeout(_)) {
                let _ = child.kill().await;
            }
            CommandOutcome::failed(error, -1, stdout, stderr)
        }
    }
}

/// Drains both pipes until EOF, then waits for the child to exit.
async fn collect(
    child: &mut Child,
    mut stdout: ChildStdout,
    mut stderr: ChildStderr,
    out: &mut Utf8Stream,
    err: &mut Vec<u8>,
    progress: Option<&(dyn Fn(&str) + Send + Sync)>,
) -> Result<ExitStatus, ExecError> {
    let mut out_chunk = [0u8; READ_CHUNK_SIZE];
    let mut err_chunk = [0u8; READ_CHUNK_SIZE];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_chunk), if out_open => {
                let n = read.map_err(|e| ExecError::Io(e.to_string()))?;
                if n == 0 {
                    out_open = false;
                } else if let Some(text) = out.push(out_chunk.get(..n).unwrap_or_default()) {
                    if let Some(callback) = progress {
                        callback(&text);
                    }
                }
            }
            read = stderr.read(&mut err_chunk), if err_open => {
                let n = read.map_err(|e| ExecError::Io(e.to_string()))?;
                if n == 0 {
                    err_open = false;
                } else {
                    err.extend_from_slice(err_chunk.get(..n).unwrap_or_default());
                }
            }
        }
    }

    child
        .wait()
        .await
        .map_err(|e| ExecError::Io(e.to_string()))
}

// ============================================================================
// Incremental UTF-8 decoding
// ============================================================================

/// Decodes a byte stream into text chunk by chunk.
///
/// A multi-byte sequence split across reads is held back until the rest
/// arrives, so the concatenation of returned chunks always equals the
/// accumulated text.
#[derive(Debug, Default)]
struct Utf8Stream {
    text: String,
    pending: Vec<u8>,
}

impl Utf8Stream {
    /// Feeds bytes and returns the newly decoded text, if any.
    fn push(&mut self, bytes: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(bytes);

        let mut decoded = String::new();
        let mut consumed = 0;
        loop {
            let rest = self.pending.get(consumed..).unwrap_or_default();
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    decoded.push_str(valid);
                    consumed = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = rest.get(..e.valid_up_to()).unwrap_or_default();
                    decoded.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            decoded.push(char::REPLACEMENT_CHARACTER);
                            consumed += e.valid_up_to() + bad;
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more
                            consumed += e.valid_up_to();
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);

        self.emit(decoded)
    }

    /// Flushes any held-back bytes at end of stream.
    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        self.emit(rest)
    }

    fn emit(&mut self, decoded: String) -> Option<String> {
        if decoded.is_empty() {
            None
        } else {
            self.text.push_str(&decoded);
            Some(decoded)
        }
    }

    fn into_text(self) -> String {
        self.text
    }
}
