//! Scripted [`Executor`] for driving the runner without a real bridge.
//!
//! Available to this crate's tests and, through the `testing` feature, to
//! dependent crates' tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::executor::{CommandLine, CommandOutcome, Executor, ProgressCallback};
use crate::ExecError;

/// Canned answer for one invocation.
#[derive(Debug, Clone)]
pub struct Reply {
    outcome: CommandOutcome,
    delay: Duration,
}

impl Reply {
    /// Exit status 0 with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::from_outcome(CommandOutcome::succeeded(stdout, ""))
    }

    /// Non-zero exit with the given stderr.
    pub fn fail(code: i32, stderr: impl Into<String>) -> Self {
        let stderr = stderr.into();
        let error = ExecError::ExitStatus {
            code,
            stderr: stderr.clone(),
        };
        Self::from_outcome(CommandOutcome::failed(error, code, "", stderr))
    }

    /// The program could not be started.
    pub fn spawn_failure() -> Self {
        let error = ExecError::Spawn {
            program: "adb".to_string(),
            reason: "No such file or directory".to_string(),
        };
        Self::from_outcome(CommandOutcome::failed(error, -1, "", ""))
    }

    /// The program was killed for exceeding its time limit.
    pub fn timeout() -> Self {
        Self::from_outcome(timed_out(Duration::from_secs(30)))
    }

    pub fn from_outcome(outcome: CommandOutcome) -> Self {
        Self {
            outcome,
            delay: Duration::ZERO,
        }
    }

    /// Delays the reply, simulating a slow command.
    ///
    /// A delay longer than the command's timeout yields a timeout failure
    /// once the timeout elapses.
    #[must_use]
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

fn timed_out(limit: Duration) -> CommandOutcome {
    CommandOutcome::failed(ExecError::Timeout(limit), -1, "", "")
}

type Handler = dyn Fn(&[String]) -> Reply + Send + Sync;

/// [`Executor`] answering each invocation from a closure over its arguments.
///
/// The program path is ignored; handlers see only the argument vector
/// (e.g. `["-s", "deviceA", "shell", "getprop ro.product.model"]`). Every
/// invocation is recorded in order.
pub struct ScriptedExecutor {
    handler: Box<Handler>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&[String]) -> Reply + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Convenience for wrapping in an `Arc` ready for a runner.
    pub fn shared<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&[String]) -> Reply + Send + Sync + 'static,
    {
        Arc::new(Self::new(handler))
    }

    /// Argument vectors of all invocations so far.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Invocations whose arguments contain `needle` as a whole argument.
    pub fn calls_with(&self, needle: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|args| args.iter().any(|a| a == needle))
            .collect()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(
        &self,
        line: &CommandLine,
        timeout: Duration,
        progress: Option<ProgressCallback>,
    ) -> CommandOutcome {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line.args.clone());
        }

        let reply = (self.handler)(&line.args);
        if reply.delay > timeout {
            tokio::time::sleep(timeout).await;
            return timed_out(timeout);
        }
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }

        if let Some(callback) = progress {
            if !reply.outcome.stdout.is_empty() {
                callback(&reply.outcome.stdout);
            }
        }
        reply.outcome
    }
}
