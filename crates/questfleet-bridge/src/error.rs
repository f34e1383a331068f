//! Error types for process execution and bridge commands.

use std::time::Duration;
use thiserror::Error;

/// Why a single process execution did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The program could not be started (not found, permission denied,
    /// or its standard streams could not be set up).
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// The program was killed after exceeding its time limit.
    #[error("timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The program exited with a non-zero status.
    #[error("exited with status {code}{}", stderr_detail(.stderr))]
    ExitStatus { code: i32, stderr: String },

    /// The program was terminated by a signal.
    #[error("terminated by signal")]
    Signaled,

    /// Reading the program's output failed.
    #[error("I/O error: {0}")]
    Io(String),
}

fn stderr_detail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// Errors returned by [`crate::CommandRunner`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The bridge process failed.
    #[error("operation failed: {0}")]
    OperationFailed(#[from] ExecError),

    /// The argument string could not be split into words.
    #[error("malformed arguments: {0}")]
    MalformedArguments(String),

    /// Bridge output did not have the expected shape.
    #[error("could not parse {what} from bridge output: {output:?}")]
    Parse { what: &'static str, output: String },
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_failed_prefix() {
        let err = BridgeError::from(ExecError::Timeout(Duration::from_millis(1500)));
        assert_eq!(err.to_string(), "operation failed: timed out after 1.5s");
    }

    #[test]
    fn test_exit_status_with_and_without_stderr() {
        let err = ExecError::ExitStatus {
            code: 1,
            stderr: "error: device 'abc' not found\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "exited with status 1: error: device 'abc' not found"
        );

        let err = ExecError::ExitStatus {
            code: 255,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "exited with status 255");
    }

    #[test]
    fn test_spawn_display() {
        let err = BridgeError::OperationFailed(ExecError::Spawn {
            program: "/opt/adb".to_string(),
            reason: "No such file or directory".to_string(),
        });
        assert!(err.to_string().starts_with("operation failed:"));
        assert!(err.to_string().contains("/opt/adb"));
    }
}
