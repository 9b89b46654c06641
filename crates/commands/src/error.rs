//! Errors reported by command dispatch.

use thiserror::Error;

/// Result type alias for command dispatch.
pub type Result<T> = std::result::Result<T, CommandError>;

/// A command did not succeed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The command is defined to fail.
    #[error("command {command} failed: {reason}")]
    Failed { command: String, reason: String },

    /// The process could not be started.
    #[error("failed to start {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    /// The process exited unsuccessfully.
    #[error("{program} exited with {}: {stderr}", .code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")))]
    ExecutionFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The process ran past the configured timeout.
    #[error("{program} timed out after {seconds}s")]
    TimedOut { program: String, seconds: u64 },
}

impl CommandError {
    pub fn failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    pub fn spawn_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            reason: reason.into(),
        }
    }
}
