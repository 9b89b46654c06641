//! Error conditions written into object status.
//!
//! `reason` is a short machine-readable constant, `message` is for humans.
//! Both are set together and cleared together.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Runtime task failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeTaskErrorReason {
    /// A command reported failure.
    ExecutionError,
    /// `currentCommand` points outside the command list.
    IndexOutOfRange,
}

/// Task group failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskGroupErrorReason {
    /// At least one runtime task failed.
    FailedNodes,
    /// Unexpected tasks exist (orphans, or more than one task per node).
    InvalidState,
}

/// Operation failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationErrorReason {
    /// At least one task group failed.
    FailedReplicas,
    /// Task groups exist that the current plan does not contain.
    InvalidState,
}

/// A status error: a reason constant plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StatusError<R: fmt::Debug> {
    pub reason: R,
    pub message: String,
}

impl<R: fmt::Debug> StatusError<R> {
    /// Create a status error.
    pub fn new(reason: R, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

pub type RuntimeTaskError = StatusError<RuntimeTaskErrorReason>;
pub type TaskGroupError = StatusError<TaskGroupErrorReason>;
pub type OperationError = StatusError<OperationErrorReason>;

impl RuntimeTaskError {
    /// A command failed while executing.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(RuntimeTaskErrorReason::ExecutionError, message)
    }

    /// The current command index does not exist.
    pub fn index_out_of_range(message: impl Into<String>) -> Self {
        Self::new(RuntimeTaskErrorReason::IndexOutOfRange, message)
    }
}

impl TaskGroupError {
    /// Some runtime tasks failed.
    pub fn failed_nodes(message: impl Into<String>) -> Self {
        Self::new(TaskGroupErrorReason::FailedNodes, message)
    }

    /// Unexpected runtime tasks exist.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(TaskGroupErrorReason::InvalidState, message)
    }
}

impl OperationError {
    /// Some task groups failed.
    pub fn failed_replicas(message: impl Into<String>) -> Self {
        Self::new(OperationErrorReason::FailedReplicas, message)
    }

    /// Unexpected task groups exist.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(OperationErrorReason::InvalidState, message)
    }
}
