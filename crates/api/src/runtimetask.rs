//! Runtime tasks: one task group instance bound to a single node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::CommandDescriptor;
use crate::meta::{Labels, Object, ObjectKind, ObjectMeta};
use crate::phase::{Phase, PhaseInputs};
use crate::status_error::{RuntimeTaskError, RuntimeTaskErrorReason};

/// One-shot strategy for getting past a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMode {
    /// Run the failed command again.
    #[serde(alias = "RetryFailedCommand")]
    Retry,
    /// Consider the failed command done and move on.
    #[serde(alias = "SkipFailedCommand")]
    Skip,
}

/// Desired state of a runtime task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeTaskSpec {
    /// Node the task is bound to.
    #[serde(default)]
    pub node_name: String,
    /// Cleared by the state machine once applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_mode: Option<RecoveryMode>,
    #[serde(default)]
    pub commands: Vec<CommandDescriptor>,
}

impl RuntimeTaskSpec {
    /// Spec running the given commands.
    pub fn with_commands(commands: Vec<CommandDescriptor>) -> Self {
        Self {
            commands,
            ..Self::default()
        }
    }

    /// Number of commands, as used by the 1-based command index.
    pub fn command_count(&self) -> u32 {
        u32::try_from(self.commands.len()).unwrap_or(u32::MAX)
    }

    /// Command at a 1-based index.
    pub fn command(&self, index: u32) -> Option<&CommandDescriptor> {
        let zero_based = usize::try_from(index.checked_sub(1)?).ok()?;
        self.commands.get(zero_based)
    }
}

/// Observed state of a runtime task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeTaskStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// 1-based index of the next command to run; 0 before start.
    #[serde(default)]
    pub current_command: u32,
    /// `"i/n"`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command_progress: String,
    #[serde(default)]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    /// Reporting copy of the derived phase.
    #[serde(default)]
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<RuntimeTaskErrorReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RuntimeTaskStatus {
    /// Mark the task started at the first command.
    pub fn set_start_time(&mut self, now: DateTime<Utc>, total: u32) {
        self.start_time = Some(now);
        self.set_current_command(1, total);
    }

    /// Point at a command and refresh the progress string.
    pub fn set_current_command(&mut self, index: u32, total: u32) {
        self.current_command = index;
        self.command_progress = format!("{index}/{total}");
    }

    /// Move past the current command.
    ///
    /// Returns `false` when there is no next command; the index is left alone
    /// in that case so the caller can complete the task.
    pub fn advance(&mut self, total: u32) -> bool {
        let next = self.current_command.saturating_add(1);
        if next > total {
            return false;
        }
        self.set_current_command(next, total);
        true
    }

    /// Mark the task completed. Clears the pause flag and any error.
    pub fn set_completion_time(&mut self, now: DateTime<Utc>) {
        self.completion_time = Some(now);
        self.paused = false;
        self.reset_error();
    }

    /// Record a failure.
    pub fn set_error(&mut self, error: &RuntimeTaskError) {
        self.error_reason = Some(error.reason);
        self.error_message = Some(error.message.clone());
    }

    pub fn reset_error(&mut self) {
        self.error_reason = None;
        self.error_message = None;
    }

    pub const fn has_error(&self) -> bool {
        self.error_message.is_some()
    }
}

/// Labels and spec used to stamp out runtime tasks for a task group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeTaskTemplate {
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(default)]
    pub spec: RuntimeTaskSpec,
}

/// A task group instance bound to one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeTask {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: RuntimeTaskSpec,
    #[serde(default)]
    pub status: RuntimeTaskStatus,
}

impl RuntimeTask {
    /// Derive the phase from the status fields.
    pub const fn derive_phase(&self) -> Phase {
        PhaseInputs {
            deleted: self.metadata.is_deleted(),
            failed: self.status.has_error(),
            completed: self.status.completion_time.is_some(),
            paused: self.status.paused,
            started: self.status.start_time.is_some(),
        }
        .derive()
    }
}

impl Object for RuntimeTask {
    const KIND: ObjectKind = ObjectKind::RuntimeTask;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_passes() -> RuntimeTaskSpec {
        RuntimeTaskSpec::with_commands(vec![CommandDescriptor::Pass; 3])
    }

    #[test]
    fn test_command_lookup_is_one_based() {
        let spec = three_passes();
        assert!(spec.command(0).is_none());
        assert_eq!(spec.command(1), Some(&CommandDescriptor::Pass));
        assert_eq!(spec.command(3), Some(&CommandDescriptor::Pass));
        assert!(spec.command(4).is_none());
    }

    #[test]
    fn test_start_and_advance() {
        let mut status = RuntimeTaskStatus::default();
        status.set_start_time(Utc::now(), 2);
        assert_eq!(status.current_command, 1);
        assert_eq!(status.command_progress, "1/2");

        assert!(status.advance(2));
        assert_eq!(status.command_progress, "2/2");
        assert!(!status.advance(2));
        assert_eq!(status.current_command, 2);
    }

    #[test]
    fn test_completion_clears_pause_and_error() {
        let mut status = RuntimeTaskStatus {
            paused: true,
            ..RuntimeTaskStatus::default()
        };
        status.set_error(&RuntimeTaskError::execution("boom"));
        assert!(status.has_error());

        status.set_completion_time(Utc::now());
        assert!(!status.paused);
        assert!(!status.has_error());
        assert!(status.error_reason.is_none());
    }

    #[test]
    fn test_derive_phase() {
        let mut task = RuntimeTask {
            spec: three_passes(),
            ..RuntimeTask::default()
        };
        assert_eq!(task.derive_phase(), Phase::Pending);

        task.status.set_start_time(Utc::now(), 3);
        assert_eq!(task.derive_phase(), Phase::Running);

        task.status.paused = true;
        assert_eq!(task.derive_phase(), Phase::Paused);

        task.status.set_error(&RuntimeTaskError::execution("boom"));
        assert_eq!(task.derive_phase(), Phase::Failed);

        task.metadata.deletion_timestamp = Some(Utc::now());
        assert_eq!(task.derive_phase(), Phase::Deleted);
    }

    #[test]
    fn test_recovery_mode_accepts_long_names() -> Result<(), serde_json::Error> {
        let short: RecoveryMode = serde_json::from_str(r#""skip""#)?;
        let long: RecoveryMode = serde_json::from_str(r#""RetryFailedCommand""#)?;
        assert_eq!(short, RecoveryMode::Skip);
        assert_eq!(long, RecoveryMode::Retry);
        Ok(())
    }
}
