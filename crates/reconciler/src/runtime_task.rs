//! Runtime task state machine.
//!
//! One pass runs, in order, the pause override, recovery and the normal
//! path, stopping after the first of them that changes the task. The phase
//! is re-derived at the end of every pass.

use std::sync::Arc;
use std::time::Duration;

use operator_api::{
    ExecutionMode, Object, RecoveryMode, RuntimeTask, RuntimeTaskError,
};
use operator_commands::CommandDispatcher;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::recorder::{EventRecorder, ObjectEvent};

/// What the operation above a task asks of it.
///
/// `operation_paused` is authoritative: the pause a task sets on itself
/// after a command under [`ExecutionMode::Controlled`] is lifted by the
/// next pass unless the operation is paused too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskContext {
    pub execution_mode: ExecutionMode,
    pub operation_paused: bool,
}

/// What a pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The deletion marker is set; nothing runs.
    Deleted,
    /// The pause flag was aligned with the operation.
    PauseChanged { paused: bool },
    /// A recovery mode was applied and cleared.
    Recovered(RecoveryMode),
    /// The start time was set; no command ran.
    Started,
    /// The current command succeeded.
    CommandSucceeded { command: u32, completed: bool },
    /// The current command failed.
    CommandFailed { command: u32 },
    /// The command index points outside the command list.
    IndexOutOfRange { command: u32 },
    /// Paused, failed without recovery mode, or already completed.
    Idle,
}

/// Drives one runtime task forward.
#[derive(Clone)]
pub struct RuntimeTaskMachine {
    dispatcher: Arc<dyn CommandDispatcher>,
    clock: Arc<dyn Clock>,
    recorder: Arc<dyn EventRecorder>,
    dry_run_delay: Duration,
}

impl RuntimeTaskMachine {
    pub fn new(
        dispatcher: Arc<dyn CommandDispatcher>,
        clock: Arc<dyn Clock>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            dispatcher,
            clock,
            recorder,
            dry_run_delay: Duration::from_secs(3),
        }
    }

    /// Delay standing in for a command under dry run.
    #[must_use]
    pub const fn with_dry_run_delay(mut self, delay: Duration) -> Self {
        self.dry_run_delay = delay;
        self
    }

    /// Run one pass over `task`.
    pub async fn reconcile(&self, task: &mut RuntimeTask, context: TaskContext) -> StepOutcome {
        let outcome = self.step(task, context).await;
        task.status.phase = task.derive_phase();
        outcome
    }

    async fn step(&self, task: &mut RuntimeTask, context: TaskContext) -> StepOutcome {
        if task.metadata.is_deleted() {
            return StepOutcome::Deleted;
        }
        if task.status.completion_time.is_some() {
            return StepOutcome::Idle;
        }
        if let Some(outcome) = self.reconcile_pause_override(task, context.operation_paused) {
            return outcome;
        }
        if let Some(outcome) = self.reconcile_recovery(task, context.execution_mode) {
            return outcome;
        }
        self.reconcile_normal(task, context.execution_mode).await
    }

    fn reconcile_pause_override(&self, task: &mut RuntimeTask, paused: bool) -> Option<StepOutcome> {
        let event =
            ObjectEvent::pause_change(&*task, task.status.paused, paused, "by top level objects")?;
        info!(task = %task.name(), paused, "Pause override");
        self.recorder.record(event);
        task.status.paused = paused;
        Some(StepOutcome::PauseChanged { paused })
    }

    fn reconcile_recovery(&self, task: &mut RuntimeTask, mode: ExecutionMode) -> Option<StepOutcome> {
        if !task.status.has_error() {
            return None;
        }
        let recovery = task.spec.recovery_mode?;
        let command = task.status.current_command;

        match recovery {
            RecoveryMode::Retry => {
                info!(task = %task.name(), command, "Retrying command after failure");
                self.recorder.record(ObjectEvent::normal(
                    &*task,
                    "TaskErrorRetry",
                    format!("Retrying command {command} after failure"),
                ));
            }
            RecoveryMode::Skip => {
                info!(task = %task.name(), command, "Skipping command after failure");
                self.recorder.record(ObjectEvent::normal(
                    &*task,
                    "TaskErrorSkip",
                    format!("Skipping command {command} after failure"),
                ));
                let total = task.spec.command_count();
                if task.status.advance(total) {
                    if mode == ExecutionMode::Controlled {
                        task.status.paused = true;
                    }
                } else {
                    task.status.set_completion_time(self.clock.now());
                }
            }
        }

        task.status.reset_error();
        task.spec.recovery_mode = None;
        Some(StepOutcome::Recovered(recovery))
    }

    async fn reconcile_normal(&self, task: &mut RuntimeTask, mode: ExecutionMode) -> StepOutcome {
        if task.status.paused || task.status.has_error() {
            return StepOutcome::Idle;
        }

        let total = task.spec.command_count();
        if task.status.start_time.is_none() {
            debug!(task = %task.name(), commands = total, "Starting task");
            task.status.set_start_time(self.clock.now(), total);
            return StepOutcome::Started;
        }

        let index = task.status.current_command;
        if mode == ExecutionMode::DryRun {
            info!(task = %task.name(), command = index, "Dry run, not dispatching");
            tokio::time::sleep(self.dry_run_delay).await;
        } else {
            let Some(command) = task.spec.command(index).cloned() else {
                let error = RuntimeTaskError::index_out_of_range(format!(
                    "command with index {index} does not exist for task {}",
                    task.name()
                ));
                warn!(task = %task.name(), command = index, "{error}");
                self.recorder
                    .record(ObjectEvent::warning(&*task, "CommandError", error.message.clone()));
                task.status.set_error(&error);
                return StepOutcome::IndexOutOfRange { command: index };
            };

            info!(task = %task.name(), command = index, kind = %command, "Running command");
            if let Err(e) = self
                .dispatcher
                .dispatch(&command, &task.spec.node_name)
                .await
            {
                warn!(task = %task.name(), command = index, error = %e, "Command failed");
                self.recorder.record(ObjectEvent::warning(
                    &*task,
                    "CommandError",
                    format!("Command {index} execution failed: {e}"),
                ));
                task.status.set_error(&RuntimeTaskError::execution(format!(
                    "error executing command number {index} for task {}: {e}",
                    task.name()
                )));
                return StepOutcome::CommandFailed { command: index };
            }
            info!(task = %task.name(), command = index, "Command completed");
        }

        self.recorder.record(ObjectEvent::normal(
            &*task,
            "CommandCompleted",
            format!("Command {index} execution completed"),
        ));

        let completed = !task.status.advance(total);
        if completed {
            task.status.set_completion_time(self.clock.now());
        } else if mode == ExecutionMode::Controlled {
            task.status.paused = true;
        }
        StepOutcome::CommandSucceeded {
            command: index,
            completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use operator_api::{CommandDescriptor, Phase, RuntimeTaskErrorReason, RuntimeTaskSpec};
    use operator_commands::{CommandError, HostCommandDispatcher};

    use super::*;
    use crate::clock::ManualClock;
    use crate::recorder::InMemoryEventRecorder;

    /// Remembers what it was asked to run and delegates to the host dispatcher.
    #[derive(Default)]
    struct RecordingDispatcher {
        calls: Mutex<Vec<CommandDescriptor>>,
        host: HostCommandDispatcher,
    }

    impl RecordingDispatcher {
        fn calls(&self) -> usize {
            self.calls.lock().map_or(0, |c| c.len())
        }
    }

    #[async_trait]
    impl CommandDispatcher for RecordingDispatcher {
        async fn dispatch(
            &self,
            command: &CommandDescriptor,
            node: &str,
        ) -> Result<(), CommandError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(command.clone());
            }
            self.host.dispatch(command, node).await
        }
    }

    struct Fixture {
        machine: RuntimeTaskMachine,
        dispatcher: Arc<RecordingDispatcher>,
        recorder: Arc<InMemoryEventRecorder>,
    }

    fn fixture() -> Fixture {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let recorder = Arc::new(InMemoryEventRecorder::new());
        let machine = RuntimeTaskMachine::new(
            dispatcher.clone(),
            Arc::new(ManualClock::default()),
            recorder.clone(),
        )
        .with_dry_run_delay(Duration::from_millis(1));
        Fixture {
            machine,
            dispatcher,
            recorder,
        }
    }

    fn task(commands: Vec<CommandDescriptor>) -> RuntimeTask {
        let mut task = RuntimeTask {
            spec: RuntimeTaskSpec::with_commands(commands),
            ..RuntimeTask::default()
        };
        task.metadata.name = "op-01-g-n1".to_string();
        task.spec.node_name = "n1".to_string();
        task
    }

    const AUTO: TaskContext = TaskContext {
        execution_mode: ExecutionMode::Auto,
        operation_paused: false,
    };

    #[tokio::test]
    async fn test_first_pass_only_starts() {
        let f = fixture();
        let mut t = task(vec![CommandDescriptor::Pass, CommandDescriptor::Pass]);

        let outcome = f.machine.reconcile(&mut t, AUTO).await;

        assert_eq!(outcome, StepOutcome::Started);
        assert_eq!(t.status.current_command, 1);
        assert_eq!(t.status.command_progress, "1/2");
        assert_eq!(t.status.phase, Phase::Running);
        assert_eq!(f.dispatcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_runs_to_completion() {
        let f = fixture();
        let mut t = task(vec![CommandDescriptor::Pass, CommandDescriptor::Pass]);

        f.machine.reconcile(&mut t, AUTO).await;
        let first = f.machine.reconcile(&mut t, AUTO).await;
        assert_eq!(
            first,
            StepOutcome::CommandSucceeded {
                command: 1,
                completed: false
            }
        );
        assert_eq!(t.status.command_progress, "2/2");

        let last = f.machine.reconcile(&mut t, AUTO).await;
        assert_eq!(
            last,
            StepOutcome::CommandSucceeded {
                command: 2,
                completed: true
            }
        );
        assert!(t.status.completion_time.is_some());
        assert_eq!(t.status.phase, Phase::Succeeded);
        assert_eq!(f.dispatcher.calls(), 2);

        assert_eq!(f.machine.reconcile(&mut t, AUTO).await, StepOutcome::Idle);
        assert_eq!(f.dispatcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_the_command_and_waits() {
        let f = fixture();
        let mut t = task(vec![CommandDescriptor::Pass, CommandDescriptor::Fail]);

        f.machine.reconcile(&mut t, AUTO).await;
        f.machine.reconcile(&mut t, AUTO).await;
        let outcome = f.machine.reconcile(&mut t, AUTO).await;

        assert_eq!(outcome, StepOutcome::CommandFailed { command: 2 });
        assert_eq!(t.status.current_command, 2);
        assert_eq!(t.status.error_reason, Some(RuntimeTaskErrorReason::ExecutionError));
        assert_eq!(t.status.phase, Phase::Failed);
        assert_eq!(f.recorder.reasons_for("op-01-g-n1").last().map(String::as_str), Some("CommandError"));

        // no recovery mode: the failed command is not run again
        assert_eq!(f.machine.reconcile(&mut t, AUTO).await, StepOutcome::Idle);
        assert_eq!(f.dispatcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_retry_clears_error_and_keeps_index() {
        let f = fixture();
        let mut t = task(vec![CommandDescriptor::Fail, CommandDescriptor::Pass]);
        f.machine.reconcile(&mut t, AUTO).await;
        f.machine.reconcile(&mut t, AUTO).await;
        assert!(t.status.has_error());

        t.spec.recovery_mode = Some(RecoveryMode::Retry);
        let outcome = f.machine.reconcile(&mut t, AUTO).await;

        assert_eq!(outcome, StepOutcome::Recovered(RecoveryMode::Retry));
        assert!(!t.status.has_error());
        assert_eq!(t.status.current_command, 1);
        assert!(t.spec.recovery_mode.is_none());
        assert_eq!(t.status.phase, Phase::Running);
        assert_eq!(f.dispatcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_skip_advances_or_completes() {
        let f = fixture();
        let mut t = task(vec![CommandDescriptor::Fail, CommandDescriptor::Fail]);
        f.machine.reconcile(&mut t, AUTO).await;
        f.machine.reconcile(&mut t, AUTO).await;

        t.spec.recovery_mode = Some(RecoveryMode::Skip);
        assert_eq!(
            f.machine.reconcile(&mut t, AUTO).await,
            StepOutcome::Recovered(RecoveryMode::Skip)
        );
        assert_eq!(t.status.current_command, 2);
        assert_eq!(t.status.command_progress, "2/2");
        assert!(t.status.completion_time.is_none());

        f.machine.reconcile(&mut t, AUTO).await;
        assert!(t.status.has_error());
        t.spec.recovery_mode = Some(RecoveryMode::Skip);
        f.machine.reconcile(&mut t, AUTO).await;

        assert!(t.status.completion_time.is_some());
        assert_eq!(t.status.phase, Phase::Succeeded);
        let reasons = f.recorder.reasons_for("op-01-g-n1");
        assert_eq!(reasons.iter().filter(|r| *r == "TaskErrorSkip").count(), 2);
    }

    #[tokio::test]
    async fn test_pause_override_short_circuits() {
        let f = fixture();
        let mut t = task(vec![CommandDescriptor::Pass]);
        f.machine.reconcile(&mut t, AUTO).await;

        let paused = TaskContext {
            operation_paused: true,
            ..AUTO
        };
        assert_eq!(
            f.machine.reconcile(&mut t, paused).await,
            StepOutcome::PauseChanged { paused: true }
        );
        assert_eq!(t.status.phase, Phase::Paused);
        assert_eq!(f.machine.reconcile(&mut t, paused).await, StepOutcome::Idle);

        assert_eq!(
            f.machine.reconcile(&mut t, AUTO).await,
            StepOutcome::PauseChanged { paused: false }
        );
        assert_eq!(f.dispatcher.calls(), 0);
        assert_eq!(
            f.recorder.reasons_for("op-01-g-n1"),
            vec!["RuntimeTaskPaused", "RuntimeTaskRestarted"]
        );
    }

    #[tokio::test]
    async fn test_controlled_mode_pauses_after_each_command() {
        let f = fixture();
        let controlled = TaskContext {
            execution_mode: ExecutionMode::Controlled,
            operation_paused: false,
        };
        let mut t = task(vec![CommandDescriptor::Pass, CommandDescriptor::Pass]);
        f.machine.reconcile(&mut t, controlled).await;
        f.machine.reconcile(&mut t, controlled).await;

        assert!(t.status.paused);
        assert_eq!(t.status.phase, Phase::Paused);
        assert_eq!(t.status.current_command, 2);
    }

    #[tokio::test]
    async fn test_controlled_skip_pauses_unless_it_completes() {
        let f = fixture();
        let controlled = TaskContext {
            execution_mode: ExecutionMode::Controlled,
            operation_paused: false,
        };
        let mut t = task(vec![CommandDescriptor::Fail, CommandDescriptor::Fail]);
        f.machine.reconcile(&mut t, controlled).await;
        f.machine.reconcile(&mut t, controlled).await;
        assert!(t.status.has_error());

        t.spec.recovery_mode = Some(RecoveryMode::Skip);
        assert_eq!(
            f.machine.reconcile(&mut t, controlled).await,
            StepOutcome::Recovered(RecoveryMode::Skip)
        );
        assert!(t.status.paused);
        assert_eq!(t.status.current_command, 2);
        assert_eq!(t.status.phase, Phase::Paused);

        // the operation is not paused, so the next pass lifts the self-pause
        assert_eq!(
            f.machine.reconcile(&mut t, controlled).await,
            StepOutcome::PauseChanged { paused: false }
        );
        assert_eq!(
            f.machine.reconcile(&mut t, controlled).await,
            StepOutcome::CommandFailed { command: 2 }
        );

        t.spec.recovery_mode = Some(RecoveryMode::Skip);
        f.machine.reconcile(&mut t, controlled).await;

        assert!(!t.status.paused);
        assert!(t.status.completion_time.is_some());
        assert_eq!(t.status.phase, Phase::Succeeded);
        assert_eq!(f.dispatcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_does_not_dispatch() {
        let f = fixture();
        let dry_run = TaskContext {
            execution_mode: ExecutionMode::DryRun,
            operation_paused: false,
        };
        let mut t = task(vec![CommandDescriptor::Fail]);
        f.machine.reconcile(&mut t, dry_run).await;
        f.machine.reconcile(&mut t, dry_run).await;

        assert!(t.status.completion_time.is_some());
        assert_eq!(f.dispatcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_bad_index_is_an_error() {
        let f = fixture();
        let mut t = task(vec![CommandDescriptor::Pass]);
        f.machine.reconcile(&mut t, AUTO).await;
        t.status.current_command = 5;

        let outcome = f.machine.reconcile(&mut t, AUTO).await;

        assert_eq!(outcome, StepOutcome::IndexOutOfRange { command: 5 });
        assert_eq!(t.status.error_reason, Some(RuntimeTaskErrorReason::IndexOutOfRange));
        assert_eq!(f.dispatcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_deleted_task_runs_nothing() {
        let f = fixture();
        let mut t = task(vec![CommandDescriptor::Pass]);
        t.metadata.deletion_timestamp = Some(chrono::Utc::now());

        assert_eq!(f.machine.reconcile(&mut t, AUTO).await, StepOutcome::Deleted);
        assert_eq!(t.status.phase, Phase::Deleted);
        assert!(t.status.start_time.is_none());
    }
}
