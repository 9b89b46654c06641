use async_trait::async_trait;
use operator_api::{LabelSelector, Object, ObjectKind, RuntimeTask, OPERATION_NAME_LABEL};
use operator_store::WatchEvent;
use tracing::debug;

use super::{get_optional, write_if_changed, Controller, ControllerContext};
use crate::error::{Error, Result};
use crate::runtime_task::{RuntimeTaskMachine, TaskContext};

/// Agent for one node: runs the runtime tasks of one operation bound to it.
pub struct RuntimeTaskController {
    ctx: ControllerContext,
    machine: RuntimeTaskMachine,
    node_name: String,
    operation_name: String,
}

impl RuntimeTaskController {
    pub fn new(
        ctx: ControllerContext,
        machine: RuntimeTaskMachine,
        node_name: impl Into<String>,
        operation_name: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            machine,
            node_name: node_name.into(),
            operation_name: operation_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    fn selector(&self) -> LabelSelector {
        LabelSelector::default().with_label(OPERATION_NAME_LABEL, self.operation_name.as_str())
    }

    /// Execution mode and pause state handed down from the owning operation.
    async fn task_context(&self, task: &RuntimeTask) -> Result<Option<TaskContext>> {
        let group_ref = task.metadata.owner(ObjectKind::RuntimeTaskGroup).ok_or_else(|| {
            Error::missing_owner(ObjectKind::RuntimeTask, task.name(), ObjectKind::RuntimeTaskGroup)
        })?;
        let Some(group) = get_optional(self.ctx.store.task_groups().as_ref(), &group_ref.name).await?
        else {
            return Ok(None);
        };
        let operation_ref = group.metadata.owner(ObjectKind::Operation).ok_or_else(|| {
            Error::missing_owner(ObjectKind::RuntimeTaskGroup, group.name(), ObjectKind::Operation)
        })?;
        let operation =
            get_optional(self.ctx.store.operations().as_ref(), &operation_ref.name).await?;
        Ok(operation.map(|op| TaskContext {
            execution_mode: op.spec.execution_mode,
            operation_paused: op.status.paused,
        }))
    }
}

#[async_trait]
impl Controller for RuntimeTaskController {
    fn name(&self) -> &'static str {
        "agent"
    }

    fn watches(&self) -> Vec<ObjectKind> {
        vec![
            ObjectKind::Operation,
            ObjectKind::RuntimeTaskGroup,
            ObjectKind::RuntimeTask,
        ]
    }

    async fn keys_for(&self, event: &WatchEvent) -> Result<Vec<String>> {
        match event.kind {
            ObjectKind::RuntimeTask => Ok(vec![event.name.clone()]),
            _ => self.resync_keys().await,
        }
    }

    async fn resync_keys(&self) -> Result<Vec<String>> {
        let tasks = self.ctx.store.tasks().list(&self.selector()).await?;
        Ok(tasks
            .into_iter()
            .filter(|t| t.spec.node_name == self.node_name && t.status.completion_time.is_none())
            .map(|t| t.metadata.name)
            .collect())
    }

    async fn reconcile(&self, key: &str) -> Result<()> {
        let store = self.ctx.store.tasks().as_ref();
        let Some(before) = get_optional(store, key).await? else {
            return Ok(());
        };
        if before.spec.node_name != self.node_name || before.status.completion_time.is_some() {
            return Ok(());
        }
        let Some(context) = self.task_context(&before).await? else {
            debug!(task = %key, "Owner gone, leaving task to the garbage collector");
            return Ok(());
        };

        let mut task = before.clone();
        let outcome = self.machine.reconcile(&mut task, context).await;
        debug!(task = %key, node = %self.node_name, ?outcome, "Reconciled runtime task");
        write_if_changed(store, &before, task).await?;
        Ok(())
    }
}
