use async_trait::async_trait;
use operator_api::{
    LabelSelector, Object, ObjectKind, ObjectMeta, Operation, RuntimeTask, RuntimeTaskGroup,
    RuntimeTaskSpec, RuntimeTaskStatus, TaskGroupError, OPERATION_NAME_LABEL,
};
use operator_store::WatchEvent;
use tracing::{debug, info, warn};

use super::{count, get_optional, write_if_changed, Controller, ControllerContext};
use crate::error::{Error, Result};
use crate::node_selector::select_nodes;
use crate::recorder::ObjectEvent;
use crate::task_reconcile::{reconcile_tasks, TaskReconcileList};

/// Creates the runtime tasks of a task group, one node at a time.
pub struct TaskGroupController {
    ctx: ControllerContext,
}

impl TaskGroupController {
    pub const fn new(ctx: ControllerContext) -> Self {
        Self { ctx }
    }

    async fn owner_operation(&self, group: &RuntimeTaskGroup) -> Result<Option<Operation>> {
        let owner = group.metadata.owner(ObjectKind::Operation).ok_or_else(|| {
            Error::missing_owner(ObjectKind::RuntimeTaskGroup, group.name(), ObjectKind::Operation)
        })?;
        get_optional(self.ctx.store.operations().as_ref(), &owner.name).await
    }

    async fn reconcile_tasks(&self, group: &mut RuntimeTaskGroup) -> Result<()> {
        let nodes = self
            .ctx
            .store
            .nodes()
            .list(&LabelSelector::default())
            .await?;
        let selected = select_nodes(&nodes, &group.spec.node_selector, group.spec.node_filter);
        let tasks = self.ctx.store.tasks().list(&group.spec.selector).await?;
        let list = reconcile_tasks(selected, tasks);
        set_counters(group, &list);

        if list.active() > 0 {
            group.status.reset_error();
        } else if list.invalid() > 0 {
            let error = TaskGroupError::invalid_state(format!(
                "task group has {} invalid runtime tasks",
                list.invalid()
            ));
            warn!(group = %group.name(), "{error}");
            group.status.set_error(&error);
            return Ok(());
        } else if list.failed() > 0 {
            let error = TaskGroupError::failed_nodes(format!(
                "task group has {} failed runtime tasks",
                list.failed()
            ));
            warn!(group = %group.name(), "{error}");
            group.status.set_error(&error);
            return Ok(());
        }

        if group.status.start_time.is_none() {
            info!(group = %group.name(), nodes = list.all.len(), "Starting task group");
            group.status.start_time = Some(self.ctx.clock.now());
            return Ok(());
        }

        if list.completed() == list.all.len() {
            info!(group = %group.name(), "Task group completed");
            group.status.set_completion_time(self.ctx.clock.now());
            return Ok(());
        }

        if group.status.paused {
            debug!(group = %group.name(), "Task group paused, not creating runtime tasks");
            return Ok(());
        }

        if let Some(node) = list.next_to_create() {
            let task = task_for_node(group, node);
            info!(group = %group.name(), task = %task.name(), node, "Creating runtime task");
            self.ctx.store.tasks().create(task).await?;
        }
        Ok(())
    }
}

/// Runtime task stamped out of the group template for one node.
fn task_for_node(group: &RuntimeTaskGroup, node: &str) -> RuntimeTask {
    let template = &group.spec.template;
    RuntimeTask {
        metadata: ObjectMeta {
            labels: template.labels.clone(),
            ..ObjectMeta::named(format!("{}-{node}", group.name()))
        }
        .owned_by(group.owner_reference()),
        spec: RuntimeTaskSpec {
            node_name: node.to_string(),
            ..template.spec.clone()
        },
        status: RuntimeTaskStatus::default(),
    }
}

fn set_counters(group: &mut RuntimeTaskGroup, list: &TaskReconcileList) {
    let status = &mut group.status;
    status.nodes = count(list.all.len());
    status.running_nodes = count(list.running());
    status.succeeded_nodes = count(list.completed());
    status.failed_nodes = count(list.failed());
    status.invalid_nodes = count(list.invalid());
}

#[async_trait]
impl Controller for TaskGroupController {
    fn name(&self) -> &'static str {
        "taskgroup"
    }

    fn watches(&self) -> Vec<ObjectKind> {
        vec![
            ObjectKind::Operation,
            ObjectKind::RuntimeTaskGroup,
            ObjectKind::RuntimeTask,
            ObjectKind::Node,
        ]
    }

    async fn keys_for(&self, event: &WatchEvent) -> Result<Vec<String>> {
        match event.kind {
            ObjectKind::RuntimeTaskGroup => Ok(vec![event.name.clone()]),
            ObjectKind::RuntimeTask => Ok(event
                .owner(ObjectKind::RuntimeTaskGroup)
                .map(|owner| vec![owner.name.clone()])
                .unwrap_or_default()),
            ObjectKind::Operation => {
                let selector = LabelSelector::default().with_label(OPERATION_NAME_LABEL, event.name.as_str());
                let groups = self.ctx.store.task_groups().list(&selector).await?;
                Ok(groups.into_iter().map(|g| g.metadata.name).collect())
            }
            ObjectKind::Node => self.resync_keys().await,
        }
    }

    async fn resync_keys(&self) -> Result<Vec<String>> {
        let groups = self
            .ctx
            .store
            .task_groups()
            .list(&LabelSelector::default())
            .await?;
        Ok(groups.into_iter().map(|g| g.metadata.name).collect())
    }

    async fn reconcile(&self, key: &str) -> Result<()> {
        let store = self.ctx.store.task_groups().as_ref();
        let Some(before) = get_optional(store, key).await? else {
            return Ok(());
        };
        let mut group = before.clone();

        let outcome = if group.metadata.is_deleted() || group.status.completion_time.is_some() {
            Ok(())
        } else {
            match self.owner_operation(&group).await {
                Ok(Some(operation)) => {
                    let paused = operation.status.paused;
                    if let Some(event) = ObjectEvent::pause_change(
                        &group,
                        group.status.paused,
                        paused,
                        "by top level objects",
                    ) {
                        self.ctx.recorder.record(event);
                        group.status.paused = paused;
                    }
                    self.reconcile_tasks(&mut group).await
                }
                // owner already gone; the garbage collector takes it from here
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            }
        };

        group.status.phase = group.derive_phase();
        write_if_changed(store, &before, group).await?;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use operator_api::{
        CommandDescriptor, CustomSpec, Node, NodeFilter, OperationDescriptor, Phase,
        RuntimeTaskGroupSpec, RuntimeTaskTemplate, TaskGroupErrorReason,
    };
    use operator_store::Store;

    use super::*;
    use crate::clock::ManualClock;
    use crate::planner;
    use crate::recorder::InMemoryEventRecorder;

    struct Fixture {
        ctx: ControllerContext,
        recorder: Arc<InMemoryEventRecorder>,
        controller: TaskGroupController,
        group: String,
    }

    /// An operation with one planned group over three nodes, stored as the
    /// operation controller would leave it.
    async fn fixture(filter: NodeFilter) -> Result<Fixture> {
        let recorder = Arc::new(InMemoryEventRecorder::new());
        let ctx = ControllerContext::new(
            Store::in_memory(),
            Arc::new(ManualClock::default()),
            recorder.clone(),
        );
        for name in ["n1", "n2", "n3"] {
            ctx.store.nodes().create(Node::new(name)).await?;
        }

        let user_group = RuntimeTaskGroup {
            metadata: ObjectMeta::named("g"),
            spec: RuntimeTaskGroupSpec {
                node_filter: filter,
                template: RuntimeTaskTemplate {
                    spec: RuntimeTaskSpec::with_commands(vec![CommandDescriptor::Pass]),
                    ..RuntimeTaskTemplate::default()
                },
                ..RuntimeTaskGroupSpec::default()
            },
            ..RuntimeTaskGroup::default()
        };
        let mut operation = Operation::new(
            "op",
            OperationDescriptor::Custom(CustomSpec {
                workflow: vec![user_group],
            }),
        );
        operation.metadata.labels.insert(OPERATION_NAME_LABEL.to_string(), "op".to_string());
        let operation = ctx.store.operations().create(operation).await?;

        let mut group = None;
        for planned in planner::plan(&operation)? {
            group = Some(ctx.store.task_groups().create(planned).await?.metadata.name);
        }
        let group = group.unwrap_or_default();

        Ok(Fixture {
            controller: TaskGroupController::new(ctx.clone()),
            ctx,
            recorder,
            group,
        })
    }

    async fn tasks(ctx: &ControllerContext) -> Result<Vec<RuntimeTask>> {
        Ok(ctx.store.tasks().list(&LabelSelector::default()).await?)
    }

    async fn complete_all(ctx: &ControllerContext) -> Result<()> {
        for mut task in tasks(ctx).await? {
            if task.status.completion_time.is_none() {
                task.status.start_time = Some(ctx.clock.now());
                task.status.set_completion_time(ctx.clock.now());
                ctx.store.tasks().update(task).await?;
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_creates_tasks_serially() -> Result<()> {
        let f = fixture(NodeFilter::All).await?;

        f.controller.reconcile(&f.group).await?;
        assert!(tasks(&f.ctx).await?.is_empty());

        f.controller.reconcile(&f.group).await?;
        let created = tasks(&f.ctx).await?;
        assert_eq!(created.len(), 1);
        let first = created.first().map(|t| (t.metadata.name.as_str(), t.spec.node_name.as_str()));
        assert_eq!(first, Some(("op-01-g-n1", "n1")));
        assert_eq!(created.first().map(|t| t.spec.command_count()), Some(1));

        // the first task is still pending
        f.controller.reconcile(&f.group).await?;
        assert_eq!(tasks(&f.ctx).await?.len(), 1);

        complete_all(&f.ctx).await?;
        f.controller.reconcile(&f.group).await?;
        assert_eq!(tasks(&f.ctx).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_completes_after_every_node() -> Result<()> {
        let f = fixture(NodeFilter::Head).await?;
        f.controller.reconcile(&f.group).await?;
        f.controller.reconcile(&f.group).await?;
        complete_all(&f.ctx).await?;
        f.controller.reconcile(&f.group).await?;

        let group = f.ctx.store.task_groups().get(&f.group).await?;
        assert_eq!(group.status.nodes, 1);
        assert_eq!(group.status.succeeded_nodes, 1);
        assert_eq!(group.status.phase, Phase::Succeeded);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_task_fails_group() -> Result<()> {
        let f = fixture(NodeFilter::All).await?;
        f.controller.reconcile(&f.group).await?;
        f.controller.reconcile(&f.group).await?;

        for mut task in tasks(&f.ctx).await? {
            task.status.start_time = Some(f.ctx.clock.now());
            task.status.set_error(&operator_api::RuntimeTaskError::execution("boom"));
            f.ctx.store.tasks().update(task).await?;
        }
        f.controller.reconcile(&f.group).await?;

        let group = f.ctx.store.task_groups().get(&f.group).await?;
        assert_eq!(group.status.error_reason, Some(TaskGroupErrorReason::FailedNodes));
        assert_eq!(group.status.failed_nodes, 1);
        assert_eq!(group.status.phase, Phase::Failed);
        assert_eq!(tasks(&f.ctx).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_stray_task_is_invalid() -> Result<()> {
        let f = fixture(NodeFilter::Head).await?;
        f.controller.reconcile(&f.group).await?;
        let group = f.ctx.store.task_groups().get(&f.group).await?;
        f.ctx.store.tasks().create(task_for_node(&group, "gone")).await?;

        f.controller.reconcile(&f.group).await?;

        let group = f.ctx.store.task_groups().get(&f.group).await?;
        assert_eq!(group.status.invalid_nodes, 1);
        assert_eq!(group.status.error_reason, Some(TaskGroupErrorReason::InvalidState));
        Ok(())
    }

    #[tokio::test]
    async fn test_operation_pause_stops_creation() -> Result<()> {
        let f = fixture(NodeFilter::All).await?;
        let mut operation = f.ctx.store.operations().get("op").await?;
        operation.status.paused = true;
        f.ctx.store.operations().update(operation).await?;

        f.controller.reconcile(&f.group).await?;
        f.controller.reconcile(&f.group).await?;

        let group = f.ctx.store.task_groups().get(&f.group).await?;
        assert!(group.status.paused);
        assert_eq!(group.status.phase, Phase::Paused);
        assert!(tasks(&f.ctx).await?.is_empty());
        assert_eq!(f.recorder.reasons_for(&f.group), vec!["RuntimeTaskGroupPaused"]);
        Ok(())
    }
}
