use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use operator_api::{
    LabelSelector, Labels, Object, ObjectKind, Operation, OperationError, RuntimeTaskGroup,
    OPERATION_NAME_LABEL, OPERATION_UID_LABEL,
};
use operator_store::WatchEvent;
use tracing::{debug, info, warn};

use super::{count, get_optional, write_if_changed, Controller, ControllerContext};
use crate::error::Result;
use crate::planner;
use crate::recorder::ObjectEvent;
use crate::taskgroup_reconcile::{reconcile_task_groups, TaskGroupReconcileList};

/// Plans operations and creates their task groups one order at a time.
pub struct OperationController {
    ctx: ControllerContext,
    /// Operations whose plan failed, with the resource version that failed.
    failed_plans: Mutex<HashMap<String, u64>>,
}

impl OperationController {
    pub fn new(ctx: ControllerContext) -> Self {
        Self {
            ctx,
            failed_plans: Mutex::new(HashMap::new()),
        }
    }

    fn plan_failed_at(&self, name: &str) -> Option<u64> {
        self.failed_plans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }

    fn remember_failed_plan(&self, name: &str, resource_version: Option<u64>) {
        let mut failed = self.failed_plans.lock().unwrap_or_else(PoisonError::into_inner);
        match resource_version {
            Some(version) => {
                failed.insert(name.to_string(), version);
            }
            None => {
                failed.remove(name);
            }
        }
    }

    /// Mirror the requested pause state into status.
    fn reconcile_pause(&self, operation: &mut Operation) {
        let requested = operation.spec.paused;
        if let Some(event) =
            ObjectEvent::pause_change(&*operation, operation.status.paused, requested, "")
        {
            self.ctx.recorder.record(event);
            operation.status.paused = requested;
        }
    }

    async fn reconcile_groups(
        &self,
        operation: &mut Operation,
        planned: Vec<RuntimeTaskGroup>,
    ) -> Result<()> {
        let current = self
            .ctx
            .store
            .task_groups()
            .list(&group_selector(operation))
            .await?;
        let list = reconcile_task_groups(planned, current);
        set_counters(operation, &list);

        if list.active() > 0 {
            operation.status.reset_error();
        } else {
            let invalid = list.invalid();
            if !invalid.is_empty() {
                let error = OperationError::invalid_state(format!(
                    "operation has {} invalid task groups",
                    invalid.len()
                ));
                warn!(operation = %operation.name(), "{error}");
                operation.status.set_error(&error);
                return Ok(());
            }
            let failed = list.failed();
            if !failed.is_empty() {
                let error = OperationError::failed_replicas(format!(
                    "operation has {} failed task groups",
                    failed.len()
                ));
                warn!(operation = %operation.name(), "{error}");
                operation.status.set_error(&error);
                return Ok(());
            }
        }

        if operation.status.start_time.is_none() {
            info!(operation = %operation.name(), groups = list.all.len(), "Starting operation");
            operation.status.start_time = Some(self.ctx.clock.now());
            return Ok(());
        }

        if list.completed().len() == list.all.len() {
            if operation.status.completion_time.is_none() {
                info!(operation = %operation.name(), "Operation completed");
                operation.status.set_completion_time(self.ctx.clock.now());
            }
            return Ok(());
        }

        if operation.status.paused {
            debug!(operation = %operation.name(), "Operation paused, not creating task groups");
            return Ok(());
        }

        if let Some(group) = list.next_to_create().and_then(|item| item.planned.clone()) {
            info!(
                operation = %operation.name(),
                group = %group.name(),
                order = group.spec.order,
                "Creating task group"
            );
            self.ctx.store.task_groups().create(group).await?;
        }
        Ok(())
    }
}

fn group_selector(operation: &Operation) -> LabelSelector {
    let labels = &operation.metadata.labels;
    [OPERATION_NAME_LABEL, OPERATION_UID_LABEL]
        .into_iter()
        .filter_map(|key| labels.get(key).map(|value| (key, value)))
        .fold(LabelSelector::default(), |selector, (key, value)| {
            selector.with_label(key, value.as_str())
        })
}

/// Stamp the labels every planned object inherits.
fn ensure_operation_labels(operation: &mut Operation) {
    let name = operation.metadata.name.clone();
    let uid = operation.metadata.uid.to_string();
    let labels: &mut Labels = &mut operation.metadata.labels;
    labels.entry(OPERATION_NAME_LABEL.to_string()).or_insert(name);
    labels.entry(OPERATION_UID_LABEL.to_string()).or_insert(uid);
}

fn set_counters(operation: &mut Operation, list: &TaskGroupReconcileList) {
    let status = &mut operation.status;
    status.groups = count(list.all.len());
    status.running_groups = count(list.running().len());
    status.succeeded_groups = count(list.completed().len());
    status.failed_groups = count(list.failed().len());
    status.invalid_groups = count(list.invalid().len());
}

#[async_trait]
impl Controller for OperationController {
    fn name(&self) -> &'static str {
        "operation"
    }

    fn watches(&self) -> Vec<ObjectKind> {
        vec![ObjectKind::Operation, ObjectKind::RuntimeTaskGroup]
    }

    async fn keys_for(&self, event: &WatchEvent) -> Result<Vec<String>> {
        Ok(match event.kind {
            ObjectKind::Operation => vec![event.name.clone()],
            _ => event
                .owner(ObjectKind::Operation)
                .map(|owner| vec![owner.name.clone()])
                .unwrap_or_default(),
        })
    }

    async fn resync_keys(&self) -> Result<Vec<String>> {
        let operations = self
            .ctx
            .store
            .operations()
            .list(&LabelSelector::default())
            .await?;
        Ok(operations.into_iter().map(|op| op.metadata.name).collect())
    }

    async fn reconcile(&self, key: &str) -> Result<()> {
        let store = self.ctx.store.operations().as_ref();
        let Some(before) = get_optional(store, key).await? else {
            self.remember_failed_plan(key, None);
            return Ok(());
        };
        if self.plan_failed_at(key) == Some(before.metadata.resource_version) {
            return Ok(());
        }

        let mut operation = before.clone();
        let outcome = if operation.metadata.is_deleted() || operation.status.completion_time.is_some() {
            Ok(())
        } else {
            self.reconcile_pause(&mut operation);
            ensure_operation_labels(&mut operation);
            match planner::plan(&operation).and_then(|groups| {
                planner::labels_for_agent(&operation).map(|labels| (groups, labels))
            }) {
                Ok((groups, agent_labels)) => {
                    operation.status.agent_node_selector = agent_labels;
                    self.reconcile_groups(&mut operation, groups).await
                }
                Err(e) => Err(e),
            }
        };

        operation.status.phase = operation.derive_phase();
        let written = write_if_changed(store, &before, operation).await?;

        match outcome {
            Err(e) if e.is_fatal() => {
                warn!(operation = %key, error = %e, "Planning failed");
                self.ctx
                    .recorder
                    .record(ObjectEvent::warning(&written, "ReconcileError", e.to_string()));
                self.remember_failed_plan(key, Some(written.metadata.resource_version));
                Err(e)
            }
            other => other,
        }
    }
}
