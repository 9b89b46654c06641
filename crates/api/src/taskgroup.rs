//! Runtime task groups: ordered, node-selector-scoped units of an operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::labels::LabelSelector;
use crate::meta::{Object, ObjectKind, ObjectMeta};
use crate::phase::{Phase, PhaseInputs};
use crate::runtimetask::RuntimeTaskTemplate;
use crate::status_error::{TaskGroupError, TaskGroupErrorReason};

/// Positional filter applied after label selection and sorting by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeFilter {
    /// Every matched node.
    #[default]
    #[serde(alias = "All")]
    All,
    /// Only the first node.
    #[serde(alias = "Head")]
    Head,
    /// Every node except the first.
    #[serde(alias = "Tail")]
    Tail,
}

/// How runtime tasks of a group are created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateStrategy {
    /// One node at a time, the next only after the previous completed.
    #[default]
    Serial,
}

/// Desired state of a task group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeTaskGroupSpec {
    /// Sequencing index; lower orders run first.
    #[serde(default)]
    pub order: u32,
    /// Labels identifying the group's runtime tasks.
    #[serde(default)]
    pub selector: LabelSelector,
    /// Nodes the group targets.
    #[serde(default)]
    pub node_selector: LabelSelector,
    #[serde(default)]
    pub node_filter: NodeFilter,
    #[serde(default)]
    pub create_strategy: CreateStrategy,
    #[serde(default)]
    pub template: RuntimeTaskTemplate,
}

/// Observed state of a task group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeTaskGroupStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub nodes: u32,
    #[serde(default)]
    pub running_nodes: u32,
    #[serde(default)]
    pub succeeded_nodes: u32,
    #[serde(default)]
    pub failed_nodes: u32,
    #[serde(default)]
    pub invalid_nodes: u32,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<TaskGroupErrorReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RuntimeTaskGroupStatus {
    /// Mark the group completed. Clears the pause flag and any error.
    pub fn set_completion_time(&mut self, now: DateTime<Utc>) {
        self.completion_time = Some(now);
        self.paused = false;
        self.reset_error();
    }

    pub fn set_error(&mut self, error: &TaskGroupError) {
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

/// An ordered unit of work belonging to one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeTaskGroup {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: RuntimeTaskGroupSpec,
    #[serde(default)]
    pub status: RuntimeTaskGroupStatus,
}

impl RuntimeTaskGroup {
    /// Two-digit order string used in names and labels.
    pub fn order_label(&self) -> String {
        format!("{:02}", self.spec.order)
    }

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

impl Object for RuntimeTaskGroup {
    const KIND: ObjectKind = ObjectKind::RuntimeTaskGroup;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
