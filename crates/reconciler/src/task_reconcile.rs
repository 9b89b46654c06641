//! Matching a task group's selected nodes against its runtime tasks.

use std::collections::BTreeMap;

use operator_api::{Node, RuntimeTask};

use crate::taskgroup_reconcile::Classification;

/// A node name with the selected node, if any, and the tasks bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskItem {
    pub node_name: String,
    pub node: Option<Node>,
    pub tasks: Vec<RuntimeTask>,
    pub classification: Classification,
}

impl TaskItem {
    fn new(node_name: String, node: Option<Node>, tasks: Vec<RuntimeTask>) -> Self {
        let classification = classify(node.as_ref(), &tasks);
        Self {
            node_name,
            node,
            tasks,
            classification,
        }
    }
}

fn classify(node: Option<&Node>, tasks: &[RuntimeTask]) -> Classification {
    match (node, tasks) {
        (None, _) | (Some(_), [_, _, ..]) => Classification::Invalid,
        (Some(_), []) => Classification::TobeCreated,
        (Some(_), [task]) => {
            // a task with a recovery mode set is about to move again
            if task.status.has_error() && task.spec.recovery_mode.is_none() {
                Classification::Failed
            } else if task.status.completion_time.is_some() {
                Classification::Completed
            } else if task.status.start_time.is_some() {
                Classification::Running
            } else {
                Classification::Pending
            }
        }
    }
}

/// Every node and task of a task group, sorted by node name and bucketed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReconcileList {
    pub all: Vec<TaskItem>,
}

impl TaskReconcileList {
    fn count(&self, classification: Classification) -> usize {
        self.all
            .iter()
            .filter(|i| i.classification == classification)
            .count()
    }

    pub fn invalid(&self) -> usize {
        self.count(Classification::Invalid)
    }

    pub fn failed(&self) -> usize {
        self.count(Classification::Failed)
    }

    pub fn completed(&self) -> usize {
        self.count(Classification::Completed)
    }

    pub fn running(&self) -> usize {
        self.count(Classification::Running)
    }

    pub fn pending(&self) -> usize {
        self.count(Classification::Pending)
    }

    pub fn active(&self) -> usize {
        self.pending().saturating_add(self.running())
    }

    /// Names of the nodes still waiting for a task, in order.
    pub fn tobe_created(&self) -> Vec<&str> {
        self.all
            .iter()
            .filter(|i| i.classification == Classification::TobeCreated)
            .map(|i| i.node_name.as_str())
            .collect()
    }

    /// Serial creation: the first node without a task, once nothing is in flight.
    pub fn next_to_create(&self) -> Option<&str> {
        if self.active() > 0 {
            return None;
        }
        self.tobe_created().into_iter().next()
    }
}

/// Match selected nodes against runtime tasks by node name.
pub fn reconcile_tasks(nodes: Vec<Node>, tasks: Vec<RuntimeTask>) -> TaskReconcileList {
    let mut matched: BTreeMap<String, (Option<Node>, Vec<RuntimeTask>)> = BTreeMap::new();
    for node in nodes {
        let name = node.metadata.name.clone();
        matched.entry(name).or_default().0 = Some(node);
    }
    for task in tasks {
        matched
            .entry(task.spec.node_name.clone())
            .or_default()
            .1
            .push(task);
    }

    TaskReconcileList {
        all: matched
            .into_iter()
            .map(|(name, (node, tasks))| TaskItem::new(name, node, tasks))
            .collect(),
    }
}
