//! Matching planned task groups against the ones that exist.

use std::collections::BTreeMap;

use operator_api::RuntimeTaskGroup;

/// Where a matched item stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Wanted but does not exist yet.
    TobeCreated,
    /// Exists but is not wanted, or is ambiguous.
    Invalid,
    Failed,
    Completed,
    Running,
    Pending,
}

impl Classification {
    /// Pending and running items still have work in flight.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// A task group name with its planned and current versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskGroupItem {
    pub name: String,
    pub planned: Option<RuntimeTaskGroup>,
    pub current: Option<RuntimeTaskGroup>,
    pub classification: Classification,
}

impl TaskGroupItem {
    fn new(name: String, planned: Option<RuntimeTaskGroup>, current: Option<RuntimeTaskGroup>) -> Self {
        let classification = classify(planned.as_ref(), current.as_ref());
        Self {
            name,
            planned,
            current,
            classification,
        }
    }

    /// Sequencing order, from the plan when there is one.
    pub fn order(&self) -> u32 {
        self.planned
            .as_ref()
            .or(self.current.as_ref())
            .map_or(0, |g| g.spec.order)
    }
}

fn classify(planned: Option<&RuntimeTaskGroup>, current: Option<&RuntimeTaskGroup>) -> Classification {
    match (planned, current) {
        (Some(_), None) => Classification::TobeCreated,
        (None, _) => Classification::Invalid,
        (Some(_), Some(group)) => {
            if group.status.has_error() {
                Classification::Failed
            } else if group.status.completion_time.is_some() {
                Classification::Completed
            } else if group.status.start_time.is_some() {
                Classification::Running
            } else {
                Classification::Pending
            }
        }
    }
}

/// Every task group of an operation, sorted by name and bucketed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskGroupReconcileList {
    pub all: Vec<TaskGroupItem>,
}

impl TaskGroupReconcileList {
    fn bucket(&self, classification: Classification) -> Vec<&TaskGroupItem> {
        self.all
            .iter()
            .filter(|i| i.classification == classification)
            .collect()
    }

    pub fn tobe_created(&self) -> Vec<&TaskGroupItem> {
        self.bucket(Classification::TobeCreated)
    }

    pub fn invalid(&self) -> Vec<&TaskGroupItem> {
        self.bucket(Classification::Invalid)
    }

    pub fn failed(&self) -> Vec<&TaskGroupItem> {
        self.bucket(Classification::Failed)
    }

    pub fn completed(&self) -> Vec<&TaskGroupItem> {
        self.bucket(Classification::Completed)
    }

    pub fn running(&self) -> Vec<&TaskGroupItem> {
        self.bucket(Classification::Running)
    }

    pub fn pending(&self) -> Vec<&TaskGroupItem> {
        self.bucket(Classification::Pending)
    }

    /// Number of pending plus running groups.
    pub fn active(&self) -> usize {
        self.all.iter().filter(|i| i.classification.is_active()).count()
    }

    /// Whether the named group may move forward: it must be waiting to be
    /// created or pending, and every lower-order group must be completed.
    pub fn may_advance(&self, name: &str) -> bool {
        let Some(item) = self.all.iter().find(|i| i.name == name) else {
            return false;
        };
        let waiting = matches!(
            item.classification,
            Classification::TobeCreated | Classification::Pending
        );
        waiting
            && self
                .all
                .iter()
                .filter(|other| other.order() < item.order())
                .all(|other| other.classification == Classification::Completed)
    }

    /// The group to create next, if any: nothing may be in flight and only
    /// the lowest-order group still to be created qualifies.
    pub fn next_to_create(&self) -> Option<&TaskGroupItem> {
        if self.active() > 0 {
            return None;
        }
        self.tobe_created()
            .into_iter()
            .min_by(|a, b| a.order().cmp(&b.order()).then_with(|| a.name.cmp(&b.name)))
            .filter(|item| self.may_advance(&item.name))
    }
}

/// Match planned groups against existing ones by name.
pub fn reconcile_task_groups(
    desired: Vec<RuntimeTaskGroup>,
    current: Vec<RuntimeTaskGroup>,
) -> TaskGroupReconcileList {
    let mut matched: BTreeMap<String, (Option<RuntimeTaskGroup>, Option<RuntimeTaskGroup>)> =
        BTreeMap::new();
    for group in desired {
        let name = group.metadata.name.clone();
        matched.entry(name).or_default().0 = Some(group);
    }
    for group in current {
        let name = group.metadata.name.clone();
        matched.entry(name).or_default().1 = Some(group);
    }

    TaskGroupReconcileList {
        all: matched
            .into_iter()
            .map(|(name, (planned, current))| TaskGroupItem::new(name, planned, current))
            .collect(),
    }
}
