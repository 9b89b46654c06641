//! Operation planner.
//!
//! Pure functions turning an operation into the ordered task groups that
//! carry it out, plus the node labels an agent needs to run them.

mod custom;
mod renew_certificates;
mod upgrade;

use operator_api::{
    LabelSelector, Labels, Object, ObjectMeta, Operation, OperationDescriptor, RuntimeTaskGroup,
    RuntimeTaskGroupSpec, RuntimeTaskGroupStatus, RuntimeTaskTemplate, TASK_GROUP_NAME_LABEL, TASK_GROUP_ORDER_LABEL,
};

use crate::error::{Error, Result};

/// Task groups needed to carry out `operation`, in order.
///
/// # Errors
///
/// [`Error::NoMatchingOperationKind`] when the operation has no descriptor.
pub fn plan(operation: &Operation) -> Result<Vec<RuntimeTaskGroup>> {
    Ok(match descriptor(operation)? {
        OperationDescriptor::RenewCertificates(_) => renew_certificates::plan(operation),
        OperationDescriptor::Upgrade(spec) => upgrade::plan(operation, spec),
        OperationDescriptor::Custom(spec) => custom::plan(operation, spec),
    })
}

/// Node labels selecting where an agent must run for `operation`.
/// Empty means every node.
///
/// # Errors
///
/// [`Error::NoMatchingOperationKind`] when the operation has no descriptor.
pub fn labels_for_agent(operation: &Operation) -> Result<Labels> {
    Ok(match descriptor(operation)? {
        OperationDescriptor::RenewCertificates(_) => renew_certificates::agent_labels(),
        OperationDescriptor::Upgrade(_) | OperationDescriptor::Custom(_) => Labels::new(),
    })
}

fn descriptor(operation: &Operation) -> Result<&OperationDescriptor> {
    operation
        .spec
        .descriptor
        .as_ref()
        .ok_or_else(|| Error::no_matching_operation_kind(operation.name()))
}

/// Skeleton shared by every planned group: naming, labels, ownership and
/// a selector for the group's runtime tasks.
fn basic_task_group(operation: &Operation, order: u32, name: &str) -> RuntimeTaskGroup {
    let order_label = format!("{order:02}");
    let mut labels = operation.metadata.labels.clone();
    labels.insert(TASK_GROUP_NAME_LABEL.to_string(), name.to_string());
    labels.insert(TASK_GROUP_ORDER_LABEL.to_string(), order_label.clone());

    let metadata = ObjectMeta {
        labels: labels.clone(),
        ..ObjectMeta::named(format!("{}-{order_label}-{name}", operation.name()))
    }
    .owned_by(operation.owner_reference());

    RuntimeTaskGroup {
        metadata,
        spec: RuntimeTaskGroupSpec {
            order,
            selector: LabelSelector::from_labels(labels.clone()),
            template: RuntimeTaskTemplate {
                labels,
                ..RuntimeTaskTemplate::default()
            },
            ..RuntimeTaskGroupSpec::default()
        },
        status: RuntimeTaskGroupStatus::default(),
    }
}

#[cfg(test)]
mod tests {
    use operator_api::{
        CommandDescriptor, CustomSpec, NodeFilter, ObjectKind, Phase, RenewCertificatesSpec,
        SelectorOperator, UpgradeSpec, CONTROL_PLANE_LABEL, OPERATION_NAME_LABEL,
    };

    use super::*;

    fn operation(descriptor: OperationDescriptor) -> Operation {
        let mut op = Operation::new("op", descriptor);
        op.metadata
            .labels
            .insert(OPERATION_NAME_LABEL.to_string(), "op".to_string());
        op
    }

    fn names(groups: &[RuntimeTaskGroup]) -> Vec<&str> {
        groups.iter().map(|g| g.metadata.name.as_str()).collect()
    }

    #[test]
    fn test_missing_descriptor_fails_planning() {
        let op = Operation {
            metadata: ObjectMeta::named("empty"),
            ..Operation::default()
        };
        assert_eq!(plan(&op), Err(Error::no_matching_operation_kind("empty")));
        assert!(labels_for_agent(&op).is_err_and(|e| e.is_fatal()));
    }

    #[test]
    fn test_renew_certificates() -> Result<()> {
        let op = operation(OperationDescriptor::RenewCertificates(
            RenewCertificatesSpec::default(),
        ));
        let groups = plan(&op)?;

        assert_eq!(names(&groups), vec!["op-01-renew-cp"]);
        let group = groups.first();
        assert_eq!(
            group.map(|g| g.spec.template.spec.commands.clone()),
            Some(vec![CommandDescriptor::KubeadmRenewCertificates])
        );
        assert_eq!(
            group.map(|g| g.spec.node_selector.clone()),
            Some(LabelSelector::default().with_label(CONTROL_PLANE_LABEL, ""))
        );
        assert_eq!(
            labels_for_agent(&op)?.get(CONTROL_PLANE_LABEL).map(String::as_str),
            Some("")
        );
        Ok(())
    }

    #[test]
    fn test_upgrade_runs_first_cp_then_other_cps_then_workers() -> Result<()> {
        let op = operation(OperationDescriptor::Upgrade(UpgradeSpec {
            kubernetes_version: "v1.30.0".to_string(),
        }));
        let groups = plan(&op)?;

        assert_eq!(
            names(&groups),
            vec!["op-01-upgrade-cp-1", "op-02-upgrade-cp-n", "op-03-upgrade-w"]
        );
        let filters: Vec<NodeFilter> = groups.iter().map(|g| g.spec.node_filter).collect();
        assert_eq!(filters, vec![NodeFilter::Head, NodeFilter::Tail, NodeFilter::All]);

        let first = groups.first().map(|g| g.spec.template.spec.commands.clone());
        assert_eq!(
            first,
            Some(vec![
                CommandDescriptor::UpgradeKubeadm,
                CommandDescriptor::KubeadmUpgradeApply {
                    kubernetes_version: "v1.30.0".to_string()
                },
                CommandDescriptor::UpgradeKubeletAndKubectl,
            ])
        );

        let workers = groups.last();
        assert_eq!(
            workers.map(|g| g.spec.node_selector.match_expressions.len()),
            Some(1)
        );
        assert_eq!(
            workers.and_then(|g| g.spec.node_selector.match_expressions.first().map(|r| r.operator)),
            Some(SelectorOperator::DoesNotExist)
        );
        let worker_commands = workers.map(|g| g.spec.template.spec.commands.clone());
        assert_eq!(
            worker_commands.as_ref().and_then(|c| c.first()),
            Some(&CommandDescriptor::KubectlDrain)
        );
        assert_eq!(
            worker_commands.as_ref().and_then(|c| c.last()),
            Some(&CommandDescriptor::KubectlUncordon)
        );
        assert!(labels_for_agent(&op)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_groups_carry_labels_and_owner() -> Result<()> {
        let op = operation(OperationDescriptor::Upgrade(UpgradeSpec::default()));
        for group in plan(&op)? {
            let labels = &group.metadata.labels;
            assert_eq!(labels.get(OPERATION_NAME_LABEL).map(String::as_str), Some("op"));
            assert_eq!(
                labels.get(TASK_GROUP_ORDER_LABEL),
                Some(&group.order_label())
            );
            assert!(labels.contains_key(TASK_GROUP_NAME_LABEL));
            assert_eq!(group.spec.selector.match_labels, *labels);
            assert_eq!(group.spec.template.labels, *labels);
            assert_eq!(
                group.metadata.owner(ObjectKind::Operation).map(|r| r.uid),
                Some(op.metadata.uid)
            );
            assert_eq!(group.derive_phase(), Phase::Pending);
        }
        Ok(())
    }

    #[test]
    fn test_custom_restamps_names_and_keeps_commands() -> Result<()> {
        let mut first = RuntimeTaskGroup::default();
        first.metadata.name = "prepare".to_string();
        first.spec.order = 7;
        first.spec.node_filter = NodeFilter::Head;
        first.spec.template.spec.commands =
            vec![CommandDescriptor::Pass, CommandDescriptor::Wait { seconds: 1 }];
        first.status.start_time = Some(chrono::Utc::now());

        let mut second = RuntimeTaskGroup::default();
        second.metadata.name = "finish".to_string();
        second.spec.template.spec.commands = vec![CommandDescriptor::Fail];

        let op = operation(OperationDescriptor::Custom(CustomSpec {
            workflow: vec![first, second],
        }));
        let groups = plan(&op)?;

        assert_eq!(names(&groups), vec!["op-01-prepare", "op-02-finish"]);
        let orders: Vec<u32> = groups.iter().map(|g| g.spec.order).collect();
        assert_eq!(orders, vec![1, 2]);

        let prepared = groups.first();
        assert_eq!(prepared.map(|g| g.spec.node_filter), Some(NodeFilter::Head));
        assert_eq!(
            prepared.map(|g| g.spec.template.spec.commands.len()),
            Some(2)
        );
        assert_eq!(prepared.map(RuntimeTaskGroup::derive_phase), Some(Phase::Pending));
        Ok(())
    }
}
