use operator_api::{
    CommandDescriptor, LabelSelector, NodeFilter, Operation, RuntimeTaskGroup, SelectorOperator,
    UpgradeSpec, CONTROL_PLANE_LABEL,
};

use super::basic_task_group;

/// First control plane, then the remaining control planes, then workers.
pub(super) fn plan(operation: &Operation, spec: &UpgradeSpec) -> Vec<RuntimeTaskGroup> {
    let control_plane = LabelSelector::default().with_label(CONTROL_PLANE_LABEL, "");

    let mut first_cp = basic_task_group(operation, 1, "upgrade-cp-1");
    first_cp.spec.node_selector = control_plane.clone();
    first_cp.spec.node_filter = NodeFilter::Head;
    first_cp.spec.template.spec.commands = vec![
        CommandDescriptor::UpgradeKubeadm,
        CommandDescriptor::KubeadmUpgradeApply {
            kubernetes_version: spec.kubernetes_version.clone(),
        },
        CommandDescriptor::UpgradeKubeletAndKubectl,
    ];

    let mut other_cps = basic_task_group(operation, 2, "upgrade-cp-n");
    other_cps.spec.node_selector = control_plane;
    other_cps.spec.node_filter = NodeFilter::Tail;
    other_cps.spec.template.spec.commands = vec![
        CommandDescriptor::UpgradeKubeadm,
        CommandDescriptor::KubeadmUpgradeNode,
        CommandDescriptor::UpgradeKubeletAndKubectl,
    ];

    let mut workers = basic_task_group(operation, 3, "upgrade-w");
    workers.spec.node_selector = LabelSelector::default().with_expression(
        CONTROL_PLANE_LABEL,
        SelectorOperator::DoesNotExist,
        Vec::new(),
    );
    workers.spec.template.spec.commands = vec![
        CommandDescriptor::KubectlDrain,
        CommandDescriptor::UpgradeKubeadm,
        CommandDescriptor::KubeadmUpgradeNode,
        CommandDescriptor::UpgradeKubeletAndKubectl,
        CommandDescriptor::KubectlUncordon,
    ];

    vec![first_cp, other_cps, workers]
}
