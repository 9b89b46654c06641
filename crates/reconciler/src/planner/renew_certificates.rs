use operator_api::{
    CommandDescriptor, LabelSelector, Labels, Operation, RuntimeTaskGroup, CONTROL_PLANE_LABEL,
};

use super::basic_task_group;

pub(super) fn plan(operation: &Operation) -> Vec<RuntimeTaskGroup> {
    let mut renew = basic_task_group(operation, 1, "renew-cp");
    renew.spec.node_selector = LabelSelector::default().with_label(CONTROL_PLANE_LABEL, "");
    renew.spec.template.spec.commands = vec![CommandDescriptor::KubeadmRenewCertificates];
    vec![renew]
}

/// Certificates live on control-plane nodes only.
pub(super) fn agent_labels() -> Labels {
    Labels::from([(CONTROL_PLANE_LABEL.to_string(), String::new())])
}
