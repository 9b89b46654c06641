use operator_api::{CustomSpec, Operation, RuntimeTaskGroup};

use super::basic_task_group;

/// Re-stamp the user's groups with positional order, names and labels.
/// Node selection and commands are kept verbatim; status starts over.
pub(super) fn plan(operation: &Operation, spec: &CustomSpec) -> Vec<RuntimeTaskGroup> {
    (1_u32..)
        .zip(&spec.workflow)
        .map(|(order, user)| {
            let mut group = basic_task_group(operation, order, &user.metadata.name);
            group.spec.node_selector = user.spec.node_selector.clone();
            group.spec.node_filter = user.spec.node_filter;
            group.spec.create_strategy = user.spec.create_strategy;
            group.spec.template.spec = user.spec.template.spec.clone();
            group
        })
        .collect()
}
