//! Resolution of a task group's node selector into concrete nodes.

use itertools::Itertools;
use operator_api::{LabelSelector, Node, NodeFilter};

/// Select the nodes a task group targets.
///
/// Nodes matching `selector` are sorted by name, then `filter` is applied:
/// `all` keeps every node, `head` only the first, `tail` all but the first.
/// No match yields an empty list.
pub fn select_nodes(nodes: &[Node], selector: &LabelSelector, filter: NodeFilter) -> Vec<Node> {
    let matched = nodes
        .iter()
        .filter(|n| selector.matches(&n.metadata.labels))
        .sorted_by(|a, b| a.metadata.name.cmp(&b.metadata.name))
        .cloned();

    match filter {
        NodeFilter::All => matched.collect(),
        NodeFilter::Head => matched.take(1).collect(),
        NodeFilter::Tail => matched.skip(1).collect(),
    }
}
