//! Input document for `plan` and `run`: the cluster's nodes and one operation.

use std::path::Path;

use operator_api::{Node, Operation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub nodes: Vec<Node>,
    pub operation: Operation,
}

impl Manifest {
    /// Load a manifest; the format follows the file extension.
    pub fn load(path: &Path) -> operator_core::Result<Self> {
        operator_core::load_document(path)
    }
}
