//! Object metadata shared by every kind.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Label set. Ordered so that serialized objects and derived names are stable.
pub type Labels = BTreeMap<String, String>;

/// Unique identifier of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uid(Ulid);

impl Uid {
    /// Create a new random uid.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for Uid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kinds of objects the operator knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Operation,
    RuntimeTaskGroup,
    RuntimeTask,
    Node,
}

impl ObjectKind {
    /// Kind name as it appears in owner references and events.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Operation => "Operation",
            Self::RuntimeTaskGroup => "RuntimeTaskGroup",
            Self::RuntimeTask => "RuntimeTask",
            Self::Node => "Node",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pointer from an owned object to its single owner.
///
/// Only identifies the owner; cascade deletion is the garbage collector's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: ObjectKind,
    pub name: String,
    pub uid: Uid,
}

/// Metadata carried by every object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub uid: Uid,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    /// Bumped by the store on every write; used for optimistic concurrency.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Deletion marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Metadata with only a name set.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Replace the owner references with a single owner.
    #[must_use]
    pub fn owned_by(mut self, owner: OwnerReference) -> Self {
        self.owner_references = vec![owner];
        self
    }

    /// Find the owner reference of the given kind.
    pub fn owner(&self, kind: ObjectKind) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.kind == kind)
    }

    /// Whether the deletion marker is set.
    pub const fn is_deleted(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

/// Common behaviour of stored objects.
pub trait Object: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Kind of this object type.
    const KIND: ObjectKind;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Owner reference pointing at this object.
    fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            kind: Self::KIND,
            name: self.metadata().name.clone(),
            uid: self.metadata().uid,
        }
    }
}

/// A cluster node. Only its name and labels matter to the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub metadata: ObjectMeta,
}

impl Node {
    /// Create a node with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
        }
    }

    /// Add a label to the node.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }
}

impl Object for Node {
    const KIND: ObjectKind = ObjectKind::Node;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
