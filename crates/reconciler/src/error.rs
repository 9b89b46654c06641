//! Error types for the reconciler crate.

use operator_api::ObjectKind;
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The operation carries no descriptor the planner understands.
    #[error("no matching operation kind for operation '{operation}'")]
    NoMatchingOperationKind { operation: String },

    /// An object lacks the owner reference it must have.
    #[error("missing {owner} owner reference on {kind} '{name}'")]
    MissingOwner {
        kind: ObjectKind,
        name: String,
        owner: ObjectKind,
    },

    /// Store access failed.
    #[error("store error: {0}")]
    Store(#[from] operator_store::Error),
}

impl Error {
    /// Create a planning error.
    pub fn no_matching_operation_kind(operation: impl Into<String>) -> Self {
        Self::NoMatchingOperationKind {
            operation: operation.into(),
        }
    }

    /// Create a missing owner error.
    pub fn missing_owner(kind: ObjectKind, name: impl Into<String>, owner: ObjectKind) -> Self {
        Self::MissingOwner {
            kind,
            name: name.into(),
            owner,
        }
    }

    /// Whether the error is an optimistic-concurrency conflict worth retrying
    /// right away.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }

    /// Whether retrying without a change to the object cannot help.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::NoMatchingOperationKind { .. })
    }
}
