//! Error types for the store crate.

use operator_api::ObjectKind;
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Store error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: ObjectKind, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: ObjectKind, name: String },

    /// The object was written by someone else since it was read.
    #[error("{kind} '{name}' was modified: expected resource version {expected}, found {actual}")]
    Conflict {
        kind: ObjectKind,
        name: String,
        expected: u64,
        actual: u64,
    },

    /// The subscriber fell behind and missed notifications.
    #[error("watch lagged, {missed} notifications missed")]
    Lagged { missed: u64 },

    #[error("watch channel closed")]
    ChannelClosed,
}

impl Error {
    /// Create a not found error.
    pub fn not_found(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create an already exists error.
    pub fn already_exists(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(kind: ObjectKind, name: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::Conflict {
            kind,
            name: name.into(),
            expected,
            actual,
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
