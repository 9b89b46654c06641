//! Errors raised while constructing API objects.

use thiserror::Error;

/// Result type alias for API construction.
pub type Result<T> = std::result::Result<T, ApiError>;

/// API construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// More than one operation kind was set on a single operation.
    #[error("operation descriptor must set exactly one kind, found: {}", .kinds.join(", "))]
    AmbiguousDescriptor { kinds: Vec<String> },
}

impl ApiError {
    /// Create an ambiguous descriptor error.
    pub fn ambiguous_descriptor(kinds: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::AmbiguousDescriptor {
            kinds: kinds.into_iter().map(Into::into).collect(),
        }
    }
}
