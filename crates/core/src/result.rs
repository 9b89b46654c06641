//! Result type definition and extension traits.
//!
//! Controllers run forever; a failed list or a failed event delivery must be
//! logged and survived rather than propagated out of the loop. These
//! combinators keep that pattern short without reaching for unwrap.

use std::fmt::Display;

use crate::error::Error;

/// The standard Result type for operator plumbing.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for any Result whose error can be displayed.
pub trait ResultExt<T, E> {
    /// Get the value or a default, logging the error if present.
    fn or_default_logged(self, context: &str) -> T
    where
        T: Default;
}

impl<T, E: Display> ResultExt<T, E> for std::result::Result<T, E> {
    fn or_default_logged(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "{context}, using default");
                T::default()
            }
        }
    }
}

/// Extension trait for Option types.
pub trait OptionExt<T> {
    /// Tap into None without consuming the Option.
    fn tap_none<F: FnOnce()>(self, f: F) -> Self;
}

impl<T> OptionExt<T> for Option<T> {
    fn tap_none<F: FnOnce()>(self, f: F) -> Self {
        if self.is_none() {
            f();
        }
        self
    }
}
