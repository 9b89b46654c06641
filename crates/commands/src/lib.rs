//! Command dispatch for runtime tasks.
//!
//! The reconciler only knows that a command either succeeded or failed; this
//! crate decides what running a [`CommandDescriptor`](operator_api::CommandDescriptor)
//! on a node actually means.

pub mod config;
pub mod dispatcher;
pub mod error;

pub use config::CommandConfig;
pub use dispatcher::{CommandDispatcher, HostCommandDispatcher, Invocation};
pub use error::{CommandError, Result};
