//! Core types shared by every crate of the kubeadm operator.
//!
//! - [`Error`]/[`Result`]: low-level failures (I/O, document parsing)
//! - [`document`]: loading JSON/YAML/TOML documents by file extension, rendering YAML
//! - [`ResultExt`]/[`OptionExt`]: logging combinators used by long-running loops

pub mod document;
pub mod error;
pub mod result;

pub use document::{DocumentFormat, load_document, parse_document, render_yaml};
pub use error::Error;
pub use result::{OptionExt, Result, ResultExt};
