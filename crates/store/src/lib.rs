//! Object store for the kubeadm operator.
//!
//! - **Object store**: get/list/create/update/delete per kind, with optimistic
//!   concurrency through `resourceVersion`
//! - **Watch bus**: `Added`/`Modified`/`Deleted` notifications, filtered by kind
//! - **Garbage collector**: cascade deletion along owner references
//!
//! # Example
//!
//! ```ignore
//! use operator_store::{Store, WatchPattern};
//! use operator_api::{Node, ObjectKind};
//!
//! #[tokio::main]
//! async fn main() -> operator_store::Result<()> {
//!     let store = Store::in_memory();
//!     let mut watch = store.bus().subscribe(WatchPattern::ByKind(ObjectKind::Node));
//!
//!     store.nodes().create(Node::new("cp-1")).await?;
//!
//!     let event = watch.recv().await?;
//!     println!("{} {}", event.change, event.name);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod gc;
pub mod store;
pub mod watch;

pub use error::{Error, Result};
pub use gc::GarbageCollector;
pub use store::{InMemoryObjectStore, ObjectStore, Store};
pub use watch::{ChangeKind, WatchBus, WatchEvent, WatchPattern, WatchSubscription};
