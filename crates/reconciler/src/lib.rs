//! Task orchestration engine of the kubeadm operator.
//!
//! An [`Operation`](operator_api::Operation) is planned into ordered
//! task groups; each task group fans out into one runtime task per selected
//! node; each runtime task walks its command queue on its node.
//!
//! # Layers
//!
//! - [`node_selector`], [`planner`], [`taskgroup_reconcile`] and
//!   [`task_reconcile`] are pure functions over the object model.
//! - [`runtime_task`] is the per-task state machine.
//! - [`controller`] holds the level-triggered controllers that read and
//!   write the store.
//! - [`r#loop`] drives a controller from store notifications plus periodic
//!   resyncs, and [`manager`] wires every loop of a process together.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use operator_commands::HostCommandDispatcher;
//! use operator_reconciler::{ControllerContext, Manager, ManagerConfig, SystemClock, TracingEventRecorder};
//! use operator_store::Store;
//!
//! #[tokio::main]
//! async fn main() -> operator_reconciler::Result<()> {
//!     let ctx = ControllerContext::new(
//!         Store::in_memory(),
//!         Arc::new(SystemClock),
//!         Arc::new(TracingEventRecorder),
//!     );
//!     let mut manager = Manager::new(
//!         ctx,
//!         Arc::new(HostCommandDispatcher::default()),
//!         ManagerConfig::default(),
//!     );
//!     manager.start_controllers();
//!     manager.start_agent("n1", "renew-certs");
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod clock;
pub mod controller;
pub mod error;
pub mod r#loop;
pub mod manager;
pub mod node_selector;
pub mod planner;
pub mod recorder;
pub mod runtime_task;
pub mod task_reconcile;
pub mod taskgroup_reconcile;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{
    Controller, ControllerContext, OperationController, RuntimeTaskController, TaskGroupController,
};
pub use error::{Error, Result};
pub use manager::{Manager, ManagerConfig};
pub use node_selector::select_nodes;
pub use planner::{labels_for_agent, plan};
pub use r#loop::{ControllerLoop, LoopConfig, LoopStopper};
pub use recorder::{
    EventRecorder, EventType, InMemoryEventRecorder, ObjectEvent, TracingEventRecorder,
};
pub use runtime_task::{RuntimeTaskMachine, StepOutcome, TaskContext};
pub use task_reconcile::{reconcile_tasks, TaskItem, TaskReconcileList};
pub use taskgroup_reconcile::{
    reconcile_task_groups, Classification, TaskGroupItem, TaskGroupReconcileList,
};
