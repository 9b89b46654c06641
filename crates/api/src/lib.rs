//! Object model of the kubeadm operator.
//!
//! Three object kinds form a strict ownership tree:
//!
//! - [`Operation`]: a cluster-wide action (renew certificates, upgrade, custom workflow)
//! - [`RuntimeTaskGroup`]: an ordered, node-selector-scoped unit of an operation
//! - [`RuntimeTask`]: one task group instance bound to a single node, holding a
//!   queue of [`CommandDescriptor`]s
//!
//! Status phases are never authoritative: every object derives its [`Phase`]
//! from the status fields it carries.

pub mod command;
pub mod error;
pub mod labels;
pub mod meta;
pub mod operation;
pub mod phase;
pub mod runtimetask;
pub mod status_error;
pub mod taskgroup;

pub use command::CommandDescriptor;
pub use error::{ApiError, Result};
pub use labels::{
    LabelSelector, LabelSelectorRequirement, SelectorOperator, CONTROL_PLANE_LABEL,
    OPERATION_NAME_LABEL, OPERATION_UID_LABEL, TASK_GROUP_NAME_LABEL, TASK_GROUP_ORDER_LABEL,
};
pub use meta::{Labels, Node, Object, ObjectKind, ObjectMeta, OwnerReference, Uid};
pub use operation::{
    CustomSpec, ExecutionMode, Operation, OperationDescriptor, OperationSpec, OperationStatus,
    RenewCertificatesSpec, UpgradeSpec,
};
pub use phase::{Phase, PhaseInputs};
pub use runtimetask::{
    RecoveryMode, RuntimeTask, RuntimeTaskSpec, RuntimeTaskStatus, RuntimeTaskTemplate,
};
pub use status_error::{
    OperationError, OperationErrorReason, RuntimeTaskError, RuntimeTaskErrorReason, StatusError,
    TaskGroupError, TaskGroupErrorReason,
};
pub use taskgroup::{
    CreateStrategy, NodeFilter, RuntimeTaskGroup, RuntimeTaskGroupSpec, RuntimeTaskGroupStatus,
};
