//! Operations: the top-level desired-state objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::meta::{Labels, Object, ObjectKind, ObjectMeta};
use crate::phase::{Phase, PhaseInputs};
use crate::status_error::{OperationError, OperationErrorReason};
use crate::taskgroup::RuntimeTaskGroup;

/// How runtime tasks advance between commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Run every command back to back.
    #[default]
    #[serde(alias = "auto")]
    Auto,
    /// Pause the task after every successful command.
    #[serde(alias = "controlled")]
    Controlled,
    /// Do not dispatch; wait a fixed delay and treat the command as successful.
    #[serde(alias = "dryRun")]
    DryRun,
}

/// Renew the certificates on every control-plane node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewCertificatesSpec {}

/// Upgrade the cluster to a kubernetes version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeSpec {
    #[serde(default)]
    pub kubernetes_version: String,
}

/// A user-supplied list of task groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomSpec {
    #[serde(default)]
    pub workflow: Vec<RuntimeTaskGroup>,
}

/// What an operation does. Exactly one kind per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationDescriptor {
    RenewCertificates(RenewCertificatesSpec),
    Upgrade(UpgradeSpec),
    Custom(CustomSpec),
}

impl OperationDescriptor {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RenewCertificates(_) => "renewCertificates",
            Self::Upgrade(_) => "upgrade",
            Self::Custom(_) => "custom",
        }
    }
}

/// Desired state of an operation.
///
/// On the wire the descriptor is three optional fields; setting more than one
/// is rejected when deserializing. Setting none is accepted and fails later,
/// at planning time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOperationSpec", into = "RawOperationSpec")]
pub struct OperationSpec {
    pub paused: bool,
    pub execution_mode: ExecutionMode,
    pub descriptor: Option<OperationDescriptor>,
}

impl OperationSpec {
    /// Build a spec with the given descriptor.
    pub fn new(descriptor: OperationDescriptor) -> Self {
        Self {
            descriptor: Some(descriptor),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOperationSpec {
    #[serde(default)]
    paused: bool,
    #[serde(default)]
    execution_mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    renew_certificates: Option<RenewCertificatesSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    upgrade: Option<UpgradeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom: Option<CustomSpec>,
}

impl TryFrom<RawOperationSpec> for OperationSpec {
    type Error = ApiError;

    fn try_from(raw: RawOperationSpec) -> Result<Self, Self::Error> {
        let mut descriptors: Vec<OperationDescriptor> = raw
            .renew_certificates
            .map(OperationDescriptor::RenewCertificates)
            .into_iter()
            .chain(raw.upgrade.map(OperationDescriptor::Upgrade))
            .chain(raw.custom.map(OperationDescriptor::Custom))
            .collect();

        if descriptors.len() > 1 {
            return Err(ApiError::ambiguous_descriptor(
                descriptors.iter().map(OperationDescriptor::kind),
            ));
        }

        Ok(Self {
            paused: raw.paused,
            execution_mode: raw.execution_mode,
            descriptor: descriptors.pop(),
        })
    }
}

impl From<OperationSpec> for RawOperationSpec {
    fn from(spec: OperationSpec) -> Self {
        let mut raw = Self {
            paused: spec.paused,
            execution_mode: spec.execution_mode,
            ..Self::default()
        };
        match spec.descriptor {
            Some(OperationDescriptor::RenewCertificates(s)) => raw.renew_certificates = Some(s),
            Some(OperationDescriptor::Upgrade(s)) => raw.upgrade = Some(s),
            Some(OperationDescriptor::Custom(s)) => raw.custom = Some(s),
            None => {}
        }
        raw
    }
}

/// Observed state of an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub groups: u32,
    #[serde(default)]
    pub running_groups: u32,
    #[serde(default)]
    pub succeeded_groups: u32,
    #[serde(default)]
    pub failed_groups: u32,
    #[serde(default)]
    pub invalid_groups: u32,
    /// Labels selecting the nodes that need an agent.
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub agent_node_selector: Labels,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<OperationErrorReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl OperationStatus {
    /// Mark the operation completed. Clears the pause flag and any error.
    pub fn set_completion_time(&mut self, now: DateTime<Utc>) {
        self.completion_time = Some(now);
        self.paused = false;
        self.reset_error();
    }

    pub fn set_error(&mut self, error: &OperationError) {
        self.error_reason = Some(error.reason);
        self.error_message = Some(error.message.clone());
    }

    pub fn reset_error(&mut self) {
        self.error_reason = None;
        self.error_message = None;
    }

    pub const fn has_error(&self) -> bool {
        self.error_message.is_some()
    }
}

/// A cluster-wide action decomposed into task groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: OperationSpec,
    #[serde(default)]
    pub status: OperationStatus,
}

impl Operation {
    /// Create an operation with the given descriptor.
    pub fn new(name: impl Into<String>, descriptor: OperationDescriptor) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            spec: OperationSpec::new(descriptor),
            status: OperationStatus::default(),
        }
    }

    #[must_use]
    pub const fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.spec.execution_mode = mode;
        self
    }

    /// Derive the phase from the status fields.
    pub const fn derive_phase(&self) -> Phase {
        PhaseInputs {
            deleted: self.metadata.is_deleted(),
            failed: self.status.has_error(),
            completed: self.status.completion_time.is_some(),
            paused: self.status.paused,
            started: self.status.start_time.is_some(),
        }
        .derive()
    }
}

impl Object for Operation {
    const KIND: ObjectKind = ObjectKind::Operation;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
