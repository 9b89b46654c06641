//! Phases shared by operations, task groups and runtime tasks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Externally visible lifecycle phase.
///
/// Always derived from status fields through [`PhaseInputs::derive`]; a stored
/// phase is a reporting copy, never an input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Pending,
    Running,
    Paused,
    Succeeded,
    Failed,
    Deleted,
}

impl Phase {
    /// Whether no further work will happen in this phase without outside input.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Deleted)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Deleted => "Deleted",
        };
        f.write_str(name)
    }
}

/// The status facts a phase is derived from. They can coexist freely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct PhaseInputs {
    pub deleted: bool,
    pub failed: bool,
    pub completed: bool,
    pub paused: bool,
    pub started: bool,
}

impl PhaseInputs {
    /// Apply the fixed precedence: deleted, failed, succeeded, paused, running, pending.
    pub const fn derive(self) -> Phase {
        if self.deleted {
            Phase::Deleted
        } else if self.failed {
            Phase::Failed
        } else if self.completed {
            Phase::Succeeded
        } else if self.paused {
            Phase::Paused
        } else if self.started {
            Phase::Running
        } else {
            Phase::Pending
        }
    }
}
