//! Sandbox identity and lifecycle state machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LivGuardError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SandboxId(pub Uuid);

impl SandboxId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SandboxId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of one isolated execution.
///
/// ```text
/// Created -> Initializing -> Running -> Suspended -> Running
///                  |            |           |
///                  +------> Terminating <---+
///                               |
///                           Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Created,
    Initializing,
    Running,
    Suspended,
    Terminating,
    Terminated,
}

impl SandboxState {
    pub fn as_str(self) -> &'static str {
        match self {
            SandboxState::Created => "created",
            SandboxState::Initializing => "initializing",
            SandboxState::Running => "running",
            SandboxState::Suspended => "suspended",
            SandboxState::Terminating => "terminating",
            SandboxState::Terminated => "terminated",
        }
    }

    pub fn can_transition_to(self, next: SandboxState) -> bool {
        use SandboxState::*;
        matches!(
            (self, next),
            (Created, Initializing)
                | (Initializing, Running)
                | (Initializing, Terminating)
                | (Running, Suspended)
                | (Running, Terminating)
                | (Suspended, Running)
                | (Suspended, Terminating)
                | (Terminating, Terminated)
        )
    }

    /// Validate a transition, returning `InvalidState` when it is not allowed.
    pub fn check_transition(self, next: SandboxState) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(LivGuardError::InvalidState {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }

    pub fn is_final(self) -> bool {
        self == SandboxState::Terminated
    }

    /// Still holding resources.
    pub fn is_live(self) -> bool {
        !matches!(self, SandboxState::Terminated)
    }
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an instance was torn down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// Module returned from its entry point.
    Completed,
    /// Module returned an error.
    Failed { message: String },
    /// Explicit stop request from the host or an operator.
    Requested { actor: String },
    /// Wall-clock budget exhausted.
    Timeout { after_secs: u64 },
    /// Sustained breach of a hard ceiling.
    CriticalViolation { code: String },
    /// Monitoring could not be audited; fail closed.
    AuditFailure { message: String },
    /// The isolated context could not be constructed.
    InitFailed { message: String },
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Completed => "completed",
            StopReason::Failed { .. } => "failed",
            StopReason::Requested { .. } => "requested",
            StopReason::Timeout { .. } => "timeout",
            StopReason::CriticalViolation { .. } => "critical_violation",
            StopReason::AuditFailure { .. } => "audit_failure",
            StopReason::InitFailed { .. } => "init_failed",
        }
    }
}
