//! Permission evaluation outcome.

use serde::{Deserialize, Serialize};

use crate::error::{LivGuardError, ReasonCode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny {
        code: ReasonCode,
        reason: String,
    },
}

impl Decision {
    pub fn deny(code: ReasonCode, reason: impl Into<String>) -> Self {
        Decision::Deny {
            code,
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Turn a denial into the admission error surfaced to the host.
    pub fn into_result(self) -> crate::Result<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny { code, reason } => Err(LivGuardError::PermissionDenied { code, reason }),
        }
    }
}
