//! Audit/security event records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::sandbox::SandboxId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    PolicyCreated,
    PolicyUpdated,
    PolicyDeleted,
    PermissionEvaluated,
    ModuleRejected,
    SandboxTransition,
    ResourceViolation,
    DocumentQuarantined,
    QuarantineReleased,
}

impl EventAction {
    pub fn as_str(self) -> &'static str {
        match self {
            EventAction::PolicyCreated => "policy_created",
            EventAction::PolicyUpdated => "policy_updated",
            EventAction::PolicyDeleted => "policy_deleted",
            EventAction::PermissionEvaluated => "permission_evaluated",
            EventAction::ModuleRejected => "module_rejected",
            EventAction::SandboxTransition => "sandbox_transition",
            EventAction::ResourceViolation => "resource_violation",
            EventAction::DocumentQuarantined => "document_quarantined",
            EventAction::QuarantineReleased => "quarantine_released",
        }
    }
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl EventSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            EventSeverity::Info => "info",
            EventSeverity::Low => "low",
            EventSeverity::Medium => "medium",
            EventSeverity::High => "high",
            EventSeverity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Allowed,
    Denied { code: String },
    Failure { code: String },
}

/// Immutable log entry. `seq` and `timestamp` are assigned by the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: EventAction,
    pub severity: EventSeverity,
    #[serde(default)]
    pub policy_id: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub sandbox_id: Option<SandboxId>,
    pub outcome: Outcome,
    pub description: String,
    #[serde(default)]
    pub details: Map<String, Value>,
}

/// Event under construction, before the log stamps it.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub actor: String,
    pub action: EventAction,
    pub severity: EventSeverity,
    pub policy_id: Option<String>,
    pub document_id: Option<String>,
    pub sandbox_id: Option<SandboxId>,
    pub outcome: Outcome,
    pub description: String,
    pub details: Map<String, Value>,
}

impl NewEvent {
    pub fn new(actor: impl Into<String>, action: EventAction, description: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            action,
            severity: EventSeverity::Info,
            policy_id: None,
            document_id: None,
            sandbox_id: None,
            outcome: Outcome::Success,
            description: description.into(),
            details: Map::new(),
        }
    }

    pub fn severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn policy(mut self, id: impl Into<String>) -> Self {
        self.policy_id = Some(id.into());
        self
    }

    pub fn document(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    pub fn sandbox(mut self, id: SandboxId) -> Self {
        self.sandbox_id = Some(id);
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn stamp(self, seq: u64, timestamp: DateTime<Utc>) -> SecurityEvent {
        SecurityEvent {
            id: Uuid::new_v4(),
            seq,
            timestamp,
            actor: self.actor,
            action: self.action,
            severity: self.severity,
            policy_id: self.policy_id,
            document_id: self.document_id,
            sandbox_id: self.sandbox_id,
            outcome: self.outcome,
            description: self.description,
            details: self.details,
        }
    }
}

/// Query filter; every field is optional and all present fields must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQuery {
    #[serde(default)]
    pub policy_id: Option<String>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Exclusive.
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    /// Minimum severity (inclusive).
    #[serde(default)]
    pub min_severity: Option<EventSeverity>,
    #[serde(default)]
    pub action: Option<EventAction>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_policy(id: impl Into<String>) -> Self {
        Self {
            policy_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, ev: &SecurityEvent) -> bool {
        if let Some(p) = &self.policy_id {
            if ev.policy_id.as_deref() != Some(p.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if ev.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if ev.timestamp >= until {
                return false;
            }
        }
        if let Some(min) = self.min_severity {
            if ev.severity < min {
                return false;
            }
        }
        if let Some(action) = self.action {
            if ev.action != action {
                return false;
            }
        }
        true
    }
}
