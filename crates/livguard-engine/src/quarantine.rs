//! Administrative hold on documents pending review.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;

use livguard_core::error::{LivGuardError, Result};
use livguard_core::event::{EventAction, EventSeverity, NewEvent};
use livguard_core::policy::EffectivePolicy;

use crate::audit::AuditLog;

// ten years
const MAX_QUARANTINE_SECS: u64 = 10 * 365 * 24 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarantineRecord {
    pub document_id: String,
    pub policy_id: String,
    pub reason: String,
    pub quarantined_by: String,
    pub quarantined_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl QuarantineRecord {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarantineRelease {
    pub record: QuarantineRecord,
    pub reviewer: String,
    pub notes: String,
    pub released_at: DateTime<Utc>,
}

pub struct QuarantineRegistry {
    records: DashMap<String, QuarantineRecord>,
    audit: Arc<AuditLog>,
}

impl QuarantineRegistry {
    pub fn new(audit: Arc<AuditLog>) -> Self {
        Self {
            records: DashMap::new(),
            audit,
        }
    }

    /// Hold `document_id` for the policy's quarantine duration. Only allowed
    /// when the effective policy enforces quarantine.
    pub fn quarantine(
        &self,
        document_id: &str,
        policy: &EffectivePolicy,
        reason: &str,
        actor: &str,
    ) -> Result<QuarantineRecord> {
        if !policy.admin.enforce_quarantine {
            return Err(LivGuardError::BadRequest(format!(
                "policy {} does not enforce quarantine",
                policy.policy_id
            )));
        }

        let now = Utc::now();
        let secs = policy.admin.quarantine_duration_secs.min(MAX_QUARANTINE_SECS) as i64;
        let expires_at = now + Duration::seconds(secs);
        let record = QuarantineRecord {
            document_id: document_id.to_string(),
            policy_id: policy.policy_id.clone(),
            reason: reason.to_string(),
            quarantined_by: actor.to_string(),
            quarantined_at: now,
            expires_at,
        };

        self.audit.record(
            NewEvent::new(
                actor,
                EventAction::DocumentQuarantined,
                format!("document {document_id} quarantined: {reason}"),
            )
            .policy(policy.policy_id.clone())
            .document(document_id)
            .severity(EventSeverity::High)
            .detail("expires_at", expires_at.to_rfc3339()),
        )?;

        self.records.insert(document_id.to_string(), record.clone());
        tracing::warn!(document = %document_id, policy = %policy.policy_id, %expires_at, "document quarantined");
        Ok(record)
    }

    pub fn release(&self, document_id: &str, reviewer: &str, notes: &str) -> Result<QuarantineRelease> {
        let now = Utc::now();
        let record = self
            .records
            .get(document_id)
            .map(|r| r.value().clone())
            .filter(|r| r.is_active_at(now))
            .ok_or_else(|| LivGuardError::NotFound(format!("quarantine for {document_id}")))?;

        self.audit.record(
            NewEvent::new(
                reviewer,
                EventAction::QuarantineReleased,
                format!("document {document_id} released from quarantine"),
            )
            .policy(record.policy_id.clone())
            .document(document_id)
            .severity(EventSeverity::Medium)
            .detail("notes", notes),
        )?;

        self.records.remove(document_id);
        tracing::info!(document = %document_id, reviewer, "quarantine released");
        Ok(QuarantineRelease {
            record,
            reviewer: reviewer.to_string(),
            notes: notes.to_string(),
            released_at: now,
        })
    }

    pub fn is_quarantined(&self, document_id: &str) -> bool {
        self.active(document_id).is_some()
    }

    /// Active record for `document_id`; expired ones are dropped on sight.
    pub fn active(&self, document_id: &str) -> Option<QuarantineRecord> {
        let now = Utc::now();
        let record = self.records.get(document_id).map(|r| r.value().clone())?;
        if record.is_active_at(now) {
            Some(record)
        } else {
            self.records
                .remove_if(document_id, |_, r| !r.is_active_at(now));
            None
        }
    }

    pub fn list(&self) -> Vec<QuarantineRecord> {
        let now = Utc::now();
        let mut out: Vec<QuarantineRecord> = self
            .records
            .iter()
            .filter(|r| r.value().is_active_at(now))
            .map(|r| r.value().clone())
            .collect();
        out.sort_by(|a, b| a.quarantined_at.cmp(&b.quarantined_at));
        out
    }
}
