//! Administrative reports derived from the store and the audit log.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use livguard_core::error::{LivGuardError, Result};
use livguard_core::event::{EventAction, EventQuery, EventSeverity};
use livguard_core::policy::{DomAccess, ExecutionMode, Policy};

use crate::audit::AuditLog;
use crate::resolver::walk_chain;
use crate::store::PolicyStore;

const PERMISSIVE_MEMORY: u64 = 64 * 1024 * 1024;
const PERMISSIVE_DOCUMENT_SIZE: u64 = 100 * 1024 * 1024;
// per-policy checks behind the compliance score
const CHECKS_PER_POLICY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    CycleDetected,
    DepthExceeded,
    OrphanedParent,
    MissingDefaultPolicy,
    OverlyPermissivePolicy,
    MissingAuditLogging,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    pub policy_id: Option<String>,
    pub description: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    Healthy,
    MinorIssues,
    Warning,
    Critical,
}

impl SystemStatus {
    pub fn from_issues(issues: &[ValidationIssue]) -> Self {
        match issues.iter().map(|i| i.severity).max() {
            None => SystemStatus::Healthy,
            Some(IssueSeverity::Critical) => SystemStatus::Critical,
            Some(IssueSeverity::High) => SystemStatus::Warning,
            Some(_) => SystemStatus::MinorIssues,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemReport {
    pub timestamp: DateTime<Utc>,
    pub total_policies: usize,
    pub issues: Vec<ValidationIssue>,
    pub recommendations: Vec<String>,
    pub overall_status: SystemStatus,
}

/// Settings that widen what embedded code may do.
pub fn is_overly_permissive(p: &Policy) -> bool {
    let wasm = &p.security.wasm;
    let js = &p.security.js;
    wasm.memory_limit > PERMISSIVE_MEMORY
        || wasm.allow_networking
        || wasm.allow_file_system
        || js.execution_mode == ExecutionMode::Trusted
        || js.dom_access == DomAccess::Write
        || p.security.network.allow_outbound
        || p.admin.max_document_size == 0
        || p.admin.max_document_size > PERMISSIVE_DOCUMENT_SIZE
        || !p.admin.require_signature
}

pub fn validate_system(store: &PolicyStore) -> SystemReport {
    let policies = store.list();
    let mut issues = Vec::new();

    for p in &policies {
        if let Err(e) = walk_chain(|id| store.snapshot(id), &p.id, store.max_depth()) {
            let (kind, severity) = match &e {
                LivGuardError::CycleDetected { .. } => {
                    (IssueKind::CycleDetected, IssueSeverity::Critical)
                }
                LivGuardError::DepthExceeded { .. } => {
                    (IssueKind::DepthExceeded, IssueSeverity::High)
                }
                _ => (IssueKind::OrphanedParent, IssueSeverity::High),
            };
            issues.push(ValidationIssue {
                kind,
                severity,
                policy_id: Some(p.id.clone()),
                description: e.to_string(),
                recommendation: "Repair the inheritance chain".into(),
            });
        }
    }

    let has_default = store
        .default_policy_id()
        .map(|id| store.contains(id))
        .unwrap_or(false);
    if !has_default {
        issues.push(ValidationIssue {
            kind: IssueKind::MissingDefaultPolicy,
            severity: IssueSeverity::High,
            policy_id: None,
            description: "No default security policy configured".into(),
            recommendation: "Create a default security policy for fallback scenarios".into(),
        });
    }

    for p in &policies {
        if is_overly_permissive(p) {
            issues.push(ValidationIssue {
                kind: IssueKind::OverlyPermissivePolicy,
                severity: IssueSeverity::Medium,
                policy_id: Some(p.id.clone()),
                description: format!("Policy {} has overly permissive settings", p.id),
                recommendation: "Review and tighten security settings".into(),
            });
        }
    }

    for p in &policies {
        if !p.events.enable_audit_log {
            issues.push(ValidationIssue {
                kind: IssueKind::MissingAuditLogging,
                severity: IssueSeverity::Medium,
                policy_id: Some(p.id.clone()),
                description: format!("Policy {} does not have audit logging enabled", p.id),
                recommendation: "Enable audit logging for compliance and security monitoring"
                    .into(),
            });
        }
    }

    let recommendations = if issues.is_empty() {
        vec!["System security configuration appears to be well-configured".to_string()]
    } else {
        vec![
            "Address identified security configuration issues".to_string(),
            "Regularly review and update security policies".to_string(),
            "Monitor security events and audit logs".to_string(),
        ]
    };

    SystemReport {
        timestamp: Utc::now(),
        total_policies: policies.len(),
        overall_status: SystemStatus::from_issues(&issues),
        issues,
        recommendations,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn from_violations(n: usize) -> Self {
        match n {
            n if n > 50 => ThreatLevel::Critical,
            n if n > 20 => ThreatLevel::High,
            n if n > 5 => ThreatLevel::Medium,
            _ => ThreatLevel::Low,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityMetrics {
    pub total_policies: usize,
    /// `gdpr`, `hipaa`, `signed`.
    pub policy_distribution: BTreeMap<String, usize>,
    pub violations_last_24h: usize,
    pub violations_by_limit: BTreeMap<String, usize>,
    pub compliance_score: f64,
    pub threat_level: ThreatLevel,
}

/// 100 with no policies; otherwise the share of per-policy checks not
/// consumed by recent violations, floored at 0.
pub fn compliance_score(policies: usize, violations: usize) -> f64 {
    let checks = policies * CHECKS_PER_POLICY;
    if checks == 0 {
        return 100.0;
    }
    let score = (checks as f64 - violations as f64) / checks as f64 * 100.0;
    score.max(0.0)
}

pub fn security_metrics(store: &PolicyStore, audit: &AuditLog) -> Result<SecurityMetrics> {
    let policies = store.list();
    let mut distribution: BTreeMap<String, usize> = BTreeMap::new();
    for p in &policies {
        if p.compliance.gdpr {
            *distribution.entry("gdpr".into()).or_default() += 1;
        }
        if p.compliance.hipaa {
            *distribution.entry("hipaa".into()).or_default() += 1;
        }
        if p.admin.require_signature {
            *distribution.entry("signed".into()).or_default() += 1;
        }
    }

    let now = Utc::now();
    let violations = audit.query(&EventQuery {
        since: Some(now - Duration::hours(24)),
        action: Some(EventAction::ResourceViolation),
        ..EventQuery::default()
    })?;

    let mut by_limit: BTreeMap<String, usize> = BTreeMap::new();
    for ev in &violations {
        let kind = ev
            .details
            .get("limit")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        *by_limit.entry(kind.to_string()).or_default() += 1;
    }

    Ok(SecurityMetrics {
        total_policies: policies.len(),
        policy_distribution: distribution,
        violations_last_24h: violations.len(),
        violations_by_limit: by_limit,
        compliance_score: compliance_score(policies.len(), violations.len()),
        threat_level: ThreatLevel::from_violations(violations.len()),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ActorCount {
    pub actor: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventStatistics {
    pub total_events: usize,
    pub by_action: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    /// `YYYY-MM-DD HH` buckets.
    pub by_hour: BTreeMap<String, usize>,
    /// Most active first.
    pub top_actors: Vec<ActorCount>,
}

pub const TOP_ACTORS: usize = 10;

/// Counts over `[since, until)`.
pub fn event_statistics(
    audit: &AuditLog,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> Result<EventStatistics> {
    let events = audit.query(&EventQuery {
        since,
        until,
        ..EventQuery::default()
    })?;

    let mut by_action: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_hour: BTreeMap<String, usize> = BTreeMap::new();
    let mut actors: BTreeMap<&str, usize> = BTreeMap::new();

    for ev in &events {
        *by_action.entry(ev.action.as_str().into()).or_default() += 1;
        *by_severity.entry(ev.severity.as_str().into()).or_default() += 1;
        *by_hour
            .entry(ev.timestamp.format("%Y-%m-%d %H").to_string())
            .or_default() += 1;
        if !ev.actor.is_empty() {
            *actors.entry(ev.actor.as_str()).or_default() += 1;
        }
    }

    let mut top_actors: Vec<ActorCount> = actors
        .into_iter()
        .map(|(actor, count)| ActorCount {
            actor: actor.to_string(),
            count,
        })
        .collect();
    top_actors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.actor.cmp(&b.actor)));
    top_actors.truncate(TOP_ACTORS);

    Ok(EventStatistics {
        total_events: events.len(),
        by_action,
        by_severity,
        by_hour,
        top_actors,
    })
}

/// Events at or above `min` in the last 24 hours.
pub fn recent_alerts(audit: &AuditLog, min: EventSeverity) -> Result<usize> {
    audit.count(&EventQuery {
        since: Some(Utc::now() - Duration::hours(24)),
        min_severity: Some(min),
        ..EventQuery::default()
    })
}
