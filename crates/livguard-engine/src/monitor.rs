//! Resource monitor.
//!
//! Each registered sandbox carries a frozen effective policy and one
//! consecutive-breach counter per [`LimitKind`]. A sample strictly above a
//! ceiling is a violation; the N-th consecutive breach of the same dimension
//! (N = `critical_after`) and every one after it is critical. A clean reading
//! resets that dimension only.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use livguard_core::error::{LivGuardError, Result};
use livguard_core::event::{EventAction, EventSeverity, NewEvent, Outcome};
use livguard_core::policy::EffectivePolicy;
use livguard_core::sample::{
    LimitKind, MonitorReport, ResourceSample, Violation, ViolationSeverity,
};
use livguard_core::sandbox::SandboxId;

use crate::audit::AuditLog;
use crate::config::MonitorSection;
use crate::obs::EngineMetrics;

struct Watch {
    policy: Arc<EffectivePolicy>,
    document_id: String,
    last_ts: Option<DateTime<Utc>>,
    consecutive: [u32; LimitKind::ALL.len()],
    latest: Option<ResourceSample>,
}

pub struct ResourceMonitor {
    watches: DashMap<SandboxId, Arc<Mutex<Watch>>>,
    audit: Arc<AuditLog>,
    metrics: Arc<EngineMetrics>,
    cfg: MonitorSection,
}

impl ResourceMonitor {
    pub fn new(cfg: MonitorSection, audit: Arc<AuditLog>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            watches: DashMap::new(),
            audit,
            metrics,
            cfg,
        }
    }

    pub fn settings(&self) -> &MonitorSection {
        &self.cfg
    }

    pub fn register(&self, sandbox_id: SandboxId, document_id: &str, policy: Arc<EffectivePolicy>) {
        self.watches.insert(
            sandbox_id,
            Arc::new(Mutex::new(Watch {
                policy,
                document_id: document_id.to_string(),
                last_ts: None,
                consecutive: [0; LimitKind::ALL.len()],
                latest: None,
            })),
        );
    }

    pub fn unregister(&self, sandbox_id: SandboxId) {
        self.watches.remove(&sandbox_id);
    }

    pub fn is_watching(&self, sandbox_id: SandboxId) -> bool {
        self.watches.contains_key(&sandbox_id)
    }

    pub fn latest(&self, sandbox_id: SandboxId) -> Option<ResourceSample> {
        let watch = self.watches.get(&sandbox_id).map(|r| Arc::clone(r.value()))?;
        let g = watch.lock().ok()?;
        g.latest.clone()
    }

    /// Classify one sample. Violations are audited before the counters move;
    /// if any audit append fails the observation fails and nothing changes.
    pub fn observe(&self, sandbox_id: SandboxId, sample: ResourceSample) -> Result<MonitorReport> {
        let watch = self
            .watches
            .get(&sandbox_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| LivGuardError::NotFound(format!("sandbox {sandbox_id}")))?;
        let mut w = watch
            .lock()
            .map_err(|_| LivGuardError::Internal("monitor lock poisoned".into()))?;

        if let Some(last) = w.last_ts {
            if sample.timestamp < last {
                return Err(LivGuardError::BadRequest(format!(
                    "out-of-order sample for {sandbox_id}: {} < {}",
                    sample.timestamp, last
                )));
            }
        }

        let critical_after = self.cfg.critical_after.max(1);
        let mut counters = w.consecutive;
        let mut violations = Vec::new();

        for kind in LimitKind::ALL {
            let ceiling = kind.ceiling(&w.policy);
            let observed = sample.value(kind);
            let slot = &mut counters[kind as usize];

            if ceiling != 0 && observed > ceiling {
                *slot = slot.saturating_add(1);
                let severity = if *slot >= critical_after {
                    ViolationSeverity::Critical
                } else {
                    ViolationSeverity::Warning
                };
                violations.push(Violation {
                    policy_id: w.policy.policy_id.clone(),
                    sandbox_id,
                    limit: kind,
                    observed,
                    limit_value: ceiling,
                    timestamp: sample.timestamp,
                    severity,
                    consecutive: *slot,
                });
            } else {
                *slot = 0;
            }
        }

        for v in &violations {
            let severity = match v.severity {
                ViolationSeverity::Warning => EventSeverity::Medium,
                ViolationSeverity::Critical => EventSeverity::Critical,
            };
            self.audit.record(
                NewEvent::new("monitor", EventAction::ResourceViolation, v.explanation())
                    .policy(v.policy_id.clone())
                    .document(w.document_id.clone())
                    .sandbox(sandbox_id)
                    .severity(severity)
                    .outcome(Outcome::Failure { code: v.code() })
                    .detail("limit", v.limit.as_str())
                    .detail("observed", v.observed)
                    .detail("limit_value", v.limit_value)
                    .detail("consecutive", v.consecutive),
            )?;
        }

        w.consecutive = counters;
        w.last_ts = Some(sample.timestamp);
        w.latest = Some(sample.clone());

        for v in &violations {
            let sev = match v.severity {
                ViolationSeverity::Warning => "warning",
                ViolationSeverity::Critical => "critical",
            };
            self.metrics
                .violations
                .inc(&[("limit", v.limit.as_str()), ("severity", sev)]);
            tracing::warn!(
                sandbox = %sandbox_id,
                policy = %v.policy_id,
                limit = v.limit.as_str(),
                observed = v.observed,
                limit_value = v.limit_value,
                severity = sev,
                "resource violation"
            );
        }

        Ok(MonitorReport {
            sandbox_id,
            timestamp: sample.timestamp,
            violations,
        })
    }
}
