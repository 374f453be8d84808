//! Permission evaluation.
//!
//! [`decide`] is a pure function of the request and the effective policy.
//! [`PermissionEvaluator`] wraps it with auditing: a decision that cannot be
//! logged is not returned.

use std::sync::Arc;

use livguard_core::decision::Decision;
use livguard_core::error::{ReasonCode, Result};
use livguard_core::event::{EventAction, EventSeverity, NewEvent, Outcome};
use livguard_core::policy::EffectivePolicy;
use livguard_core::request::PermissionRequest;

use crate::audit::AuditLog;
use crate::obs::EngineMetrics;

fn exceeds(requested: u64, ceiling: u64) -> bool {
    ceiling != 0 && requested > ceiling
}

/// Checks run in a fixed order: memory, CPU, networking, filesystem, imports.
/// The first failing check decides.
pub fn decide(req: &PermissionRequest, eff: &EffectivePolicy) -> Decision {
    let mem = eff.memory_ceiling();
    if exceeds(req.memory_limit, mem) {
        return Decision::deny(
            ReasonCode::MemoryLimitExceeded,
            format!("requested memory {} exceeds limit {}", req.memory_limit, mem),
        );
    }

    let cpu = eff.cpu_ceiling_ms();
    if exceeds(req.cpu_time_limit_ms, cpu) {
        return Decision::deny(
            ReasonCode::CpuTimeExceeded,
            format!(
                "requested cpu time {}ms exceeds limit {}ms",
                req.cpu_time_limit_ms, cpu
            ),
        );
    }

    if req.networking && !eff.security.wasm.allow_networking {
        return Decision::deny(
            ReasonCode::NetworkingNotAllowed,
            "networking is not allowed by policy",
        );
    }

    if req.file_system && !eff.security.wasm.allow_file_system {
        return Decision::deny(
            ReasonCode::FilesystemNotAllowed,
            "file system access is not allowed by policy",
        );
    }

    let denied: Vec<&str> = req
        .imports
        .iter()
        .filter(|i| !eff.security.wasm.allowed_imports.contains(*i))
        .map(String::as_str)
        .collect();
    if !denied.is_empty() {
        return Decision::deny(
            ReasonCode::ImportNotAllowed,
            format!("imports not allowed: {}", denied.join(", ")),
        );
    }

    Decision::Allow
}

/// Who is asking and for which document.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub actor: &'a str,
    pub document_id: Option<&'a str>,
}

pub struct PermissionEvaluator {
    audit: Arc<AuditLog>,
    metrics: Arc<EngineMetrics>,
}

impl PermissionEvaluator {
    pub fn new(audit: Arc<AuditLog>, metrics: Arc<EngineMetrics>) -> Self {
        Self { audit, metrics }
    }

    /// Decide and audit. `Err` only when the decision could not be logged.
    pub fn evaluate(
        &self,
        ctx: EvalContext<'_>,
        req: &PermissionRequest,
        eff: &EffectivePolicy,
    ) -> Result<Decision> {
        let decision = decide(req, eff);

        let (severity, outcome, result) = match &decision {
            Decision::Allow => (EventSeverity::Info, Outcome::Allowed, "allow"),
            Decision::Deny { code, .. } => (
                EventSeverity::Medium,
                Outcome::Denied {
                    code: code.as_str().to_string(),
                },
                "deny",
            ),
        };
        let description = match &decision {
            Decision::Allow => format!("permissions granted under {}", eff.policy_id),
            Decision::Deny { reason, .. } => reason.clone(),
        };

        let mut ev = NewEvent::new(ctx.actor, EventAction::PermissionEvaluated, description)
            .policy(eff.policy_id.clone())
            .severity(severity)
            .outcome(outcome)
            .detail("memory_limit", req.memory_limit)
            .detail("cpu_time_limit_ms", req.cpu_time_limit_ms)
            .detail("networking", req.networking)
            .detail("file_system", req.file_system)
            .detail(
                "imports",
                req.imports.iter().cloned().collect::<Vec<String>>(),
            );
        if let Some(doc) = ctx.document_id {
            ev = ev.document(doc);
        }
        self.audit.record(ev)?;

        self.metrics.evaluations.inc(&[("result", result)]);
        if let Decision::Deny { code, .. } = &decision {
            tracing::info!(policy = %eff.policy_id, actor = ctx.actor, code = code.as_str(), "permission denied");
        }
        Ok(decision)
    }
}
