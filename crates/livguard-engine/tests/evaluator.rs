//! Permission evaluation against effective policies.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use proptest::prelude::*;

use livguard_core::decision::Decision;
use livguard_core::error::ReasonCode;
use livguard_core::event::{EventAction, EventQuery, Outcome};
use livguard_core::policy::{EffectivePolicy, Policy};
use livguard_core::request::PermissionRequest;
use livguard_engine::audit::AuditLog;
use livguard_engine::evaluator::{decide, EvalContext, PermissionEvaluator};
use livguard_engine::resolver::{merge_chain, PolicyResolver};

use fixtures::{metrics, store, FlakySink, MB};

fn effective(p: Policy) -> EffectivePolicy {
    merge_chain(&[Arc::new(p)]).unwrap()
}

fn denied_code(d: &Decision) -> Option<ReasonCode> {
    match d {
        Decision::Allow => None,
        Decision::Deny { code, .. } => Some(*code),
    }
}

#[test]
fn inherited_networking_ban_denies() {
    let s = store(5);
    s.create(Policy::new("root", "Root"), "alice").unwrap();
    let mut child = Policy::new("child", "Child").with_parent("root");
    child.security.wasm.allow_networking = true;
    s.create(child, "alice").unwrap();

    let eff = PolicyResolver::new(s, metrics()).resolve("child").unwrap();
    let req = PermissionRequest::new(MB, 1000).with_networking(true);
    assert_eq!(denied_code(&decide(&req, &eff)), Some(ReasonCode::NetworkingNotAllowed));
}

#[test]
fn checks_run_in_fixed_order() {
    let eff = effective(Policy::new("p", "P"));

    let everything_wrong = PermissionRequest::new(1024 * MB, 60_000)
        .with_networking(true)
        .with_file_system(true)
        .with_imports(["fs"]);
    assert_eq!(
        denied_code(&decide(&everything_wrong, &eff)),
        Some(ReasonCode::MemoryLimitExceeded)
    );

    let cpu = PermissionRequest::new(MB, 60_000).with_networking(true);
    assert_eq!(denied_code(&decide(&cpu, &eff)), Some(ReasonCode::CpuTimeExceeded));

    let fs = PermissionRequest::new(MB, 1000).with_file_system(true).with_imports(["fs"]);
    assert_eq!(denied_code(&decide(&fs, &eff)), Some(ReasonCode::FilesystemNotAllowed));

    let imports = PermissionRequest::new(MB, 1000).with_imports(["console", "fs", "net"]);
    match decide(&imports, &eff) {
        Decision::Deny { code, reason } => {
            assert_eq!(code, ReasonCode::ImportNotAllowed);
            assert!(reason.contains("fs, net"));
        }
        Decision::Allow => panic!("imports must be denied"),
    }
}

#[test]
fn request_at_the_ceiling_is_allowed() {
    let mut p = Policy::new("p", "P");
    p.security.wasm.memory_limit = 8 * MB;
    p.limits.max_memory_per_document = 0;
    let eff = effective(p);

    assert_eq!(decide(&PermissionRequest::new(8 * MB, 5000), &eff), Decision::Allow);
    assert_eq!(
        denied_code(&decide(&PermissionRequest::new(8 * MB + 1, 5000), &eff)),
        Some(ReasonCode::MemoryLimitExceeded)
    );
}

#[test]
fn per_document_limit_also_bounds_memory() {
    let mut p = Policy::new("p", "P");
    p.security.wasm.memory_limit = 32 * MB;
    p.limits.max_memory_per_document = 12 * MB;
    let eff = effective(p);
    assert_eq!(
        denied_code(&decide(&PermissionRequest::new(16 * MB, 100), &eff)),
        Some(ReasonCode::MemoryLimitExceeded)
    );
}

#[test]
fn every_decision_is_audited() {
    let audit = Arc::new(AuditLog::in_memory(metrics()));
    let m = metrics();
    let ev = PermissionEvaluator::new(Arc::clone(&audit), Arc::clone(&m));
    let eff = effective(Policy::new("p", "P"));
    let ctx = EvalContext {
        actor: "viewer",
        document_id: Some("doc-1"),
    };

    ev.evaluate(ctx, &PermissionRequest::new(MB, 100), &eff).unwrap();
    ev.evaluate(ctx, &PermissionRequest::new(MB, 100).with_networking(true), &eff)
        .unwrap();

    let events = audit
        .query(&EventQuery {
            action: Some(EventAction::PermissionEvaluated),
            ..EventQuery::default()
        })
        .unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].outcome, Outcome::Allowed);
    assert_eq!(
        events[1].outcome,
        Outcome::Denied {
            code: "networking_not_allowed".into()
        }
    );
    assert_eq!(events[1].document_id.as_deref(), Some("doc-1"));
    assert_eq!(events[1].details["networking"], true);
    assert_eq!(m.evaluations.get(&[("result", "allow")]), 1);
    assert_eq!(m.evaluations.get(&[("result", "deny")]), 1);
}

#[test]
fn unloggable_decision_is_an_error() {
    let sink = Arc::new(FlakySink::default());
    let audit = Arc::new(AuditLog::open(sink.clone(), metrics()).unwrap());
    let ev = PermissionEvaluator::new(audit, metrics());
    let eff = effective(Policy::new("p", "P"));
    sink.fail(true);

    let err = ev
        .evaluate(
            EvalContext {
                actor: "viewer",
                document_id: None,
            },
            &PermissionRequest::new(MB, 100),
            &eff,
        )
        .unwrap_err();
    assert_eq!(err.reason_code(), ReasonCode::LogUnavailable);
}

proptest! {
    #[test]
    fn decisions_are_deterministic(
        mem in 0u64..=256 * MB,
        cpu in 0u64..=60_000,
        net in any::<bool>(),
        fs in any::<bool>(),
        extra_import in any::<bool>(),
    ) {
        let eff = effective(Policy::new("p", "P"));
        let mut req = PermissionRequest::new(mem, cpu)
            .with_networking(net)
            .with_file_system(fs);
        if extra_import {
            req = req.with_imports(["console", "wasi"]);
        }
        let first = decide(&req, &eff);
        prop_assert_eq!(first.clone(), decide(&req, &eff));

        let within = mem <= eff.memory_ceiling()
            && cpu <= eff.cpu_ceiling_ms()
            && !net
            && !fs
            && !extra_import;
        prop_assert_eq!(first.is_allowed(), within);
    }
}
