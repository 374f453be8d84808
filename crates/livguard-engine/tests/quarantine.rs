//! Document quarantine and its effect on admission.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use chrono::Utc;

use livguard_core::error::ReasonCode;
use livguard_core::event::{EventAction, EventQuery, EventSeverity};
use livguard_core::policy::Policy;
use livguard_engine::quarantine::QuarantineRegistry;
use livguard_engine::resolver::merge_chain;

use fixtures::{audit, bundle, engine, load_request, Behavior};

fn quarantining_policy(duration_secs: u64) -> Policy {
    let mut p = Policy::new("strict", "Strict");
    p.admin.enforce_quarantine = true;
    p.admin.quarantine_duration_secs = duration_secs;
    p
}

#[test]
fn quarantine_requires_enforcing_policy() {
    let reg = QuarantineRegistry::new(audit());
    let eff = merge_chain(&[Arc::new(Policy::new("lax", "Lax"))]).unwrap();
    let err = reg.quarantine("doc-1", &eff, "suspicious", "alice").unwrap_err();
    assert_eq!(err.reason_code(), ReasonCode::BadRequest);
    assert!(!reg.is_quarantined("doc-1"));
}

#[test]
fn quarantine_and_release_are_audited() {
    let log = audit();
    let reg = QuarantineRegistry::new(Arc::clone(&log));
    let eff = merge_chain(&[Arc::new(quarantining_policy(3600))]).unwrap();

    let rec = reg.quarantine("doc-1", &eff, "macro payload", "alice").unwrap();
    assert_eq!(rec.policy_id, "strict");
    assert_eq!((rec.expires_at - rec.quarantined_at).num_seconds(), 3600);
    assert!(reg.is_quarantined("doc-1"));
    assert_eq!(reg.list().len(), 1);

    let released = reg.release("doc-1", "bob", "false positive").unwrap();
    assert_eq!(released.reviewer, "bob");
    assert_eq!(released.record.reason, "macro payload");
    assert!(!reg.is_quarantined("doc-1"));
    assert_eq!(reg.release("doc-1", "bob", "again").unwrap_err().reason_code(), ReasonCode::NotFound);

    let events = log.query(&EventQuery::all()).unwrap();
    assert_eq!(events[0].action, EventAction::DocumentQuarantined);
    assert_eq!(events[0].severity, EventSeverity::High);
    assert_eq!(events[1].action, EventAction::QuarantineReleased);
    assert_eq!(events[1].details["notes"], "false positive");
}

#[test]
fn expired_quarantine_is_inactive() {
    let reg = QuarantineRegistry::new(audit());
    let eff = merge_chain(&[Arc::new(quarantining_policy(0))]).unwrap();
    let rec = reg.quarantine("doc-1", &eff, "brief", "alice").unwrap();

    assert!(!rec.is_active_at(Utc::now()));
    assert!(!reg.is_quarantined("doc-1"));
    assert!(reg.list().is_empty());
}

#[test]
fn huge_duration_is_capped() {
    let reg = QuarantineRegistry::new(audit());
    let eff = merge_chain(&[Arc::new(quarantining_policy(u64::MAX))]).unwrap();
    let rec = reg.quarantine("doc-1", &eff, "forever", "alice").unwrap();
    assert!(rec.expires_at > rec.quarantined_at);
    assert!(reg.is_quarantined("doc-1"));
}

#[tokio::test]
async fn quarantined_document_cannot_load_modules() {
    let (engine, _) = engine(Behavior::Complete);
    engine.create_policy(quarantining_policy(3600), "alice").unwrap();
    engine
        .quarantine_document("doc-1", "strict", "reported by user", "alice")
        .unwrap();

    let err = engine
        .launch(load_request("doc-1", "strict", bundle("m", b"m")))
        .unwrap_err();
    assert_eq!(err.reason_code(), ReasonCode::DocumentQuarantined);

    engine.release_document("doc-1", "bob", "cleared").unwrap();
    let id = engine
        .launch(load_request("doc-1", "strict", bundle("m", b"m")))
        .unwrap();
    engine.wait_terminated(id).await.unwrap();
}
