//! Sandbox state machine, decisions and event filters.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use chrono::{Duration, TimeZone, Utc};

use livguard_core::decision::Decision;
use livguard_core::error::{LivGuardError, ReasonCode};
use livguard_core::event::{EventAction, EventQuery, EventSeverity, NewEvent, Outcome};
use livguard_core::sandbox::{SandboxState, StopReason};

use SandboxState::*;

const ALL: [SandboxState; 6] = [Created, Initializing, Running, Suspended, Terminating, Terminated];

#[test]
fn allowed_transitions() {
    let allowed = [
        (Created, Initializing),
        (Initializing, Running),
        (Initializing, Terminating),
        (Running, Suspended),
        (Running, Terminating),
        (Suspended, Running),
        (Suspended, Terminating),
        (Terminating, Terminated),
    ];
    for from in ALL {
        for to in ALL {
            assert_eq!(
                from.can_transition_to(to),
                allowed.contains(&(from, to)),
                "{from} -> {to}"
            );
        }
    }
}

#[test]
fn terminated_is_absorbing() {
    assert!(Terminated.is_final());
    assert!(!Terminated.is_live());
    for to in ALL {
        let err = Terminated.check_transition(to).unwrap_err();
        assert!(matches!(err, LivGuardError::InvalidState { .. }));
    }
}

#[test]
fn stop_reasons_serialize_with_tag() {
    let v = serde_json::to_value(StopReason::CriticalViolation {
        code: "memory_exceeded".into(),
    })
    .unwrap();
    assert_eq!(v["reason"], "critical_violation");
    assert_eq!(v["code"], "memory_exceeded");
    assert_eq!(StopReason::Completed.as_str(), "completed");
}

#[test]
fn deny_becomes_permission_denied() {
    assert!(Decision::Allow.into_result().is_ok());
    let err = Decision::deny(ReasonCode::FilesystemNotAllowed, "no fs")
        .into_result()
        .unwrap_err();
    assert_eq!(err.reason_code(), ReasonCode::FilesystemNotAllowed);
}

#[test]
fn event_query_filters() {
    let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
    let ev = NewEvent::new("alice", EventAction::PermissionEvaluated, "denied")
        .policy("basic")
        .severity(EventSeverity::Medium)
        .outcome(Outcome::Denied {
            code: "networking_not_allowed".into(),
        })
        .stamp(1, t0);

    assert!(EventQuery::all().matches(&ev));
    assert!(EventQuery::for_policy("basic").matches(&ev));
    assert!(!EventQuery::for_policy("other").matches(&ev));

    let window = EventQuery {
        since: Some(t0),
        until: Some(t0 + Duration::seconds(1)),
        ..EventQuery::default()
    };
    assert!(window.matches(&ev));

    let until_excl = EventQuery {
        until: Some(t0),
        ..EventQuery::default()
    };
    assert!(!until_excl.matches(&ev));

    let min_inclusive = EventQuery {
        min_severity: Some(EventSeverity::Medium),
        ..EventQuery::default()
    };
    assert!(min_inclusive.matches(&ev));

    let too_high = EventQuery {
        min_severity: Some(EventSeverity::High),
        ..EventQuery::default()
    };
    assert!(!too_high.matches(&ev));

    let wrong_action = EventQuery {
        action: Some(EventAction::PolicyCreated),
        ..EventQuery::default()
    };
    assert!(!wrong_action.matches(&ev));
}
