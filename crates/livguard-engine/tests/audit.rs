//! Audit log ordering, querying and file-backed replay.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::io::Write;
use std::sync::Arc;

use livguard_core::error::ReasonCode;
use livguard_core::event::{EventAction, EventQuery, EventSeverity, NewEvent};
use livguard_engine::audit::{AuditLog, FileSink};

use fixtures::{metrics, FlakySink};

fn event(i: u64) -> NewEvent {
    let severity = if i % 2 == 0 {
        EventSeverity::Info
    } else {
        EventSeverity::High
    };
    NewEvent::new(format!("actor-{}", i % 3), EventAction::PolicyUpdated, format!("update {i}"))
        .policy(if i < 5 { "a" } else { "b" })
        .severity(severity)
        .detail("i", i)
}

#[test]
fn query_returns_events_in_write_order() {
    let log = AuditLog::in_memory(metrics());
    let written: Vec<u64> = (0..10).map(|i| log.record(event(i)).unwrap().seq).collect();
    assert!(written.windows(2).all(|w| w[0] < w[1]));

    let all = log.query(&EventQuery::all()).unwrap();
    assert_eq!(all.iter().map(|e| e.seq).collect::<Vec<_>>(), written);
    assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let b_high = log
        .query(&EventQuery {
            policy_id: Some("b".into()),
            min_severity: Some(EventSeverity::High),
            ..EventQuery::default()
        })
        .unwrap();
    let idx: Vec<u64> = b_high
        .iter()
        .map(|e| e.details["i"].as_u64().unwrap())
        .collect();
    assert_eq!(idx, vec![5, 7, 9]);

    let limited = log
        .query(&EventQuery {
            limit: Some(2),
            ..EventQuery::default()
        })
        .unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].seq, written[0]);
    assert_eq!(log.count(&EventQuery::for_policy("a")).unwrap(), 5);
}

#[test]
fn failed_append_is_not_indexed() {
    let sink = Arc::new(FlakySink::default());
    let m = metrics();
    let log = AuditLog::open(sink.clone(), Arc::clone(&m)).unwrap();
    log.record(event(0)).unwrap();

    sink.fail(true);
    let err = log.record(event(1)).unwrap_err();
    assert_eq!(err.reason_code(), ReasonCode::LogUnavailable);
    assert_eq!(log.len(), 1);
    assert_eq!(m.audit_failures.get(&[("action", "policy_updated")]), 1);

    sink.fail(false);
    let next = log.record(event(2)).unwrap();
    assert_eq!(next.seq, 2);
    assert_eq!(sink.appended(), 2);
}

#[test]
fn file_sink_replays_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit").join("events.jsonl");

    {
        let log = AuditLog::open(Arc::new(FileSink::open(&path).unwrap()), metrics()).unwrap();
        for i in 0..4 {
            log.record(event(i)).unwrap();
        }
    }

    // a torn trailing record is cut off on open
    let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    f.write_all(b"{\"id\": \"trunc").unwrap();
    drop(f);

    let reopened = AuditLog::open(Arc::new(FileSink::open(&path).unwrap()), metrics()).unwrap();
    assert_eq!(reopened.len(), 4);
    let next = reopened.record(event(4)).unwrap();
    assert_eq!(next.seq, 5);

    let descriptions: Vec<String> = reopened
        .query(&EventQuery::all())
        .unwrap()
        .into_iter()
        .map(|e| e.description)
        .collect();
    assert_eq!(
        descriptions,
        vec!["update 0", "update 1", "update 2", "update 3", "update 4"]
    );
}

#[test]
fn append_after_torn_record_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    std::fs::write(&path, b"{\"id\":\"torn").unwrap();

    {
        let log = AuditLog::open(Arc::new(FileSink::open(&path).unwrap()), metrics()).unwrap();
        assert!(log.is_empty());
        assert_eq!(log.record(event(0)).unwrap().seq, 1);
    }

    let reopened = AuditLog::open(Arc::new(FileSink::open(&path).unwrap()), metrics()).unwrap();
    let events = reopened.query(&EventQuery::all()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].description, "update 0");
    assert_eq!(reopened.record(event(1)).unwrap().seq, 2);
}

#[test]
fn file_sink_appends_are_visible_on_return() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let log = AuditLog::open(Arc::new(FileSink::open(&path).unwrap()), metrics()).unwrap();

    for i in 0..3 {
        log.record(event(i)).unwrap();
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk.lines().count() as u64, i + 1);
        assert!(on_disk.ends_with('\n'));
    }
}
