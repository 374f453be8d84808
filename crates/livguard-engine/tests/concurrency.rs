//! Store, resolver and audit log under concurrent callers.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::{Arc, Barrier};
use std::thread;

use livguard_core::error::ReasonCode;
use livguard_core::event::{EventAction, EventQuery, NewEvent};
use livguard_core::policy::Policy;
use livguard_engine::resolver::PolicyResolver;

use fixtures::{audit, metrics, store, MB};

#[test]
fn same_version_update_has_one_winner() {
    for _ in 0..50 {
        let s = store(5);
        s.create(Policy::new("basic", "Basic"), "alice").unwrap();
        let gate = Arc::new(Barrier::new(2));

        let results: Vec<_> = ["alice", "bob"]
            .into_iter()
            .map(|actor| {
                let s = Arc::clone(&s);
                let gate = Arc::clone(&gate);
                thread::spawn(move || {
                    gate.wait();
                    s.update("basic", 1, |p| p.description = actor.into(), actor)
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();

        let won: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(won.len(), 1);
        let lost = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(lost.reason_code(), ReasonCode::VersionConflict);

        let current = s.get("basic").unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.description, won[0].description);
    }
}

#[test]
fn writers_on_different_ids_all_commit() {
    const WRITERS: usize = 8;
    const ROUNDS: u64 = 50;

    let s = store(5);
    for i in 0..WRITERS {
        s.create(Policy::new(format!("p{i}"), "P"), "alice").unwrap();
    }
    let start = s.generation();
    let gate = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let s = Arc::clone(&s);
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let id = format!("p{i}");
                gate.wait();
                for v in 1..=ROUNDS {
                    s.update(&id, v, |p| p.description = format!("round {v}"), "alice")
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for i in 0..WRITERS {
        assert_eq!(s.get(&format!("p{i}")).unwrap().version, ROUNDS + 1);
    }
    assert_eq!(s.generation() - start, WRITERS as u64 * ROUNDS);
}

#[test]
fn concurrent_appends_get_gap_free_sequence() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 100;

    let log = audit();
    let gate = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let log = Arc::clone(&log);
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                gate.wait();
                for n in 0..PER_THREAD {
                    log.record(NewEvent::new(
                        format!("writer-{t}"),
                        EventAction::PermissionEvaluated,
                        format!("event {n}"),
                    ))
                    .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let events = log.query(&EventQuery::all()).unwrap();
    assert_eq!(events.len(), THREADS * PER_THREAD);
    for (i, ev) in events.iter().enumerate() {
        assert_eq!(ev.seq, i as u64 + 1);
    }
    assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn resolve_sees_only_committed_versions() {
    let s = store(5);
    let mut root = Policy::new("root", "Root");
    root.security.wasm.memory_limit = 10 * MB;
    s.create(root, "alice").unwrap();
    s.create(Policy::new("child", "Child").with_parent("root"), "alice")
        .unwrap();
    let resolver = Arc::new(PolicyResolver::new(Arc::clone(&s), metrics()));

    let writer = {
        let s = Arc::clone(&s);
        thread::spawn(move || {
            for v in 1..=100u64 {
                let limit = if v % 2 == 0 { 10 * MB } else { 2 * MB };
                s.update("root", v, |p| p.security.wasm.memory_limit = limit, "alice")
                    .unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            thread::spawn(move || {
                for _ in 0..500 {
                    let eff = resolver.resolve("child").unwrap();
                    let limit = eff.security.wasm.memory_limit;
                    assert!(limit == 2 * MB || limit == 10 * MB, "torn limit {limit}");
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }

    let eff = resolver.resolve("child").unwrap();
    assert_eq!(eff.security.wasm.memory_limit, 10 * MB);
    assert_eq!(eff.chain.iter().find(|l| l.id == "root").unwrap().version, 101);
}
