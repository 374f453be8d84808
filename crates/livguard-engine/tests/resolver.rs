//! Effective-policy resolution and the most-restrictive merge.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use proptest::prelude::*;

use livguard_core::error::{LivGuardError, ReasonCode};
use livguard_core::policy::{
    ComplianceSettings, DataClassification, DomAccess, EventConfig, ExecutionMode, LogLevel,
    Policy, ResourceLimits, SecurityPolicy,
};
use livguard_engine::resolver::{merge, merge_chain, walk_chain, PolicyResolver};

use fixtures::{metrics, store, MB};

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn child_memory_limit_tightens_parent() {
    let s = store(5);
    let mut basic = Policy::new("basic", "Basic");
    basic.security.wasm.memory_limit = 8 * MB;
    s.create(basic, "alice").unwrap();

    let mut restricted = Policy::new("basic-restricted", "Basic restricted").with_parent("basic");
    restricted.security.wasm.memory_limit = 4 * MB;
    s.create(restricted, "alice").unwrap();

    let r = PolicyResolver::new(Arc::clone(&s), metrics());
    let eff = r.resolve("basic-restricted").unwrap();
    assert_eq!(eff.security.wasm.memory_limit, 4 * MB);
    assert_eq!(eff.policy_id, "basic-restricted");
    let chain: Vec<&str> = eff.chain.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(chain, vec!["basic", "basic-restricted"]);
}

#[test]
fn child_cannot_loosen_parent() {
    let s = store(5);
    let mut root = Policy::new("root", "Root");
    root.security.wasm.memory_limit = 4 * MB;
    root.security.wasm.allow_networking = false;
    root.admin.require_signature = true;
    s.create(root, "alice").unwrap();

    let mut child = Policy::new("child", "Child").with_parent("root");
    child.security.wasm.memory_limit = 64 * MB;
    child.security.wasm.allow_networking = true;
    child.admin.require_signature = false;
    child.security.js.execution_mode = ExecutionMode::Trusted;
    s.create(child, "alice").unwrap();

    let eff = PolicyResolver::new(s, metrics()).resolve("child").unwrap();
    assert_eq!(eff.security.wasm.memory_limit, 4 * MB);
    assert!(!eff.security.wasm.allow_networking);
    assert!(eff.admin.require_signature);
    assert_eq!(eff.security.js.execution_mode, ExecutionMode::Sandboxed);
}

#[test]
fn cache_follows_writes() {
    let s = store(5);
    s.create(Policy::new("root", "Root"), "alice").unwrap();
    s.create(Policy::new("leaf", "Leaf").with_parent("root"), "alice")
        .unwrap();
    let r = PolicyResolver::new(Arc::clone(&s), metrics());

    let first = r.resolve("leaf").unwrap();
    let again = r.resolve("leaf").unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(r.cached_len(), 1);

    s.update("root", 1, |p| p.security.wasm.memory_limit = 2 * MB, "alice")
        .unwrap();
    let after = r.resolve("leaf").unwrap();
    assert_eq!(after.security.wasm.memory_limit, 2 * MB);
    assert_eq!(after.chain[0].version, 2);

    r.clear_cache();
    assert_eq!(r.cached_len(), 0);
}

#[test]
fn deleted_policy_leaves_the_cache() {
    let s = store(5);
    s.create(Policy::new("root", "Root"), "alice").unwrap();
    s.create(Policy::new("leaf", "Leaf").with_parent("root"), "alice")
        .unwrap();
    let r = PolicyResolver::new(Arc::clone(&s), metrics());
    r.resolve("leaf").unwrap();
    r.resolve("root").unwrap();
    assert_eq!(r.cached_len(), 2);

    s.delete("leaf", "alice").unwrap();
    assert_eq!(r.resolve("leaf").unwrap_err().reason_code(), ReasonCode::NotFound);
    assert_eq!(r.cached_len(), 1);
}

#[test]
fn unknown_policy_is_not_found() {
    let r = PolicyResolver::new(store(5), metrics());
    assert_eq!(r.resolve("ghost").unwrap_err().reason_code(), ReasonCode::NotFound);
}

#[test]
fn walk_reports_cycles_and_orphans() {
    let mut table: BTreeMap<String, Arc<Policy>> = BTreeMap::new();
    table.insert("a".into(), Arc::new(Policy::new("a", "A").with_parent("b")));
    table.insert("b".into(), Arc::new(Policy::new("b", "B").with_parent("a")));
    table.insert("c".into(), Arc::new(Policy::new("c", "C").with_parent("gone")));
    let lookup = |id: &str| table.get(id).cloned();

    match walk_chain(lookup, "a", 10).unwrap_err() {
        LivGuardError::CycleDetected { chain } => assert_eq!(chain, vec!["a", "b", "a"]),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        walk_chain(lookup, "c", 10).unwrap_err(),
        LivGuardError::OrphanedParent { ref id, ref parent } if id == "c" && parent == "gone"
    ));
    assert!(matches!(
        walk_chain(lookup, "a", 1).unwrap_err(),
        LivGuardError::DepthExceeded { depth: 2, max: 1, .. }
    ));
}

#[test]
fn zero_ceiling_yields_to_bounded() {
    let mut acc = ResourceLimits {
        max_network_bandwidth: 0,
        document_timeout_secs: 0,
        ..ResourceLimits::default()
    };
    let next = ResourceLimits {
        max_network_bandwidth: 512,
        document_timeout_secs: 0,
        ..ResourceLimits::default()
    };
    merge::limits(&mut acc, &next);
    assert_eq!(acc.max_network_bandwidth, 512);
    assert_eq!(acc.document_timeout_secs, 0);
}

#[test]
fn sets_intersect_and_blocklists_union() {
    let mut acc = SecurityPolicy::default();
    acc.wasm.allowed_imports = set(&["console", "math"]);
    acc.network.allowed_hosts = set(&["a.example", "b.example"]);
    let mut next = SecurityPolicy::default();
    next.wasm.allowed_imports = set(&["math", "fs"]);
    next.network.allowed_hosts = set(&["b.example"]);
    next.js.dom_access = DomAccess::None;
    merge::security(&mut acc, &next);

    assert_eq!(acc.wasm.allowed_imports, set(&["math"]));
    assert_eq!(acc.network.allowed_hosts, set(&["b.example"]));
    assert_eq!(acc.js.dom_access, DomAccess::None);

    let mut root = Policy::new("r", "R").admin;
    root.blocked_domains = set(&["evil.example"]);
    let mut leaf = Policy::new("l", "L").admin;
    leaf.blocked_domains = set(&["worse.example"]);
    leaf.quarantine_duration_secs = 7200;
    merge::admin(&mut root, &leaf);
    assert_eq!(root.blocked_domains, set(&["evil.example", "worse.example"]));
    assert_eq!(root.quarantine_duration_secs, 7200);
}

#[test]
fn events_keep_most_verbose_and_lowest_thresholds() {
    let mut acc = EventConfig {
        log_level: LogLevel::Warn,
        log_retention_days: 30,
        ..EventConfig::default()
    };
    let mut next = EventConfig {
        log_level: LogLevel::Debug,
        enable_audit_log: false,
        log_retention_days: 365,
        ..EventConfig::default()
    };
    next.alert_thresholds.insert("violations".into(), 3);
    next.alert_thresholds.insert("exfiltration".into(), 1);
    merge::events(&mut acc, &next);

    assert_eq!(acc.log_level, LogLevel::Debug);
    assert!(acc.enable_audit_log);
    assert_eq!(acc.log_retention_days, 365);
    assert_eq!(acc.alert_thresholds["violations"], 3);
    assert_eq!(acc.alert_thresholds["exfiltration"], 1);
    assert_eq!(acc.alert_thresholds["suspicious_activity"], 5);
}

#[test]
fn regions_never_reopen() {
    let mut acc = ComplianceSettings {
        allowed_regions: Some(set(&["eu"])),
        data_retention_days: 90,
        ..ComplianceSettings::default()
    };
    let next = ComplianceSettings {
        allowed_regions: None,
        data_classification: DataClassification::Restricted,
        data_retention_days: 30,
        hipaa: true,
        ..ComplianceSettings::default()
    };
    merge::compliance(&mut acc, &next);
    assert_eq!(acc.allowed_regions, Some(set(&["eu"])));
    assert_eq!(acc.data_classification, DataClassification::Restricted);
    assert_eq!(acc.data_retention_days, 30);
    assert!(acc.hipaa);

    let disjoint = ComplianceSettings {
        allowed_regions: Some(set(&["us"])),
        ..ComplianceSettings::default()
    };
    merge::compliance(&mut acc, &disjoint);
    assert_eq!(acc.allowed_regions, Some(BTreeSet::new()));
}

#[test]
fn merge_of_empty_chain_is_internal() {
    let err = merge_chain(&[]).unwrap_err();
    assert_eq!(err.reason_code(), ReasonCode::Internal);
}

fn policy_strategy(id: &'static str) -> impl Strategy<Value = Policy> {
    (
        1024u64..=128 * MB,
        100u64..=30_000,
        any::<bool>(),
        any::<bool>(),
        0u64..=1024,
        any::<bool>(),
    )
        .prop_map(move |(mem, cpu, net, fs, doc_size, sig)| {
            let mut p = Policy::new(id, id);
            p.security.wasm.memory_limit = mem;
            p.security.wasm.cpu_time_limit_ms = cpu;
            p.security.wasm.allow_networking = net;
            p.security.wasm.allow_file_system = fs;
            p.admin.max_document_size = doc_size;
            p.admin.require_signature = sig;
            p
        })
}

fn within(effective: u64, ceiling: u64) -> bool {
    ceiling == 0 || (effective != 0 && effective <= ceiling)
}

proptest! {
    #[test]
    fn effective_is_never_looser_than_any_link(
        root in policy_strategy("root"),
        mid in policy_strategy("mid"),
        leaf in policy_strategy("leaf"),
    ) {
        let chain = vec![
            Arc::new(leaf.with_parent("mid")),
            Arc::new(mid.with_parent("root")),
            Arc::new(root),
        ];
        let eff = merge_chain(&chain).unwrap();

        for link in &chain {
            let w = &link.security.wasm;
            prop_assert!(eff.security.wasm.memory_limit <= w.memory_limit);
            prop_assert!(eff.security.wasm.cpu_time_limit_ms <= w.cpu_time_limit_ms);
            prop_assert!(!eff.security.wasm.allow_networking || w.allow_networking);
            prop_assert!(!eff.security.wasm.allow_file_system || w.allow_file_system);
            prop_assert!(within(eff.admin.max_document_size, link.admin.max_document_size));
            prop_assert!(eff.admin.require_signature || !link.admin.require_signature);
        }
    }
}
