#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use livguard_engine::config::{self, AuditSinkKind};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
monitor:
  critical_afterr: 5 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.reason_code().as_str(), "bad_request");
}

#[test]
fn deny_unknown_fields_in_seed_policy() {
    let bad = r#"
version: 1
policies:
  - id: "basic"
    name: "Basic"
    security:
      wasm: { memory_limt: 1024 }
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.reason_code().as_str(), "bad_request");
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.engine.max_policy_depth, 5);
    assert_eq!(cfg.engine.default_policy_id.as_deref(), Some("default"));
    assert_eq!(cfg.engine.state_path, None);
    assert_eq!(cfg.monitor.critical_after, 3);
    assert!(!cfg.monitor.suspend_on_warning);
    assert_eq!(cfg.audit.sink, AuditSinkKind::Memory);
    assert_eq!(cfg.ops.listen, "127.0.0.1:9470");
    assert!(cfg.policies.is_empty());
}

#[test]
fn seed_policies_parse_in_order() {
    let ok = r#"
version: 1
monitor:
  critical_after: 5
policies:
  - id: "basic"
    name: "Basic"
    security:
      wasm: { memory_limit: 8388608 }
  - id: "basic-restricted"
    name: "Basic restricted"
    parent_policy_id: "basic"
    security:
      wasm: { memory_limit: 4194304 }
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.monitor.critical_after, 5);
    assert_eq!(cfg.policies.len(), 2);
    assert_eq!(cfg.policies[1].parent_policy_id.as_deref(), Some("basic"));
}

#[test]
fn range_checks() {
    let cases = [
        "version: 2\n",
        "version: 1\nengine: { max_policy_depth: 0 }\n",
        "version: 1\nengine: { default_policy_id: \"\" }\n",
        "version: 1\nengine: { state_path: \"\" }\n",
        "version: 1\nmonitor: { critical_after: 0 }\n",
        "version: 1\nsandbox: { termination_grace_ms: 1 }\n",
        "version: 1\nsandbox: { sample_queue: 0 }\n",
        "version: 1\naudit: { sink: file }\n",
        "version: 1\nops: { listen: \"nowhere\" }\n",
    ];
    for case in cases {
        let err = config::load_from_str(case).expect_err(case);
        assert_eq!(err.reason_code().as_str(), "bad_request", "{case}");
    }
}

#[test]
fn duplicate_seed_ids_rejected() {
    let bad = r#"
version: 1
policies:
  - { id: "a", name: "A" }
  - { id: "a", name: "A again" }
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("duplicate"));
}
