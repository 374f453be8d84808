//! Policy model parsing and validation.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use livguard_core::error::{ErrorClass, LivGuardError, ReasonCode};
use livguard_core::policy::{
    tighter_ceiling, DataClassification, DomAccess, ExecutionMode, Policy, MAX_WASM_MEMORY,
};

#[test]
fn minimal_yaml_policy_gets_conservative_baseline() {
    let p: Policy = serde_yaml::from_str("id: basic\nname: Basic\n").unwrap();
    p.validate().unwrap();

    assert_eq!(p.version, 0);
    assert_eq!(p.security.wasm.memory_limit, 16 * 1024 * 1024);
    assert_eq!(p.security.wasm.cpu_time_limit_ms, 5000);
    assert!(!p.security.wasm.allow_networking);
    assert!(!p.security.wasm.allow_file_system);
    assert!(p.security.wasm.allowed_imports.contains("console"));
    assert_eq!(p.security.js.execution_mode, ExecutionMode::Sandboxed);
    assert_eq!(p.security.js.dom_access, DomAccess::Read);
    assert_eq!(p.admin.max_wasm_modules, 5);
    assert!(p.events.enable_audit_log);
    assert_eq!(p.compliance.allowed_regions, None);
    assert_eq!(p.compliance.data_classification, DataClassification::Internal);
    assert_eq!(p, Policy::new("basic", "Basic"));
}

#[test]
fn unknown_policy_fields_are_rejected() {
    let yaml = r#"
id: basic
name: Basic
security:
  wasm:
    memory_limit: 1048576
    allow_sockets: true
"#;
    let err = serde_yaml::from_str::<Policy>(yaml).unwrap_err();
    assert!(err.to_string().contains("allow_sockets"));
}

#[test]
fn enum_orderings_run_from_least_to_most_permissive() {
    assert!(ExecutionMode::None < ExecutionMode::Sandboxed);
    assert!(ExecutionMode::Sandboxed < ExecutionMode::Trusted);
    assert!(DomAccess::None < DomAccess::Read && DomAccess::Read < DomAccess::Write);
    assert!(DataClassification::Public < DataClassification::Restricted);
}

#[test]
fn validation_rejects_bad_identity() {
    let err = Policy::new("", "x").validate().unwrap_err();
    assert_eq!(err.reason_code(), ReasonCode::InvalidPolicy);

    let err = Policy::new("has space", "x").validate().unwrap_err();
    assert_eq!(err.reason_code(), ReasonCode::InvalidPolicy);

    let err = Policy::new("ok", "   ").validate().unwrap_err();
    assert_eq!(err.reason_code(), ReasonCode::InvalidPolicy);

    let err = Policy::new("self", "Self").with_parent("self").validate().unwrap_err();
    assert!(matches!(err, LivGuardError::CycleDetected { .. }));
}

#[test]
fn validation_bounds_wasm_limits() {
    let mut p = Policy::new("p", "P");
    p.security.wasm.memory_limit = MAX_WASM_MEMORY + 1;
    assert!(p.validate().is_err());

    p.security.wasm.memory_limit = MAX_WASM_MEMORY;
    p.validate().unwrap();

    p.security.wasm.cpu_time_limit_ms = 99;
    assert!(p.validate().is_err());
}

#[test]
fn validation_checks_file_type_format() {
    let mut p = Policy::new("p", "P");
    p.admin.allowed_file_types.insert("image/png".into());
    p.validate().unwrap();

    p.admin.allowed_file_types.insert("text/html; charset".into());
    let err = p.validate().unwrap_err();
    assert!(err.to_string().contains("invalid file type"));
}

#[test]
fn zero_ceiling_means_unbounded() {
    assert_eq!(tighter_ceiling(0, 0), 0);
    assert_eq!(tighter_ceiling(0, 7), 7);
    assert_eq!(tighter_ceiling(7, 0), 7);
    assert_eq!(tighter_ceiling(9, 7), 7);
}

#[test]
fn errors_carry_stable_codes_and_classes() {
    let cases = [
        (LivGuardError::NotFound("x".into()), "not_found", ErrorClass::Configuration),
        (
            LivGuardError::VersionConflict {
                id: "p".into(),
                expected: 1,
                found: 2,
            },
            "version_conflict",
            ErrorClass::Configuration,
        ),
        (
            LivGuardError::PermissionDenied {
                code: ReasonCode::NetworkingNotAllowed,
                reason: "no".into(),
            },
            "networking_not_allowed",
            ErrorClass::Admission,
        ),
        (
            LivGuardError::InvalidState {
                from: "terminated".into(),
                to: "running".into(),
            },
            "invalid_state",
            ErrorClass::Runtime,
        ),
        (
            LivGuardError::LogUnavailable("disk".into()),
            "log_unavailable",
            ErrorClass::Infrastructure,
        ),
    ];
    for (err, code, class) in cases {
        assert_eq!(err.reason_code().as_str(), code);
        assert_eq!(err.class(), class);
    }

    let json = serde_json::to_string(&ReasonCode::DocumentQuarantined).unwrap();
    assert_eq!(json, "\"document_quarantined\"");
}
