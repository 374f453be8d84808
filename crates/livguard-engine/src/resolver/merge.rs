//! Most-restrictive merge of an inheritance chain.
//!
//! Each rule folds a descendant into the accumulated ancestors; applying them
//! root-first means no link can loosen what an ancestor set.

use std::collections::{BTreeMap, BTreeSet};

use livguard_core::policy::{
    tighter_ceiling, AdminControls, ComplianceSettings, EventConfig, JsPermissions,
    NetworkPolicy, ResourceLimits, SecurityPolicy, StoragePolicy, WasmPermissions,
};

fn intersect<T: Ord + Clone>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> BTreeSet<T> {
    a.intersection(b).cloned().collect()
}

pub fn security(acc: &mut SecurityPolicy, next: &SecurityPolicy) {
    wasm(&mut acc.wasm, &next.wasm);
    js(&mut acc.js, &next.js);
    network(&mut acc.network, &next.network);
    storage(&mut acc.storage, &next.storage);
    acc.trusted_domains = intersect(&acc.trusted_domains, &next.trusted_domains);
}

fn wasm(acc: &mut WasmPermissions, next: &WasmPermissions) {
    acc.memory_limit = tighter_ceiling(acc.memory_limit, next.memory_limit);
    acc.cpu_time_limit_ms = tighter_ceiling(acc.cpu_time_limit_ms, next.cpu_time_limit_ms);
    acc.allowed_imports = intersect(&acc.allowed_imports, &next.allowed_imports);
    acc.allow_networking &= next.allow_networking;
    acc.allow_file_system &= next.allow_file_system;
}

fn js(acc: &mut JsPermissions, next: &JsPermissions) {
    acc.execution_mode = acc.execution_mode.min(next.execution_mode);
    acc.allowed_apis = intersect(&acc.allowed_apis, &next.allowed_apis);
    acc.dom_access = acc.dom_access.min(next.dom_access);
}

fn network(acc: &mut NetworkPolicy, next: &NetworkPolicy) {
    acc.allow_outbound &= next.allow_outbound;
    acc.allowed_hosts = intersect(&acc.allowed_hosts, &next.allowed_hosts);
    acc.allowed_ports = intersect(&acc.allowed_ports, &next.allowed_ports);
}

fn storage(acc: &mut StoragePolicy, next: &StoragePolicy) {
    acc.allow_local_storage &= next.allow_local_storage;
    acc.allow_session_storage &= next.allow_session_storage;
    acc.allow_indexed_db &= next.allow_indexed_db;
    acc.allow_cookies &= next.allow_cookies;
}

pub fn admin(acc: &mut AdminControls, next: &AdminControls) {
    acc.require_approval |= next.require_approval;
    acc.max_document_size = tighter_ceiling(acc.max_document_size, next.max_document_size);
    acc.max_wasm_modules = tighter_ceiling(
        u64::from(acc.max_wasm_modules),
        u64::from(next.max_wasm_modules),
    ) as u32;
    acc.allowed_file_types = intersect(&acc.allowed_file_types, &next.allowed_file_types);
    acc.blocked_domains = acc
        .blocked_domains
        .union(&next.blocked_domains)
        .cloned()
        .collect();
    acc.require_signature |= next.require_signature;
    acc.trusted_signers = intersect(&acc.trusted_signers, &next.trusted_signers);
    acc.enforce_quarantine |= next.enforce_quarantine;
    acc.quarantine_duration_secs = acc
        .quarantine_duration_secs
        .max(next.quarantine_duration_secs);
}

pub fn limits(acc: &mut ResourceLimits, next: &ResourceLimits) {
    acc.max_concurrent_documents =
        tighter_ceiling(acc.max_concurrent_documents, next.max_concurrent_documents);
    acc.max_memory_per_document =
        tighter_ceiling(acc.max_memory_per_document, next.max_memory_per_document);
    acc.max_cpu_time_per_document_ms = tighter_ceiling(
        acc.max_cpu_time_per_document_ms,
        next.max_cpu_time_per_document_ms,
    );
    acc.max_network_bandwidth =
        tighter_ceiling(acc.max_network_bandwidth, next.max_network_bandwidth);
    acc.max_storage_usage = tighter_ceiling(acc.max_storage_usage, next.max_storage_usage);
    acc.document_timeout_secs =
        tighter_ceiling(acc.document_timeout_secs, next.document_timeout_secs);
}

pub fn events(acc: &mut EventConfig, next: &EventConfig) {
    acc.log_level = acc.log_level.min(next.log_level);
    acc.enable_audit_log |= next.enable_audit_log;
    // 0 keeps forever
    acc.log_retention_days = match (acc.log_retention_days, next.log_retention_days) {
        (0, _) | (_, 0) => 0,
        (a, b) => a.max(b),
    };
    acc.alert_thresholds = thresholds(&acc.alert_thresholds, &next.alert_thresholds);
}

fn thresholds(a: &BTreeMap<String, u32>, b: &BTreeMap<String, u32>) -> BTreeMap<String, u32> {
    let mut out = a.clone();
    for (k, v) in b {
        out.entry(k.clone())
            .and_modify(|cur| *cur = (*cur).min(*v))
            .or_insert(*v);
    }
    out
}

pub fn compliance(acc: &mut ComplianceSettings, next: &ComplianceSettings) {
    acc.gdpr |= next.gdpr;
    acc.hipaa |= next.hipaa;
    acc.require_encryption |= next.require_encryption;
    acc.data_retention_days = acc.data_retention_days.min(next.data_retention_days);
    acc.data_classification = acc.data_classification.max(next.data_classification);
    acc.allowed_regions = match (acc.allowed_regions.take(), &next.allowed_regions) {
        (None, None) => None,
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b.clone()),
        (Some(a), Some(b)) => Some(intersect(&a, b)),
    };
}
