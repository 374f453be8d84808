//! Policy data model.
//!
//! Every section is a closed, explicitly enumerated structure so comparisons in
//! the resolver and evaluator are exhaustive. Sections default to the
//! conservative baseline so a YAML seed only needs to spell out what differs.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LivGuardError, Result};

pub const MIN_WASM_MEMORY: u64 = 1024;
pub const MAX_WASM_MEMORY: u64 = 128 * 1024 * 1024;
pub const MIN_WASM_CPU_MS: u64 = 100;
pub const MAX_WASM_CPU_MS: u64 = 30_000;

/// Combine two numeric ceilings where `0` means "no ceiling".
pub fn tighter_ceiling(a: u64, b: u64) -> u64 {
    match (a, b) {
        (0, b) => b,
        (a, 0) => a,
        (a, b) => a.min(b),
    }
}

/// Named, versioned, inheritable security configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parent_policy_id: Option<String>,

    /// Assigned by the store; starts at 1.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub security: SecurityPolicy,
    #[serde(default)]
    pub admin: AdminControls,
    #[serde(default)]
    pub limits: ResourceLimits,
    #[serde(default)]
    pub events: EventConfig,
    #[serde(default)]
    pub compliance: ComplianceSettings,
}

impl Policy {
    /// Policy with the conservative baseline in every section.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            parent_policy_id: None,
            version: 0,
            created_at: None,
            created_by: String::new(),
            updated_at: None,
            security: SecurityPolicy::default(),
            admin: AdminControls::default(),
            limits: ResourceLimits::default(),
            events: EventConfig::default(),
            compliance: ComplianceSettings::default(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_policy_id = Some(parent.into());
        self
    }

    /// Structural validation applied on every write.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(LivGuardError::InvalidPolicy("policy id must not be empty".into()));
        }
        if !is_valid_id(&self.id) {
            return Err(LivGuardError::InvalidPolicy(format!(
                "policy id contains invalid characters: {}",
                self.id
            )));
        }
        if self.name.trim().is_empty() {
            return Err(LivGuardError::InvalidPolicy(format!(
                "policy {} must have a name",
                self.id
            )));
        }
        if self.parent_policy_id.as_deref() == Some(self.id.as_str()) {
            return Err(LivGuardError::CycleDetected {
                chain: vec![self.id.clone(), self.id.clone()],
            });
        }

        let wasm = &self.security.wasm;
        if !(MIN_WASM_MEMORY..=MAX_WASM_MEMORY).contains(&wasm.memory_limit) {
            return Err(LivGuardError::InvalidPolicy(format!(
                "security.wasm.memory_limit must be between {MIN_WASM_MEMORY} and {MAX_WASM_MEMORY}"
            )));
        }
        if !(MIN_WASM_CPU_MS..=MAX_WASM_CPU_MS).contains(&wasm.cpu_time_limit_ms) {
            return Err(LivGuardError::InvalidPolicy(format!(
                "security.wasm.cpu_time_limit_ms must be between {MIN_WASM_CPU_MS} and {MAX_WASM_CPU_MS}"
            )));
        }
        for ft in &self.admin.allowed_file_types {
            let ok = !ft.is_empty()
                && ft
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-'));
            if !ok {
                return Err(LivGuardError::InvalidPolicy(format!(
                    "invalid file type format: {ft}"
                )));
            }
        }
        Ok(())
    }
}

fn is_valid_id(id: &str) -> bool {
    id.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Core execution permissions for embedded code.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityPolicy {
    #[serde(default)]
    pub wasm: WasmPermissions,
    #[serde(default)]
    pub js: JsPermissions,
    #[serde(default)]
    pub network: NetworkPolicy,
    #[serde(default)]
    pub storage: StoragePolicy,
    /// Advisory; the host decides what trust these domains confer.
    #[serde(default)]
    pub trusted_domains: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WasmPermissions {
    /// Bytes.
    #[serde(default = "default_wasm_memory")]
    pub memory_limit: u64,
    #[serde(default = "default_wasm_imports")]
    pub allowed_imports: BTreeSet<String>,
    #[serde(default = "default_wasm_cpu_ms")]
    pub cpu_time_limit_ms: u64,
    #[serde(default)]
    pub allow_networking: bool,
    #[serde(default)]
    pub allow_file_system: bool,
}

impl Default for WasmPermissions {
    fn default() -> Self {
        Self {
            memory_limit: default_wasm_memory(),
            allowed_imports: default_wasm_imports(),
            cpu_time_limit_ms: default_wasm_cpu_ms(),
            allow_networking: false,
            allow_file_system: false,
        }
    }
}

fn default_wasm_memory() -> u64 {
    16 * 1024 * 1024
}
fn default_wasm_cpu_ms() -> u64 {
    5000
}
fn default_wasm_imports() -> BTreeSet<String> {
    BTreeSet::from(["console".to_string()])
}

/// Ordered from least to most permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    None,
    #[default]
    Sandboxed,
    Trusted,
}

/// Ordered from least to most permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomAccess {
    None,
    #[default]
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsPermissions {
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default = "default_wasm_imports")]
    pub allowed_apis: BTreeSet<String>,
    #[serde(default)]
    pub dom_access: DomAccess,
}

impl Default for JsPermissions {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::default(),
            allowed_apis: default_wasm_imports(),
            dom_access: DomAccess::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkPolicy {
    #[serde(default)]
    pub allow_outbound: bool,
    #[serde(default)]
    pub allowed_hosts: BTreeSet<String>,
    #[serde(default)]
    pub allowed_ports: BTreeSet<u16>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoragePolicy {
    #[serde(default)]
    pub allow_local_storage: bool,
    #[serde(default)]
    pub allow_session_storage: bool,
    #[serde(default)]
    pub allow_indexed_db: bool,
    #[serde(default)]
    pub allow_cookies: bool,
}

/// Administrative controls layered over the execution permissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminControls {
    /// Enforced by the host before it submits a load request.
    #[serde(default)]
    pub require_approval: bool,
    /// Bytes; 0 = no ceiling.
    #[serde(default = "default_max_document_size")]
    pub max_document_size: u64,
    /// 0 = no ceiling.
    #[serde(default = "default_max_wasm_modules")]
    pub max_wasm_modules: u32,
    /// Every entry of `LoadRequest::resource_types` must be listed.
    #[serde(default = "default_allowed_file_types")]
    pub allowed_file_types: BTreeSet<String>,
    #[serde(default)]
    pub blocked_domains: BTreeSet<String>,
    #[serde(default)]
    pub require_signature: bool,
    #[serde(default)]
    pub trusted_signers: BTreeSet<String>,
    #[serde(default)]
    pub enforce_quarantine: bool,
    #[serde(default = "default_quarantine_duration")]
    pub quarantine_duration_secs: u64,
}

impl Default for AdminControls {
    fn default() -> Self {
        Self {
            require_approval: false,
            max_document_size: default_max_document_size(),
            max_wasm_modules: default_max_wasm_modules(),
            allowed_file_types: default_allowed_file_types(),
            blocked_domains: BTreeSet::new(),
            require_signature: false,
            trusted_signers: BTreeSet::new(),
            enforce_quarantine: false,
            quarantine_duration_secs: default_quarantine_duration(),
        }
    }
}

fn default_max_document_size() -> u64 {
    10 * 1024 * 1024
}
fn default_max_wasm_modules() -> u32 {
    5
}
fn default_allowed_file_types() -> BTreeSet<String> {
    ["text/html", "text/css", "application/javascript"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_quarantine_duration() -> u64 {
    3600
}

/// Resource ceilings; every field uses 0 for "no ceiling".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceLimits {
    #[serde(default = "default_max_concurrent_documents")]
    pub max_concurrent_documents: u64,
    #[serde(default = "default_max_memory_per_document")]
    pub max_memory_per_document: u64,
    #[serde(default = "default_max_cpu_time_per_document_ms")]
    pub max_cpu_time_per_document_ms: u64,
    /// Bytes per second.
    #[serde(default = "default_max_network_bandwidth")]
    pub max_network_bandwidth: u64,
    #[serde(default = "default_max_storage_usage")]
    pub max_storage_usage: u64,
    #[serde(default = "default_document_timeout_secs")]
    pub document_timeout_secs: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_concurrent_documents: default_max_concurrent_documents(),
            max_memory_per_document: default_max_memory_per_document(),
            max_cpu_time_per_document_ms: default_max_cpu_time_per_document_ms(),
            max_network_bandwidth: default_max_network_bandwidth(),
            max_storage_usage: default_max_storage_usage(),
            document_timeout_secs: default_document_timeout_secs(),
        }
    }
}

fn default_max_concurrent_documents() -> u64 {
    10
}
fn default_max_memory_per_document() -> u64 {
    64 * 1024 * 1024
}
fn default_max_cpu_time_per_document_ms() -> u64 {
    30_000
}
fn default_max_network_bandwidth() -> u64 {
    1024 * 1024
}
fn default_max_storage_usage() -> u64 {
    100 * 1024 * 1024
}
fn default_document_timeout_secs() -> u64 {
    300
}

/// Ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventConfig {
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default = "default_true")]
    pub enable_audit_log: bool,
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
    #[serde(default = "default_alert_thresholds")]
    pub alert_thresholds: BTreeMap<String, u32>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            enable_audit_log: true,
            log_retention_days: default_log_retention_days(),
            alert_thresholds: default_alert_thresholds(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_log_retention_days() -> u32 {
    90
}
fn default_alert_thresholds() -> BTreeMap<String, u32> {
    BTreeMap::from([
        ("violations".to_string(), 10),
        ("suspicious_activity".to_string(), 5),
    ])
}

/// Ordered from least to most sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataClassification {
    Public,
    #[default]
    Internal,
    Confidential,
    Restricted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComplianceSettings {
    #[serde(default)]
    pub gdpr: bool,
    #[serde(default)]
    pub hipaa: bool,
    #[serde(default = "default_data_retention_days")]
    pub data_retention_days: u32,
    #[serde(default)]
    pub require_encryption: bool,
    /// `None` = no regional restriction.
    #[serde(default)]
    pub allowed_regions: Option<BTreeSet<String>>,
    #[serde(default)]
    pub data_classification: DataClassification,
}

impl Default for ComplianceSettings {
    fn default() -> Self {
        Self {
            gdpr: false,
            hipaa: false,
            data_retention_days: default_data_retention_days(),
            require_encryption: false,
            allowed_regions: None,
            data_classification: DataClassification::default(),
        }
    }
}

fn default_data_retention_days() -> u32 {
    30
}

/// One link of a resolved inheritance chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub id: String,
    pub version: u64,
}

/// Materialized most-restrictive merge of a policy and its ancestors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivePolicy {
    pub policy_id: String,
    /// Root first, the resolved policy last.
    pub chain: Vec<ChainLink>,
    pub security: SecurityPolicy,
    pub admin: AdminControls,
    pub limits: ResourceLimits,
    pub events: EventConfig,
    pub compliance: ComplianceSettings,
    pub resolved_at: DateTime<Utc>,
}

impl EffectivePolicy {
    /// Memory ceiling for one module, combining WASM and per-document limits.
    pub fn memory_ceiling(&self) -> u64 {
        tighter_ceiling(self.security.wasm.memory_limit, self.limits.max_memory_per_document)
    }

    /// CPU time ceiling in milliseconds.
    pub fn cpu_ceiling_ms(&self) -> u64 {
        tighter_ceiling(
            self.security.wasm.cpu_time_limit_ms,
            self.limits.max_cpu_time_per_document_ms,
        )
    }
}
