//! Shared error type across livguard crates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable reason codes (stable API, surfaced to the host).
///
/// The serde form matches [`ReasonCode::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    NotFound,
    Conflict,
    VersionConflict,
    CycleDetected,
    DepthExceeded,
    OrphanedParent,
    UnknownTemplate,
    InvalidTemplateVariable,
    InvalidPolicy,
    PolicyInUse,
    MemoryLimitExceeded,
    CpuTimeExceeded,
    NetworkingNotAllowed,
    FilesystemNotAllowed,
    ImportNotAllowed,
    DocumentTooLarge,
    TooManyModules,
    FileTypeNotAllowed,
    BlockedDomain,
    DocumentQuarantined,
    UnsignedModule,
    UntrustedSigner,
    IntegrityMismatch,
    InvalidState,
    LogUnavailable,
    BadRequest,
    Internal,
}

impl ReasonCode {
    /// String representation used in audit records and host responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::NotFound => "not_found",
            ReasonCode::Conflict => "conflict",
            ReasonCode::VersionConflict => "version_conflict",
            ReasonCode::CycleDetected => "cycle_detected",
            ReasonCode::DepthExceeded => "depth_exceeded",
            ReasonCode::OrphanedParent => "orphaned_parent",
            ReasonCode::UnknownTemplate => "unknown_template",
            ReasonCode::InvalidTemplateVariable => "invalid_template_variable",
            ReasonCode::InvalidPolicy => "invalid_policy",
            ReasonCode::PolicyInUse => "policy_in_use",
            ReasonCode::MemoryLimitExceeded => "memory_limit_exceeded",
            ReasonCode::CpuTimeExceeded => "cpu_time_exceeded",
            ReasonCode::NetworkingNotAllowed => "networking_not_allowed",
            ReasonCode::FilesystemNotAllowed => "filesystem_not_allowed",
            ReasonCode::ImportNotAllowed => "import_not_allowed",
            ReasonCode::DocumentTooLarge => "document_too_large",
            ReasonCode::TooManyModules => "too_many_modules",
            ReasonCode::FileTypeNotAllowed => "file_type_not_allowed",
            ReasonCode::BlockedDomain => "blocked_domain",
            ReasonCode::DocumentQuarantined => "document_quarantined",
            ReasonCode::UnsignedModule => "unsigned_module",
            ReasonCode::UntrustedSigner => "untrusted_signer",
            ReasonCode::IntegrityMismatch => "integrity_mismatch",
            ReasonCode::InvalidState => "invalid_state",
            ReasonCode::LogUnavailable => "log_unavailable",
            ReasonCode::BadRequest => "bad_request",
            ReasonCode::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy: who can recover and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected before any resource is committed; caller fixes the input.
    Configuration,
    /// Load refused; no sandbox instance exists.
    Admission,
    /// Fatal to one sandbox instance only.
    Runtime,
    /// Fails the triggering security operation (fail closed).
    Infrastructure,
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, LivGuardError>;

/// Unified error type used by core and engine.
#[derive(Debug, Error)]
pub enum LivGuardError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    Conflict(String),
    #[error("version conflict on {id}: expected {expected}, found {found}")]
    VersionConflict { id: String, expected: u64, found: u64 },
    #[error("inheritance cycle detected: {}", chain.join(" -> "))]
    CycleDetected { chain: Vec<String> },
    #[error("inheritance depth {depth} exceeds maximum {max} (from {id})")]
    DepthExceeded { id: String, depth: usize, max: usize },
    #[error("policy {id} references missing parent {parent}")]
    OrphanedParent { id: String, parent: String },
    #[error("unknown template: {0}")]
    UnknownTemplate(String),
    #[error("invalid template variable {name}: {msg}")]
    InvalidTemplateVariable { name: String, msg: String },
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
    #[error("policy in use: {0}")]
    PolicyInUse(String),
    #[error("permission denied ({code}): {reason}")]
    PermissionDenied { code: ReasonCode, reason: String },
    #[error("module rejected ({code}): {reason}")]
    ModuleRejected { code: ReasonCode, reason: String },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidState { from: String, to: String },
    #[error("audit log unavailable: {0}")]
    LogUnavailable(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl LivGuardError {
    /// Map internal error to a stable machine-readable code.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            LivGuardError::NotFound(_) => ReasonCode::NotFound,
            LivGuardError::Conflict(_) => ReasonCode::Conflict,
            LivGuardError::VersionConflict { .. } => ReasonCode::VersionConflict,
            LivGuardError::CycleDetected { .. } => ReasonCode::CycleDetected,
            LivGuardError::DepthExceeded { .. } => ReasonCode::DepthExceeded,
            LivGuardError::OrphanedParent { .. } => ReasonCode::OrphanedParent,
            LivGuardError::UnknownTemplate(_) => ReasonCode::UnknownTemplate,
            LivGuardError::InvalidTemplateVariable { .. } => ReasonCode::InvalidTemplateVariable,
            LivGuardError::InvalidPolicy(_) => ReasonCode::InvalidPolicy,
            LivGuardError::PolicyInUse(_) => ReasonCode::PolicyInUse,
            LivGuardError::PermissionDenied { code, .. } => *code,
            LivGuardError::ModuleRejected { code, .. } => *code,
            LivGuardError::InvalidState { .. } => ReasonCode::InvalidState,
            LivGuardError::LogUnavailable(_) => ReasonCode::LogUnavailable,
            LivGuardError::BadRequest(_) => ReasonCode::BadRequest,
            LivGuardError::Internal(_) => ReasonCode::Internal,
        }
    }

    /// Classify the error for callers deciding whether to retry or surface it.
    pub fn class(&self) -> ErrorClass {
        match self {
            LivGuardError::PermissionDenied { .. } | LivGuardError::ModuleRejected { .. } => {
                ErrorClass::Admission
            }
            LivGuardError::InvalidState { .. } => ErrorClass::Runtime,
            LivGuardError::LogUnavailable(_) | LivGuardError::Internal(_) => {
                ErrorClass::Infrastructure
            }
            _ => ErrorClass::Configuration,
        }
    }
}
