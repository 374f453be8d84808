//! Admission inputs: module descriptors handed over by the container layer and
//! the capability request a module declares at load time.

use std::collections::BTreeSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Module metadata as declared in the document manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub version: String,
    pub entry_point: String,
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default)]
    pub imports: BTreeSet<String>,
}

/// Integrity facts established by the container layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleVerification {
    /// Lowercase hex SHA-256 of the module bytes, as recorded in the manifest.
    pub content_sha256: String,
    pub signature_verified: bool,
    #[serde(default)]
    pub signer: Option<String>,
}

/// A module ready for admission.
#[derive(Debug, Clone)]
pub struct ModuleBundle {
    pub descriptor: ModuleDescriptor,
    pub bytes: Bytes,
    pub verification: ModuleVerification,
}

/// A module's declared needs. Ephemeral, built per load attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionRequest {
    /// Bytes.
    pub memory_limit: u64,
    pub cpu_time_limit_ms: u64,
    #[serde(default)]
    pub networking: bool,
    #[serde(default)]
    pub file_system: bool,
    #[serde(default)]
    pub imports: BTreeSet<String>,
}

impl PermissionRequest {
    pub fn new(memory_limit: u64, cpu_time_limit_ms: u64) -> Self {
        Self {
            memory_limit,
            cpu_time_limit_ms,
            networking: false,
            file_system: false,
            imports: BTreeSet::new(),
        }
    }

    pub fn with_networking(mut self, on: bool) -> Self {
        self.networking = on;
        self
    }

    pub fn with_file_system(mut self, on: bool) -> Self {
        self.file_system = on;
        self
    }

    pub fn with_imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imports = imports.into_iter().map(Into::into).collect();
        self
    }
}

/// One document-load attempt for one module.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub document_id: String,
    pub policy_id: String,
    /// Size of the containing document in bytes.
    pub document_size: u64,
    /// MIME types of the document's manifest resources.
    pub resource_types: BTreeSet<String>,
    /// Hosts referenced by the document's content, as extracted by the host.
    pub referenced_domains: BTreeSet<String>,
    pub actor: String,
    pub module: ModuleBundle,
    pub permissions: PermissionRequest,
}
