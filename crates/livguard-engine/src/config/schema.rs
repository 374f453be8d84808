use std::collections::HashSet;
use std::net::SocketAddr;

use serde::Deserialize;

use livguard_core::error::{LivGuardError, Result};
use livguard_core::policy::Policy;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub version: u32,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub sandbox: SandboxSection,

    #[serde(default)]
    pub audit: AuditSection,

    #[serde(default)]
    pub ops: OpsSection,

    /// Seed policies created at startup, parents before children.
    #[serde(default)]
    pub policies: Vec<Policy>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            engine: EngineSection::default(),
            monitor: MonitorSection::default(),
            sandbox: SandboxSection::default(),
            audit: AuditSection::default(),
            ops: OpsSection::default(),
            policies: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(LivGuardError::BadRequest(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.engine.validate()?;
        self.monitor.validate()?;
        self.sandbox.validate()?;
        self.audit.validate()?;
        self.ops.validate()?;

        let mut seen = HashSet::new();
        for p in &self.policies {
            p.validate()?;
            if !seen.insert(p.id.as_str()) {
                return Err(LivGuardError::BadRequest(format!(
                    "policies: duplicate id {}",
                    p.id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default = "default_max_policy_depth")]
    pub max_policy_depth: usize,

    /// Created with the baseline settings when absent from `policies`.
    #[serde(default = "default_policy_id")]
    pub default_policy_id: Option<String>,

    /// JSON snapshot of the policy store; in-memory only when unset.
    #[serde(default)]
    pub state_path: Option<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_policy_depth: default_max_policy_depth(),
            default_policy_id: default_policy_id(),
            state_path: None,
        }
    }
}

impl EngineSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=32).contains(&self.max_policy_depth) {
            return Err(LivGuardError::BadRequest(
                "engine.max_policy_depth must be between 1 and 32".into(),
            ));
        }
        if let Some(id) = &self.default_policy_id {
            if id.is_empty() {
                return Err(LivGuardError::BadRequest(
                    "engine.default_policy_id must not be empty".into(),
                ));
            }
        }
        if matches!(self.state_path.as_deref(), Some("")) {
            return Err(LivGuardError::BadRequest(
                "engine.state_path must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_policy_depth() -> usize {
    5
}
fn default_policy_id() -> Option<String> {
    Some("default".into())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorSection {
    /// Consecutive breaching samples before a violation turns critical.
    #[serde(default = "default_critical_after")]
    pub critical_after: u32,

    /// Hold the instance for operator review on the first warning.
    #[serde(default)]
    pub suspend_on_warning: bool,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            critical_after: default_critical_after(),
            suspend_on_warning: false,
        }
    }
}

impl MonitorSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.critical_after) {
            return Err(LivGuardError::BadRequest(
                "monitor.critical_after must be between 1 and 100".into(),
            ));
        }
        Ok(())
    }
}

fn default_critical_after() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxSection {
    /// Time a module gets to wind down before its task is aborted.
    #[serde(default = "default_termination_grace_ms")]
    pub termination_grace_ms: u64,

    /// Per-instance sample channel capacity.
    #[serde(default = "default_sample_queue")]
    pub sample_queue: usize,

    /// Terminated instances kept for status queries; older ones are dropped.
    #[serde(default = "default_retain_terminated")]
    pub retain_terminated: usize,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            termination_grace_ms: default_termination_grace_ms(),
            sample_queue: default_sample_queue(),
            retain_terminated: default_retain_terminated(),
        }
    }
}

impl SandboxSection {
    pub fn validate(&self) -> Result<()> {
        if !(10..=60_000).contains(&self.termination_grace_ms) {
            return Err(LivGuardError::BadRequest(
                "sandbox.termination_grace_ms must be between 10 and 60000".into(),
            ));
        }
        if !(1..=65_536).contains(&self.sample_queue) {
            return Err(LivGuardError::BadRequest(
                "sandbox.sample_queue must be between 1 and 65536".into(),
            ));
        }
        if self.retain_terminated > 65_536 {
            return Err(LivGuardError::BadRequest(
                "sandbox.retain_terminated must be at most 65536".into(),
            ));
        }
        Ok(())
    }
}

fn default_termination_grace_ms() -> u64 {
    2000
}
fn default_sample_queue() -> usize {
    64
}
fn default_retain_terminated() -> usize {
    64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditSection {
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Required for the file sink.
    #[serde(default)]
    pub path: Option<String>,
}

impl AuditSection {
    pub fn validate(&self) -> Result<()> {
        match (self.sink, self.path.as_deref()) {
            (AuditSinkKind::File, None) | (AuditSinkKind::File, Some("")) => Err(
                LivGuardError::BadRequest("audit.path is required for the file sink".into()),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpsSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for OpsSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl OpsSection {
    pub fn validate(&self) -> Result<()> {
        self.listen.parse::<SocketAddr>().map_err(|_| {
            LivGuardError::BadRequest("ops.listen must be a valid socket address".into())
        })?;
        Ok(())
    }
}

fn default_listen() -> String {
    "127.0.0.1:9470".into()
}
