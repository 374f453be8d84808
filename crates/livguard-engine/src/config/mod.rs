//! Engine config loader (strict parsing).

pub mod schema;

use std::fs;

use livguard_core::error::{LivGuardError, Result};

pub use schema::{
    AuditSection, AuditSinkKind, EngineConfig, EngineSection, MonitorSection, OpsSection,
    SandboxSection,
};

pub fn load_from_file(path: &str) -> Result<EngineConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| LivGuardError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<EngineConfig> {
    let cfg: EngineConfig = serde_yaml::from_str(s)
        .map_err(|e| LivGuardError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
