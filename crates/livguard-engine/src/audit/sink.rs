//! Durable backends for the audit log.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use livguard_core::error::{LivGuardError, Result};
use livguard_core::event::SecurityEvent;

/// Storage behind the audit log. `append` must either persist the whole
/// record or fail; the log never retries on its own.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: &SecurityEvent) -> Result<()>;

    /// Every record previously persisted, in write order.
    fn load(&self) -> Result<Vec<SecurityEvent>>;

    fn name(&self) -> &'static str;
}

/// Keeps nothing beyond the log's own in-memory index.
#[derive(Debug, Default)]
pub struct MemorySink;

impl AuditSink for MemorySink {
    fn append(&self, _event: &SecurityEvent) -> Result<()> {
        Ok(())
    }

    fn load(&self) -> Result<Vec<SecurityEvent>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// JSON-lines file, opened in append mode.
///
/// Appends are synchronous: `record` returns once the line is written, so a
/// caller on a runtime worker blocks for one small write. A record left
/// half-written by a crash is cut off on open so the next append starts on a
/// fresh line.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    LivGuardError::LogUnavailable(format!("create {}: {e}", parent.display()))
                })?;
            }
        }
        trim_torn_tail(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LivGuardError::LogUnavailable(format!("open {}: {e}", path.display())))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileSink {
    fn append(&self, event: &SecurityEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)
            .map_err(|e| LivGuardError::Internal(format!("encode audit event: {e}")))?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| LivGuardError::LogUnavailable("audit file lock poisoned".into()))?;
        // single write_all per record
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| LivGuardError::LogUnavailable(format!("write {}: {e}", self.path.display())))
    }

    fn load(&self) -> Result<Vec<SecurityEvent>> {
        let file = File::open(&self.path)
            .map_err(|e| LivGuardError::LogUnavailable(format!("read {}: {e}", self.path.display())))?;
        let mut out = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| LivGuardError::LogUnavailable(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SecurityEvent>(&line) {
                Ok(ev) => out.push(ev),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), line = n + 1, error = %e, "skipping malformed audit record");
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Truncate `path` back to its last complete line.
fn trim_torn_tail(path: &Path) -> Result<()> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(LivGuardError::LogUnavailable(format!(
                "read {}: {e}",
                path.display()
            )))
        }
    };
    if raw.is_empty() || raw.ends_with(b"\n") {
        return Ok(());
    }
    let keep = raw.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|f| f.set_len(keep as u64))
        .map_err(|e| LivGuardError::LogUnavailable(format!("truncate {}: {e}", path.display())))?;
    tracing::warn!(path = %path.display(), dropped_bytes = raw.len() - keep, "torn audit record truncated");
    Ok(())
}
