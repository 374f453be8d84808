//! Versioned policy store.
//!
//! - `id -> Arc<RwLock<PolicyEntry>>`: reads and writes lock a single entry.
//! - A short structural mutex serializes create/delete and parent changes so
//!   ancestry checks see a stable forest.
//! - Every committed write bumps a global generation used by the resolver
//!   cache.
//!
//! The audit record for a write is appended while the entry lock is held and
//! before the new version is visible; a failed append commits nothing.
//!
//! With a snapshot path every retained version is written to one JSON file
//! before a write becomes visible; a failed write commits nothing. Writers
//! then take the snapshot mutex first (snapshot, structure, entry).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use livguard_core::error::{LivGuardError, Result};
use livguard_core::event::{EventAction, EventSeverity, NewEvent};
use livguard_core::policy::Policy;

use crate::audit::AuditLog;
use crate::obs::EngineMetrics;
use crate::resolver::walk_chain;

struct PolicyEntry {
    current: Arc<Policy>,
    created_seq: u64,
    /// Committed versions, oldest first; the last one is `current`.
    history: Vec<Arc<Policy>>,
    removed: bool,
}

/// On-disk form of one policy: retained versions, oldest first.
#[derive(Serialize, Deserialize)]
struct StoredPolicy {
    history: Vec<Policy>,
}

impl StoredPolicy {
    fn from_history(history: &[Arc<Policy>]) -> Self {
        Self {
            history: history.iter().map(|p| (**p).clone()).collect(),
        }
    }
}

pub struct PolicyStore {
    entries: DashMap<String, Arc<RwLock<PolicyEntry>>>,
    structure: Mutex<()>,
    generation: AtomicU64,
    seq: AtomicU64,
    max_depth: usize,
    protected_id: Option<String>,
    snapshot: Option<PathBuf>,
    persist: Mutex<()>,
    audit: Arc<AuditLog>,
    metrics: Arc<EngineMetrics>,
}

fn poisoned() -> LivGuardError {
    LivGuardError::Internal("policy store lock poisoned".into())
}

impl PolicyStore {
    pub fn new(
        max_depth: usize,
        protected_id: Option<String>,
        audit: Arc<AuditLog>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            structure: Mutex::new(()),
            generation: AtomicU64::new(0),
            seq: AtomicU64::new(1),
            max_depth,
            protected_id,
            snapshot: None,
            persist: Mutex::new(()),
            audit,
            metrics,
        }
    }

    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot = Some(path.into());
        self
    }

    /// Load the snapshot file, if configured and present. Restored policies
    /// keep their versions and are not audited again. Returns how many were
    /// loaded.
    pub fn restore(&self) -> Result<usize> {
        let Some(path) = &self.snapshot else { return Ok(0) };
        if !path.exists() {
            return Ok(0);
        }
        let raw = fs::read_to_string(path)
            .map_err(|e| LivGuardError::Internal(format!("read {}: {e}", path.display())))?;
        let stored: Vec<StoredPolicy> = serde_json::from_str(&raw)
            .map_err(|e| LivGuardError::InvalidPolicy(format!("{}: {e}", path.display())))?;

        let _structure = self.structure.lock().map_err(|_| poisoned())?;
        let mut loaded: Vec<Vec<Arc<Policy>>> = Vec::with_capacity(stored.len());
        for sp in stored {
            let history: Vec<Arc<Policy>> = sp.history.into_iter().map(Arc::new).collect();
            let Some(current) = history.last() else {
                return Err(LivGuardError::InvalidPolicy(format!(
                    "{}: policy without versions",
                    path.display()
                )));
            };
            current.validate()?;
            let duplicate = self.entries.contains_key(&current.id)
                || loaded.iter().any(|h| h.last().map(|p| &p.id) == Some(&current.id));
            if duplicate {
                return Err(LivGuardError::Conflict(format!("policy {}", current.id)));
            }
            loaded.push(history);
        }

        let ids: Vec<String> = loaded
            .iter()
            .filter_map(|h| h.last().map(|p| p.id.clone()))
            .collect();
        for history in loaded {
            let Some(current) = history.last().cloned() else { continue };
            let created_seq = self.seq.fetch_add(1, Ordering::Relaxed);
            self.entries.insert(
                current.id.clone(),
                Arc::new(RwLock::new(PolicyEntry {
                    current,
                    created_seq,
                    history,
                    removed: false,
                })),
            );
        }
        for id in &ids {
            walk_chain(|pid| self.snapshot(pid), id, self.max_depth)?;
        }
        self.bump();
        tracing::info!(path = %path.display(), restored = ids.len(), "policy snapshot restored");
        Ok(ids.len())
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Id of the policy that can never be deleted, if any.
    pub fn default_policy_id(&self) -> Option<&str> {
        self.protected_id.as_deref()
    }

    /// Changes on every committed write.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Current version, or `None`. Never blocks on other ids.
    pub fn snapshot(&self, id: &str) -> Option<Arc<Policy>> {
        let entry = self.entries.get(id).map(|r| Arc::clone(r.value()))?;
        let guard = entry.read().ok()?;
        if guard.removed {
            return None;
        }
        Some(Arc::clone(&guard.current))
    }

    pub fn get(&self, id: &str) -> Result<Arc<Policy>> {
        self.snapshot(id)
            .ok_or_else(|| LivGuardError::NotFound(format!("policy {id}")))
    }

    /// All policies in creation order.
    pub fn list(&self) -> Vec<Arc<Policy>> {
        let mut all: Vec<(u64, Arc<Policy>)> = self
            .entry_handles(None)
            .iter()
            .filter_map(|entry| {
                let g = entry.read().ok()?;
                if g.removed {
                    return None;
                }
                Some((g.created_seq, Arc::clone(&g.current)))
            })
            .collect();
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, p)| p).collect()
    }

    /// Ids of policies whose parent is `id`.
    pub fn children(&self, id: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .list()
            .into_iter()
            .filter(|p| p.parent_policy_id.as_deref() == Some(id))
            .map(|p| p.id.clone())
            .collect();
        out.sort();
        out
    }

    /// Retained versions of `id`, oldest first.
    pub fn history(&self, id: &str) -> Result<Vec<Arc<Policy>>> {
        let entry = self.entry(id)?;
        let guard = entry.read().map_err(|_| poisoned())?;
        Ok(guard.history.clone())
    }

    pub fn create(&self, policy: Policy, actor: &str) -> Result<Arc<Policy>> {
        policy.validate()?;

        let _write = self.write_guard()?;
        let _structure = self.structure.lock().map_err(|_| poisoned())?;
        if self.entries.contains_key(&policy.id) {
            return Err(LivGuardError::Conflict(format!("policy {}", policy.id)));
        }
        self.check_ancestry(&policy)?;

        let now = Utc::now();
        let mut policy = policy;
        policy.version = 1;
        policy.created_at = Some(now);
        policy.updated_at = Some(now);
        policy.created_by = actor.to_string();
        let policy = Arc::new(policy);

        let mut ev = NewEvent::new(
            actor,
            EventAction::PolicyCreated,
            format!("policy {} created", policy.id),
        )
        .policy(policy.id.clone())
        .detail("version", 1u64);
        if let Some(parent) = &policy.parent_policy_id {
            ev = ev.detail("parent_policy_id", parent.clone());
        }

        let created_seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let history = vec![Arc::clone(&policy)];
        self.persist_pending(&policy.id, Some((created_seq, history.as_slice())))?;
        if let Err(e) = self.audit.record(ev) {
            self.roll_back(&policy.id, None);
            return Err(e);
        }

        self.entries.insert(
            policy.id.clone(),
            Arc::new(RwLock::new(PolicyEntry {
                current: Arc::clone(&policy),
                created_seq,
                history,
                removed: false,
            })),
        );
        self.bump();
        self.metrics.policy_writes.inc(&[("op", "create")]);
        tracing::info!(policy = %policy.id, actor, parent = ?policy.parent_policy_id, "policy created");
        Ok(policy)
    }

    /// Optimistic update: `mutator` runs on a copy of the version the caller
    /// expects; the result is committed as `expected_version + 1`.
    ///
    /// The mutator cannot change identity or bookkeeping fields.
    pub fn update<F>(
        &self,
        id: &str,
        expected_version: u64,
        mutator: F,
        actor: &str,
    ) -> Result<Arc<Policy>>
    where
        F: FnOnce(&mut Policy),
    {
        let _write = self.write_guard()?;
        let entry = self.entry(id)?;

        let current = {
            let g = entry.read().map_err(|_| poisoned())?;
            Arc::clone(&g.current)
        };
        if current.version != expected_version {
            return Err(LivGuardError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                found: current.version,
            });
        }

        let mut next = (*current).clone();
        mutator(&mut next);
        next.id = current.id.clone();
        next.version = current.version + 1;
        next.created_at = current.created_at;
        next.created_by = current.created_by.clone();
        next.updated_at = Some(Utc::now());
        next.validate()?;

        let reparent = next.parent_policy_id != current.parent_policy_id;
        let _structure = if reparent {
            Some(self.structure.lock().map_err(|_| poisoned())?)
        } else {
            None
        };

        let mut guard = entry.write().map_err(|_| poisoned())?;
        if guard.removed {
            return Err(LivGuardError::NotFound(format!("policy {id}")));
        }
        if guard.current.version != expected_version {
            return Err(LivGuardError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                found: guard.current.version,
            });
        }
        if reparent {
            self.check_ancestry(&next)?;
        }

        let next = Arc::new(next);
        let mut history = guard.history.clone();
        history.push(Arc::clone(&next));
        prune_history(&mut history, Utc::now());
        self.persist_pending(id, Some((guard.created_seq, history.as_slice())))?;

        let recorded = self.audit.record(
            NewEvent::new(
                actor,
                EventAction::PolicyUpdated,
                format!("policy {id} updated to version {}", next.version),
            )
            .policy(id)
            .detail("version", next.version)
            .detail("previous_version", expected_version),
        );
        if let Err(e) = recorded {
            self.roll_back(id, Some((guard.created_seq, guard.history.as_slice())));
            return Err(e);
        }

        guard.current = Arc::clone(&next);
        guard.history = history;
        drop(guard);

        self.bump();
        self.metrics.policy_writes.inc(&[("op", "update")]);
        tracing::info!(policy = %id, version = next.version, actor, "policy updated");
        Ok(next)
    }

    pub fn delete(&self, id: &str, actor: &str) -> Result<()> {
        let _write = self.write_guard()?;
        let _structure = self.structure.lock().map_err(|_| poisoned())?;
        let entry = self.entry(id)?;

        if self.protected_id.as_deref() == Some(id) {
            return Err(LivGuardError::PolicyInUse(format!(
                "{id} is the default policy"
            )));
        }
        let children = self.children(id);
        if !children.is_empty() {
            return Err(LivGuardError::PolicyInUse(format!(
                "{id} is the parent of {}",
                children.join(", ")
            )));
        }

        // held so no update can commit between the audit record and removal
        let mut guard = entry.write().map_err(|_| poisoned())?;
        self.persist_pending(id, None)?;
        let recorded = self.audit.record(
            NewEvent::new(actor, EventAction::PolicyDeleted, format!("policy {id} deleted"))
                .policy(id)
                .severity(EventSeverity::Medium)
                .detail("version", guard.current.version),
        );
        if let Err(e) = recorded {
            self.roll_back(id, Some((guard.created_seq, guard.history.as_slice())));
            return Err(e);
        }
        guard.removed = true;
        drop(guard);
        self.entries.remove(id);

        self.bump();
        self.metrics.policy_writes.inc(&[("op", "delete")]);
        tracing::info!(policy = %id, actor, "policy deleted");
        Ok(())
    }

    fn entry(&self, id: &str) -> Result<Arc<RwLock<PolicyEntry>>> {
        self.entries
            .get(id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| LivGuardError::NotFound(format!("policy {id}")))
    }

    /// Walk the chain the candidate would have once committed.
    fn check_ancestry(&self, candidate: &Policy) -> Result<()> {
        if candidate.parent_policy_id.is_none() {
            return Ok(());
        }
        let own = Arc::new(candidate.clone());
        walk_chain(
            |pid| {
                if pid == own.id {
                    Some(Arc::clone(&own))
                } else {
                    self.snapshot(pid)
                }
            },
            &candidate.id,
            self.max_depth,
        )
        .map(|_| ())
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Entry handles, copied out so no map shard stays locked while an
    /// entry lock is taken.
    fn entry_handles(&self, except: Option<&str>) -> Vec<Arc<RwLock<PolicyEntry>>> {
        self.entries
            .iter()
            .filter(|r| Some(r.key().as_str()) != except)
            .map(|r| Arc::clone(r.value()))
            .collect()
    }

    /// Held for a whole write when a snapshot is configured, so the file and
    /// the visible state change together. `None` in memory-only mode.
    fn write_guard(&self) -> Result<Option<MutexGuard<'_, ()>>> {
        if self.snapshot.is_none() {
            return Ok(None);
        }
        self.persist.lock().map(Some).map_err(|_| poisoned())
    }

    /// Rewrite the snapshot as it will be once `id` holds `pending`
    /// (`None`: removed). Caller holds the write guard and `id`'s entry lock.
    fn persist_pending(&self, id: &str, pending: Option<(u64, &[Arc<Policy>])>) -> Result<()> {
        let Some(path) = &self.snapshot else { return Ok(()) };

        let mut all: Vec<(u64, StoredPolicy)> = Vec::with_capacity(self.entries.len() + 1);
        for entry in self.entry_handles(Some(id)) {
            let g = entry.read().map_err(|_| poisoned())?;
            if !g.removed {
                all.push((g.created_seq, StoredPolicy::from_history(&g.history)));
            }
        }
        if let Some((seq, history)) = pending {
            all.push((seq, StoredPolicy::from_history(history)));
        }
        all.sort_by_key(|(seq, _)| *seq);
        let stored: Vec<StoredPolicy> = all.into_iter().map(|(_, sp)| sp).collect();

        write_snapshot(path, &stored).map_err(|e| {
            self.metrics.policy_writes.inc(&[("op", "persist_failed")]);
            tracing::error!(path = %path.display(), error = %e, "policy snapshot not written");
            e
        })
    }

    /// Put the snapshot back after a write that failed past persistence.
    fn roll_back(&self, id: &str, previous: Option<(u64, &[Arc<Policy>])>) {
        if let Err(e) = self.persist_pending(id, previous) {
            tracing::error!(policy = %id, error = %e, "policy snapshot not rolled back");
        }
    }
}

fn write_snapshot(path: &Path, stored: &[StoredPolicy]) -> Result<()> {
    let body = serde_json::to_vec_pretty(stored)
        .map_err(|e| LivGuardError::Internal(format!("encode snapshot: {e}")))?;
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .map_err(|e| LivGuardError::Internal(format!("create {}: {e}", dir.display())))?;
        }
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body)
        .and_then(|_| fs::rename(&tmp, path))
        .map_err(|e| LivGuardError::Internal(format!("write {}: {e}", path.display())))
}

/// Drop versions older than the current version's retention window as of
/// `now`. The current version always stays; `log_retention_days == 0` keeps
/// everything.
pub fn prune_history(history: &mut Vec<Arc<Policy>>, now: DateTime<Utc>) {
    let Some(current) = history.last() else { return };
    let days = current.events.log_retention_days;
    if days == 0 {
        return;
    }
    let cutoff = now - Duration::days(i64::from(days));
    let keep_from = history.len() - 1;
    let mut first = 0;
    while first < keep_from {
        match history[first].updated_at {
            Some(ts) if ts < cutoff => first += 1,
            _ => break,
        }
    }
    if first > 0 {
        history.drain(..first);
    }
}
