//! Sandbox orchestrator.
//!
//! `launch` runs the admission pipeline synchronously and, on acceptance,
//! spawns one supervisor task per instance. The supervisor owns the sample
//! channel, so one instance's samples are classified in arrival order, and it
//! is the only place an instance is torn down:
//!
//! 1. signal stop (modules see it through their `SandboxContext`)
//! 2. wait `termination_grace_ms`
//! 3. abort the module task if it is still running
//!
//! Every state change is audited. A transition that cannot be audited stops
//! the instance. Terminated instances leave the live table; the last
//! `retain_terminated` of them stay queryable.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use livguard_core::decision::Decision;
use livguard_core::error::{LivGuardError, ReasonCode, Result};
use livguard_core::event::{EventAction, EventSeverity, NewEvent, Outcome};
use livguard_core::request::{LoadRequest, ModuleBundle};
use livguard_core::sample::{ResourceSample, Violation, ViolationSeverity};
use livguard_core::sandbox::{SandboxId, SandboxState, StopReason};

use crate::audit::AuditLog;
use crate::config::SandboxSection;
use crate::evaluator::{EvalContext, PermissionEvaluator};
use crate::monitor::ResourceMonitor;
use crate::obs::EngineMetrics;
use crate::quarantine::QuarantineRegistry;
use crate::resolver::PolicyResolver;

use super::instance::{SandboxHandle, SandboxSummary};
use super::runtime::{ExecutionLimits, ModuleRuntime};
use super::verify::verify_module;

/// Host callbacks. Called from supervisor tasks; keep them short.
pub trait SandboxObserver: Send + Sync {
    fn on_violation(&self, _id: SandboxId, _violation: &Violation) {}
    fn on_suspended(&self, _id: SandboxId) {}
    fn on_terminated(&self, _id: SandboxId, _reason: &StopReason) {}
}

/// Components the orchestrator drives.
pub struct OrchestratorDeps {
    pub resolver: Arc<PolicyResolver>,
    pub evaluator: Arc<PermissionEvaluator>,
    pub monitor: Arc<ResourceMonitor>,
    pub quarantine: Arc<QuarantineRegistry>,
    pub audit: Arc<AuditLog>,
    pub metrics: Arc<EngineMetrics>,
    pub runtime: Arc<dyn ModuleRuntime>,
}

#[derive(Clone)]
pub struct SandboxOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    deps: OrchestratorDeps,
    cfg: SandboxSection,
    sandboxes: DashMap<SandboxId, Arc<SandboxHandle>>,
    /// Recently terminated, oldest first.
    retired: Mutex<VecDeque<Arc<SandboxHandle>>>,
    /// Live modules per document.
    documents: DashMap<String, u32>,
    observers: RwLock<Vec<Arc<dyn SandboxObserver>>>,
}

/// A host matches a blocked entry or any subdomain of one; case-insensitive.
fn is_blocked(host: &str, blocked: &BTreeSet<String>) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    blocked.iter().any(|entry| {
        let entry = entry.trim_end_matches('.').to_ascii_lowercase();
        host == entry
            || host
                .strip_suffix(entry.as_str())
                .is_some_and(|rest| rest.ends_with('.'))
    })
}

fn exceeds(value: u64, ceiling: u64) -> bool {
    ceiling != 0 && value > ceiling
}

impl SandboxOrchestrator {
    pub fn new(deps: OrchestratorDeps, cfg: SandboxSection) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                deps,
                cfg,
                sandboxes: DashMap::new(),
                retired: Mutex::new(VecDeque::new()),
                documents: DashMap::new(),
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn SandboxObserver>) {
        if let Ok(mut g) = self.inner.observers.write() {
            g.push(observer);
        }
    }

    /// Admit one module and start it. Outside a Tokio runtime it fails with
    /// `Internal` before anything is admitted.
    ///
    /// Pipeline: resolve, verify, quarantine, document size, module count,
    /// permission evaluation, declared imports. Each rejection is audited and
    /// leaves no instance behind.
    pub fn launch(&self, req: LoadRequest) -> Result<SandboxId> {
        let inner = &self.inner;
        let deps = &inner.deps;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| LivGuardError::Internal("launch called outside a Tokio runtime".into()))?;

        let eff = match deps.resolver.resolve(&req.policy_id) {
            Ok(p) => p,
            Err(e) => {
                return match inner.reject(&req, e.reason_code(), e.to_string()) {
                    Ok(_) => Err(e),
                    Err(log) => Err(log),
                };
            }
        };

        if let Decision::Deny { code, reason } = verify_module(&req.module, &eff.admin) {
            return Err(inner.reject_or(&req, code, reason));
        }

        if deps.quarantine.is_quarantined(&req.document_id) {
            return Err(inner.reject_or(
                &req,
                ReasonCode::DocumentQuarantined,
                format!("document {} is quarantined", req.document_id),
            ));
        }

        if exceeds(req.document_size, eff.admin.max_document_size) {
            return Err(inner.reject_or(
                &req,
                ReasonCode::DocumentTooLarge,
                format!(
                    "document size {} exceeds limit {}",
                    req.document_size, eff.admin.max_document_size
                ),
            ));
        }
        if let Some(kind) = req
            .resource_types
            .iter()
            .find(|kind| !eff.admin.allowed_file_types.contains(kind.as_str()))
        {
            return Err(inner.reject_or(
                &req,
                ReasonCode::FileTypeNotAllowed,
                format!("resource type {kind} is not allowed"),
            ));
        }
        if let Some(host) = req
            .referenced_domains
            .iter()
            .find(|host| is_blocked(host, &eff.admin.blocked_domains))
        {
            return Err(inner.reject_or(
                &req,
                ReasonCode::BlockedDomain,
                format!("document references blocked domain {host}"),
            ));
        }

        let Some(mut slot) = ModuleSlot::reserve(
            Arc::clone(&self.inner),
            &req.document_id,
            eff.admin.max_wasm_modules,
        ) else {
            return Err(inner.reject_or(
                &req,
                ReasonCode::TooManyModules,
                format!(
                    "document {} already runs {} module(s)",
                    req.document_id, eff.admin.max_wasm_modules
                ),
            ));
        };

        let ctx = EvalContext {
            actor: &req.actor,
            document_id: Some(&req.document_id),
        };
        if let Decision::Deny { code, reason } =
            deps.evaluator.evaluate(ctx, &req.permissions, &eff)?
        {
            deps.metrics
                .admissions_rejected
                .inc(&[("code", code.as_str())]);
            return Err(LivGuardError::PermissionDenied { code, reason });
        }

        let undeclared: Vec<&str> = req
            .module
            .descriptor
            .imports
            .iter()
            .filter(|i| !eff.security.wasm.allowed_imports.contains(*i))
            .map(String::as_str)
            .collect();
        if !undeclared.is_empty() {
            return Err(inner.reject_or(
                &req,
                ReasonCode::ImportNotAllowed,
                format!("module imports not allowed: {}", undeclared.join(", ")),
            ));
        }

        let limits = ExecutionLimits::granted(&req.permissions, &eff);
        let (tx, rx) = mpsc::channel(inner.cfg.sample_queue);
        let handle = Arc::new(SandboxHandle::new(
            req.document_id.clone(),
            req.module.descriptor.name.clone(),
            Arc::clone(&eff),
            tx,
        ));
        let id = handle.id;

        deps.audit.record(
            NewEvent::new(
                &req.actor,
                EventAction::SandboxTransition,
                format!("sandbox {id} created for module {}", handle.module),
            )
            .policy(eff.policy_id.clone())
            .document(&req.document_id)
            .sandbox(id)
            .detail("to", SandboxState::Created.as_str())
            .detail("module", handle.module.clone())
            .detail("memory_limit", limits.memory_limit)
            .detail("cpu_time_limit_ms", limits.cpu_time_limit_ms),
        )?;

        deps.monitor.register(id, &req.document_id, Arc::clone(&eff));
        inner.sandboxes.insert(id, Arc::clone(&handle));
        slot.keep();
        deps.metrics.sandboxes_active.inc(&[]);
        deps.metrics
            .sandbox_transitions
            .inc(&[("to", SandboxState::Created.as_str())]);

        tracing::info!(
            sandbox = %id,
            document = %req.document_id,
            module = %handle.module,
            policy = %eff.policy_id,
            "sandbox admitted"
        );

        runtime.spawn(Arc::clone(&self.inner).supervise(handle, req.module, limits, rx));
        Ok(id)
    }

    /// Request termination. Idempotent until the instance is terminated.
    pub fn stop(&self, id: SandboxId, actor: &str) -> Result<()> {
        let handle = self.inner.handle(id)?;
        handle.request_stop(StopReason::Requested {
            actor: actor.to_string(),
        })
    }

    pub fn suspend(&self, id: SandboxId, actor: &str) -> Result<()> {
        let handle = self.inner.handle(id)?;
        self.inner.suspend(&handle, actor)
    }

    pub fn resume(&self, id: SandboxId, actor: &str) -> Result<()> {
        let handle = self.inner.handle(id)?;
        if handle.state() != SandboxState::Suspended {
            return Err(LivGuardError::InvalidState {
                from: handle.state().as_str().to_string(),
                to: SandboxState::Running.as_str().to_string(),
            });
        }
        self.inner.transition(&handle, SandboxState::Running, actor, None)
    }

    pub fn state(&self, id: SandboxId) -> Result<SandboxState> {
        Ok(self.inner.handle(id)?.state())
    }

    pub fn get(&self, id: SandboxId) -> Result<SandboxSummary> {
        let handle = self.inner.handle(id)?;
        Ok(handle.summary(self.inner.deps.monitor.latest(id)))
    }

    pub fn list(&self) -> Vec<SandboxSummary> {
        let mut out: Vec<SandboxSummary> = self
            .inner
            .sandboxes
            .iter()
            .map(|r| r.value().summary(self.inner.deps.monitor.latest(*r.key())))
            .collect();
        out.extend(self.inner.retired().iter().map(|h| h.summary(None)));
        out.sort_by_key(|s| s.started_at);
        out
    }

    pub fn live_count(&self) -> usize {
        self.inner
            .sandboxes
            .iter()
            .filter(|r| r.value().state().is_live())
            .count()
    }

    /// Feed a usage reading from the host side. Never blocks: a full queue
    /// is reported back instead.
    pub fn report_sample(&self, id: SandboxId, sample: ResourceSample) -> Result<()> {
        let handle = self.inner.handle(id)?;
        let state = handle.state();
        if state.is_final() {
            return Err(LivGuardError::InvalidState {
                from: state.as_str().to_string(),
                to: SandboxState::Running.as_str().to_string(),
            });
        }
        handle.sample_sender().try_send(sample).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                LivGuardError::BadRequest(format!("sample queue for {id} is full"))
            }
            mpsc::error::TrySendError::Closed(_) => LivGuardError::InvalidState {
                from: handle.state().as_str().to_string(),
                to: SandboxState::Running.as_str().to_string(),
            },
        })
    }

    /// Wait until the instance is terminated and return why.
    pub async fn wait_terminated(&self, id: SandboxId) -> Result<StopReason> {
        let handle = self.inner.handle(id)?;
        let mut rx = handle.subscribe_state();
        loop {
            let done = rx.borrow_and_update().is_final();
            if done {
                break;
            }
            rx.changed()
                .await
                .map_err(|_| LivGuardError::Internal(format!("sandbox {id} state channel closed")))?;
        }
        handle
            .outcome()
            .ok_or_else(|| LivGuardError::Internal(format!("sandbox {id} ended without outcome")))
    }

    /// Drop a terminated instance's record before it ages out.
    pub fn forget(&self, id: SandboxId) -> Result<()> {
        let handle = self.inner.handle(id)?;
        let state = handle.state();
        if !state.is_final() {
            return Err(LivGuardError::InvalidState {
                from: state.as_str().to_string(),
                to: "forgotten".to_string(),
            });
        }
        self.inner.sandboxes.remove(&id);
        if let Ok(mut retired) = self.inner.retired.lock() {
            retired.retain(|h| h.id != id);
        }
        Ok(())
    }

    /// Stop every live instance and wait for all of them.
    pub async fn shutdown(&self, actor: &str) {
        let ids: Vec<SandboxId> = self
            .inner
            .sandboxes
            .iter()
            .filter(|r| r.value().state().is_live())
            .map(|r| *r.key())
            .collect();
        for id in &ids {
            let _ = self.stop(*id, actor);
        }
        let waits = ids.iter().map(|id| async move { (*id, self.wait_terminated(*id).await) });
        for (id, res) in join_all(waits).await {
            if let Err(e) = res {
                tracing::warn!(sandbox = %id, error = %e, "sandbox did not report termination");
            }
        }
    }
}

impl OrchestratorInner {
    fn handle(&self, id: SandboxId) -> Result<Arc<SandboxHandle>> {
        if let Some(h) = self.sandboxes.get(&id).map(|r| Arc::clone(r.value())) {
            return Ok(h);
        }
        self.retired()
            .into_iter()
            .find(|h| h.id == id)
            .ok_or_else(|| LivGuardError::NotFound(format!("sandbox {id}")))
    }

    fn retired(&self) -> Vec<Arc<SandboxHandle>> {
        self.retired
            .lock()
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Move a terminated instance out of the live table.
    fn retire(&self, handle: &Arc<SandboxHandle>) {
        if self.cfg.retain_terminated > 0 {
            if let Ok(mut retired) = self.retired.lock() {
                retired.push_back(Arc::clone(handle));
                while retired.len() > self.cfg.retain_terminated {
                    retired.pop_front();
                }
            }
        }
        self.sandboxes.remove(&handle.id);
    }

    fn observers(&self) -> Vec<Arc<dyn SandboxObserver>> {
        self.observers.read().map(|g| g.clone()).unwrap_or_default()
    }

    /// Audit an admission rejection. Returns the error to surface, or the
    /// audit failure when the rejection itself could not be logged.
    fn reject(&self, req: &LoadRequest, code: ReasonCode, reason: String) -> Result<LivGuardError> {
        self.deps
            .metrics
            .admissions_rejected
            .inc(&[("code", code.as_str())]);
        tracing::info!(
            document = %req.document_id,
            module = %req.module.descriptor.name,
            policy = %req.policy_id,
            code = code.as_str(),
            %reason,
            "module rejected"
        );
        self.deps.audit.record(
            NewEvent::new(&req.actor, EventAction::ModuleRejected, reason.clone())
                .policy(req.policy_id.clone())
                .document(&req.document_id)
                .severity(EventSeverity::Medium)
                .outcome(Outcome::Denied {
                    code: code.as_str().to_string(),
                })
                .detail("module", req.module.descriptor.name.clone())
                .detail("module_version", req.module.descriptor.version.clone()),
        )?;
        Ok(LivGuardError::ModuleRejected { code, reason })
    }

    fn reject_or(&self, req: &LoadRequest, code: ReasonCode, reason: String) -> LivGuardError {
        match self.reject(req, code, reason) {
            Ok(e) | Err(e) => e,
        }
    }

    /// Move `handle` to `next` and audit it. If the audit append fails the
    /// instance is told to stop.
    fn transition(
        &self,
        handle: &SandboxHandle,
        next: SandboxState,
        actor: &str,
        reason: Option<&StopReason>,
    ) -> Result<()> {
        let prev = handle.transition(next)?;
        self.deps
            .metrics
            .sandbox_transitions
            .inc(&[("to", next.as_str())]);

        let severity = match reason {
            Some(StopReason::CriticalViolation { .. }) | Some(StopReason::AuditFailure { .. }) => {
                EventSeverity::High
            }
            Some(StopReason::Failed { .. }) | Some(StopReason::Timeout { .. }) => {
                EventSeverity::Medium
            }
            _ => EventSeverity::Info,
        };
        let mut ev = NewEvent::new(
            actor,
            EventAction::SandboxTransition,
            format!("sandbox {} {} -> {}", handle.id, prev, next),
        )
        .policy(handle.policy.policy_id.clone())
        .document(handle.document_id.clone())
        .sandbox(handle.id)
        .severity(severity)
        .detail("from", prev.as_str())
        .detail("to", next.as_str());
        if let Some(r) = reason {
            ev = ev.detail("reason", r.as_str());
            if let Ok(v) = serde_json::to_value(r) {
                ev = ev.detail("stop", v);
            }
        }

        tracing::debug!(sandbox = %handle.id, from = %prev, to = %next, "sandbox transition");
        if let Err(e) = self.deps.audit.record(ev) {
            if !next.is_final() && next != SandboxState::Terminating {
                let _ = handle.request_stop(StopReason::AuditFailure {
                    message: e.to_string(),
                });
            }
            return Err(e);
        }
        Ok(())
    }

    fn suspend(&self, handle: &SandboxHandle, actor: &str) -> Result<()> {
        let state = handle.state();
        if state != SandboxState::Running {
            return Err(LivGuardError::InvalidState {
                from: state.as_str().to_string(),
                to: SandboxState::Suspended.as_str().to_string(),
            });
        }
        self.transition(handle, SandboxState::Suspended, actor, None)?;
        for o in self.observers() {
            o.on_suspended(handle.id);
        }
        Ok(())
    }

    /// Classify one sample; returns a reason when the instance must end.
    fn on_sample(&self, handle: &SandboxHandle, sample: ResourceSample) -> Option<StopReason> {
        let report = match self.deps.monitor.observe(handle.id, sample) {
            Ok(r) => r,
            Err(e @ LivGuardError::LogUnavailable(_)) => {
                return Some(StopReason::AuditFailure {
                    message: e.to_string(),
                })
            }
            Err(e) => {
                tracing::warn!(sandbox = %handle.id, error = %e, "sample dropped");
                return None;
            }
        };
        if report.is_clean() {
            return None;
        }

        let observers = self.observers();
        for v in &report.violations {
            for o in &observers {
                o.on_violation(handle.id, v);
            }
        }

        if let Some(v) = report
            .violations
            .iter()
            .find(|v| v.severity == ViolationSeverity::Critical)
        {
            return Some(StopReason::CriticalViolation { code: v.code() });
        }

        if self.deps.monitor.settings().suspend_on_warning
            && handle.state() == SandboxState::Running
        {
            if let Err(e) = self.suspend(handle, "monitor") {
                if matches!(e, LivGuardError::LogUnavailable(_)) {
                    return Some(StopReason::AuditFailure {
                        message: e.to_string(),
                    });
                }
            }
        }
        None
    }

    async fn supervise(
        self: Arc<Self>,
        handle: Arc<SandboxHandle>,
        bundle: ModuleBundle,
        limits: ExecutionLimits,
        mut samples: mpsc::Receiver<ResourceSample>,
    ) {
        let mut stop_rx = handle.subscribe_stop();

        if let Err(e) = self.transition(&handle, SandboxState::Initializing, "orchestrator", None) {
            let reason = StopReason::AuditFailure {
                message: e.to_string(),
            };
            return self.finish(&handle, None, reason).await;
        }

        let instance = tokio::select! {
            r = self.deps.runtime.instantiate(&bundle, &limits) => match r {
                Ok(i) => i,
                Err(e) => {
                    tracing::warn!(sandbox = %handle.id, error = %e, "module instantiation failed");
                    let reason = StopReason::InitFailed { message: e.to_string() };
                    return self.finish(&handle, None, reason).await;
                }
            },
            reason = stop_signal(&mut stop_rx) => {
                return self.finish(&handle, None, reason).await;
            }
        };
        drop(bundle);

        if let Err(e) = self.transition(&handle, SandboxState::Running, "orchestrator", None) {
            let reason = handle.stop_requested().unwrap_or(StopReason::AuditFailure {
                message: e.to_string(),
            });
            return self.finish(&handle, None, reason).await;
        }

        let mut module = tokio::spawn(instance.run(handle.context()));
        // a timeout past the clock's range means no deadline
        let deadline = limits.timeout.and_then(|t| Instant::now().checked_add(t));

        let (reason, module_done) = loop {
            tokio::select! {
                biased;

                reason = stop_signal(&mut stop_rx) => break (reason, false),
                res = &mut module => {
                    let reason = match res {
                        Ok(Ok(())) => handle.stop_requested().unwrap_or(StopReason::Completed),
                        Ok(Err(e)) => StopReason::Failed { message: e.to_string() },
                        Err(e) => StopReason::Failed { message: format!("module task: {e}") },
                    };
                    break (reason, true);
                }
                _ = until(deadline) => {
                    let after_secs = limits.timeout.map(|t| t.as_secs()).unwrap_or(0);
                    break (StopReason::Timeout { after_secs }, false);
                }
                Some(sample) = samples.recv() => {
                    if let Some(reason) = self.on_sample(&handle, sample) {
                        break (reason, false);
                    }
                }
            }
        };

        let module = if module_done { None } else { Some(module) };
        self.finish(&handle, module, reason).await;
    }

    async fn finish(
        &self,
        handle: &Arc<SandboxHandle>,
        module: Option<JoinHandle<Result<()>>>,
        reason: StopReason,
    ) {
        let id = handle.id;

        if handle.state() == SandboxState::Created {
            let _ = self.transition(handle, SandboxState::Initializing, "orchestrator", None);
        }
        if let Err(e) = self.transition(handle, SandboxState::Terminating, "orchestrator", Some(&reason)) {
            tracing::error!(sandbox = %id, error = %e, "terminating transition not recorded");
        }
        let _ = handle.request_stop(reason.clone());

        if let Some(mut task) = module {
            let grace = Duration::from_millis(self.cfg.termination_grace_ms);
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                task.abort();
                let _ = task.await;
                self.deps.metrics.forced_reclaims.inc(&[]);
                tracing::warn!(sandbox = %id, grace_ms = self.cfg.termination_grace_ms, "module ignored stop; task aborted");
            }
        }

        self.deps.monitor.unregister(id);
        release_module(&self.documents, &handle.document_id);
        handle.set_outcome(reason.clone());
        self.deps.metrics.sandboxes_active.dec(&[]);
        for o in self.observers() {
            o.on_terminated(id, &reason);
        }

        // retire first so waiters never see a terminated instance in the live table
        self.retire(handle);
        if let Err(e) = self.transition(handle, SandboxState::Terminated, "orchestrator", Some(&reason)) {
            tracing::error!(sandbox = %id, error = %e, "terminated transition not recorded");
        }
        tracing::info!(sandbox = %id, reason = reason.as_str(), "sandbox terminated");
    }
}

/// Resolves with the first stop request, including one made before the call.
async fn stop_signal(rx: &mut watch::Receiver<Option<StopReason>>) -> StopReason {
    loop {
        let current = rx.borrow_and_update().clone();
        if let Some(r) = current {
            return r;
        }
        if rx.changed().await.is_err() {
            return StopReason::Requested {
                actor: "orchestrator".to_string(),
            };
        }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

fn release_module(documents: &DashMap<String, u32>, document_id: &str) {
    if let Some(mut n) = documents.get_mut(document_id) {
        *n = n.saturating_sub(1);
    }
    documents.remove_if(document_id, |_, n| *n == 0);
}

/// Reserved module slot for a document; released on drop unless kept.
struct ModuleSlot {
    inner: Arc<OrchestratorInner>,
    document_id: String,
    kept: bool,
}

impl ModuleSlot {
    fn reserve(inner: Arc<OrchestratorInner>, document_id: &str, max: u32) -> Option<Self> {
        {
            let mut n = inner.documents.entry(document_id.to_string()).or_insert(0);
            if max != 0 && *n >= max {
                drop(n);
                inner.documents.remove_if(document_id, |_, n| *n == 0);
                return None;
            }
            *n += 1;
        }
        Some(Self {
            inner,
            document_id: document_id.to_string(),
            kept: false,
        })
    }

    /// Ownership moves to the instance; the supervisor releases it.
    fn keep(&mut self) {
        self.kept = true;
    }
}

impl Drop for ModuleSlot {
    fn drop(&mut self) {
        if !self.kept {
            release_module(&self.inner.documents, &self.document_id);
        }
    }
}
