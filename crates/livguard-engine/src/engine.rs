//! Engine wiring.
//!
//! Builds every component from one [`EngineConfig`] and exposes the
//! operations a host needs. `Engine` is cheap to clone; all clones share the
//! same store, log and sandboxes.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use livguard_core::decision::Decision;
use livguard_core::error::Result;
use livguard_core::event::{EventQuery, EventSeverity, SecurityEvent};
use livguard_core::policy::{EffectivePolicy, Policy};
use livguard_core::request::{LoadRequest, PermissionRequest};
use livguard_core::sample::ResourceSample;
use livguard_core::sandbox::{SandboxId, SandboxState, StopReason};

use crate::admin::{self, EventStatistics, SecurityMetrics, SystemReport};
use crate::audit::{AuditLog, AuditSink, FileSink, MemorySink};
use crate::config::{AuditSinkKind, EngineConfig};
use crate::evaluator::{EvalContext, PermissionEvaluator};
use crate::monitor::ResourceMonitor;
use crate::obs::EngineMetrics;
use crate::quarantine::{QuarantineRecord, QuarantineRelease, QuarantineRegistry};
use crate::resolver::PolicyResolver;
use crate::sandbox::{
    ModuleRuntime, OrchestratorDeps, SandboxObserver, SandboxOrchestrator, SandboxSummary,
};
use crate::store::PolicyStore;
use crate::templates::{TemplateRegistry, TemplateValue};

const SEED_ACTOR: &str = "config";

#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    cfg: EngineConfig,
    metrics: Arc<EngineMetrics>,
    audit: Arc<AuditLog>,
    store: Arc<PolicyStore>,
    resolver: Arc<PolicyResolver>,
    evaluator: Arc<PermissionEvaluator>,
    monitor: Arc<ResourceMonitor>,
    quarantine: Arc<QuarantineRegistry>,
    templates: TemplateRegistry,
    sandboxes: SandboxOrchestrator,
}

impl Engine {
    /// Build the engine with the audit sink named in `cfg.audit`.
    pub fn new(cfg: EngineConfig, runtime: Arc<dyn ModuleRuntime>) -> Result<Self> {
        let sink: Arc<dyn AuditSink> = match (cfg.audit.sink, cfg.audit.path.as_deref()) {
            (AuditSinkKind::File, Some(path)) => Arc::new(FileSink::open(path)?),
            _ => Arc::new(MemorySink),
        };
        Self::with_sink(cfg, sink, runtime)
    }

    /// Build the engine on an explicit audit sink.
    pub fn with_sink(
        cfg: EngineConfig,
        sink: Arc<dyn AuditSink>,
        runtime: Arc<dyn ModuleRuntime>,
    ) -> Result<Self> {
        cfg.validate()?;

        let metrics = Arc::new(EngineMetrics::default());
        let audit = Arc::new(AuditLog::open(sink, Arc::clone(&metrics))?);

        let mut store = PolicyStore::new(
            cfg.engine.max_policy_depth,
            cfg.engine.default_policy_id.clone(),
            Arc::clone(&audit),
            Arc::clone(&metrics),
        );
        if let Some(path) = &cfg.engine.state_path {
            store = store.with_snapshot(path);
        }
        let store = Arc::new(store);
        store.restore()?;
        seed(&store, &cfg)?;

        let resolver = Arc::new(PolicyResolver::new(Arc::clone(&store), Arc::clone(&metrics)));
        let evaluator = Arc::new(PermissionEvaluator::new(
            Arc::clone(&audit),
            Arc::clone(&metrics),
        ));
        let monitor = Arc::new(ResourceMonitor::new(
            cfg.monitor.clone(),
            Arc::clone(&audit),
            Arc::clone(&metrics),
        ));
        let quarantine = Arc::new(QuarantineRegistry::new(Arc::clone(&audit)));

        let sandboxes = SandboxOrchestrator::new(
            OrchestratorDeps {
                resolver: Arc::clone(&resolver),
                evaluator: Arc::clone(&evaluator),
                monitor: Arc::clone(&monitor),
                quarantine: Arc::clone(&quarantine),
                audit: Arc::clone(&audit),
                metrics: Arc::clone(&metrics),
                runtime,
            },
            cfg.sandbox.clone(),
        );

        tracing::info!(
            policies = store.len(),
            audit_events = audit.len(),
            "livguard engine ready"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                cfg,
                metrics,
                audit,
                store,
                resolver,
                evaluator,
                monitor,
                quarantine,
                templates: TemplateRegistry::builtin(),
                sandboxes,
            }),
        })
    }

    pub fn cfg(&self) -> &EngineConfig {
        &self.inner.cfg
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn audit(&self) -> Arc<AuditLog> {
        Arc::clone(&self.inner.audit)
    }

    pub fn store(&self) -> Arc<PolicyStore> {
        Arc::clone(&self.inner.store)
    }

    pub fn monitor(&self) -> Arc<ResourceMonitor> {
        Arc::clone(&self.inner.monitor)
    }

    pub fn sandboxes(&self) -> &SandboxOrchestrator {
        &self.inner.sandboxes
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.inner.templates
    }

    // --- policies ---

    pub fn create_policy(&self, policy: Policy, actor: &str) -> Result<Arc<Policy>> {
        self.inner.store.create(policy, actor)
    }

    pub fn get_policy(&self, id: &str) -> Result<Arc<Policy>> {
        self.inner.store.get(id)
    }

    pub fn list_policies(&self) -> Vec<Arc<Policy>> {
        self.inner.store.list()
    }

    pub fn update_policy<F>(
        &self,
        id: &str,
        expected_version: u64,
        mutator: F,
        actor: &str,
    ) -> Result<Arc<Policy>>
    where
        F: FnOnce(&mut Policy),
    {
        self.inner.store.update(id, expected_version, mutator, actor)
    }

    pub fn delete_policy(&self, id: &str, actor: &str) -> Result<()> {
        self.inner.store.delete(id, actor)
    }

    pub fn policy_history(&self, id: &str) -> Result<Vec<Arc<Policy>>> {
        self.inner.store.history(id)
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<EffectivePolicy>> {
        self.inner.resolver.resolve(id)
    }

    /// Instantiate a template and store the result as `policy_id`.
    pub fn create_from_template(
        &self,
        template_id: &str,
        policy_id: &str,
        variables: &BTreeMap<String, TemplateValue>,
        actor: &str,
    ) -> Result<Arc<Policy>> {
        let policy = self
            .inner
            .templates
            .get(template_id)?
            .instantiate(policy_id, variables)?;
        self.inner.store.create(policy, actor)
    }

    // --- admission / sandboxes ---

    /// Standalone permission check against a stored policy.
    pub fn evaluate(
        &self,
        policy_id: &str,
        req: &PermissionRequest,
        actor: &str,
        document_id: Option<&str>,
    ) -> Result<Decision> {
        let eff = self.inner.resolver.resolve(policy_id)?;
        self.inner
            .evaluator
            .evaluate(EvalContext { actor, document_id }, req, &eff)
    }

    pub fn launch(&self, req: LoadRequest) -> Result<SandboxId> {
        self.inner.sandboxes.launch(req)
    }

    pub fn report_sample(&self, id: SandboxId, sample: ResourceSample) -> Result<()> {
        self.inner.sandboxes.report_sample(id, sample)
    }

    pub fn stop(&self, id: SandboxId, actor: &str) -> Result<()> {
        self.inner.sandboxes.stop(id, actor)
    }

    pub fn suspend(&self, id: SandboxId, actor: &str) -> Result<()> {
        self.inner.sandboxes.suspend(id, actor)
    }

    pub fn resume(&self, id: SandboxId, actor: &str) -> Result<()> {
        self.inner.sandboxes.resume(id, actor)
    }

    pub fn sandbox_state(&self, id: SandboxId) -> Result<SandboxState> {
        self.inner.sandboxes.state(id)
    }

    pub fn sandbox(&self, id: SandboxId) -> Result<SandboxSummary> {
        self.inner.sandboxes.get(id)
    }

    pub fn list_sandboxes(&self) -> Vec<SandboxSummary> {
        self.inner.sandboxes.list()
    }

    pub async fn wait_terminated(&self, id: SandboxId) -> Result<StopReason> {
        self.inner.sandboxes.wait_terminated(id).await
    }

    pub fn add_observer(&self, observer: Arc<dyn SandboxObserver>) {
        self.inner.sandboxes.add_observer(observer);
    }

    // --- quarantine ---

    /// Quarantine under the document's governing policy.
    pub fn quarantine_document(
        &self,
        document_id: &str,
        policy_id: &str,
        reason: &str,
        actor: &str,
    ) -> Result<QuarantineRecord> {
        let eff = self.inner.resolver.resolve(policy_id)?;
        self.inner
            .quarantine
            .quarantine(document_id, &eff, reason, actor)
    }

    pub fn release_document(
        &self,
        document_id: &str,
        reviewer: &str,
        notes: &str,
    ) -> Result<QuarantineRelease> {
        self.inner.quarantine.release(document_id, reviewer, notes)
    }

    pub fn quarantined(&self) -> Vec<QuarantineRecord> {
        self.inner.quarantine.list()
    }

    // --- administration ---

    pub fn validate_system(&self) -> SystemReport {
        admin::validate_system(&self.inner.store)
    }

    pub fn security_metrics(&self) -> Result<SecurityMetrics> {
        admin::security_metrics(&self.inner.store, &self.inner.audit)
    }

    pub fn event_statistics(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<EventStatistics> {
        admin::event_statistics(&self.inner.audit, since, until)
    }

    pub fn query_events(&self, q: &EventQuery) -> Result<Vec<SecurityEvent>> {
        self.inner.audit.query(q)
    }

    // --- lifecycle / ops ---

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    /// Mark draining, then stop every live sandbox.
    pub async fn shutdown(&self, actor: &str) {
        self.inner.metrics.set_draining();
        self.inner.sandboxes.shutdown(actor).await;
    }

    /// Point-in-time values appended to `/metrics`.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        let alerts = admin::recent_alerts(&self.inner.audit, EventSeverity::High).unwrap_or(0);
        vec![
            ("livguard_policies", self.inner.store.len() as u64),
            ("livguard_policy_generation", self.inner.store.generation()),
            ("livguard_sandboxes_live", self.inner.sandboxes.live_count() as u64),
            ("livguard_documents_quarantined", self.inner.quarantine.list().len() as u64),
            ("livguard_audit_events", self.inner.audit.len() as u64),
            ("livguard_alerts_24h", alerts as u64),
        ]
    }
}

/// Baseline default policy first, then configured seeds. Ids restored from a
/// snapshot are left alone.
fn seed(store: &PolicyStore, cfg: &EngineConfig) -> Result<()> {
    if let Some(id) = &cfg.engine.default_policy_id {
        let configured = cfg.policies.iter().any(|p| &p.id == id);
        if !configured && !store.contains(id) {
            store.create(Policy::new(id.clone(), "Default Security Policy"), SEED_ACTOR)?;
        }
    }
    for p in &cfg.policies {
        if store.contains(&p.id) {
            tracing::debug!(policy = %p.id, "seed skipped, already stored");
            continue;
        }
        store.create(p.clone(), SEED_ACTOR)?;
    }
    Ok(())
}
