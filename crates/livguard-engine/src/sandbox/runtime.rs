//! Seam between the orchestrator and whatever actually executes modules.
//!
//! The engine never interprets module bytes. A [`ModuleRuntime`] turns an
//! admitted bundle into a [`ModuleInstance`], and the instance runs as its own
//! task with a [`SandboxContext`] for reporting usage and observing
//! suspend/stop requests.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use livguard_core::error::{LivGuardError, Result};
use livguard_core::policy::EffectivePolicy;
use livguard_core::request::{ModuleBundle, PermissionRequest};
use livguard_core::sample::ResourceSample;
use livguard_core::sandbox::{SandboxId, SandboxState, StopReason};

/// Envelope the runtime must enforce for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub memory_limit: u64,
    pub cpu_time_limit_ms: u64,
    pub networking: bool,
    pub file_system: bool,
    pub imports: BTreeSet<String>,
    /// `None` = no wall-clock budget.
    pub timeout: Option<Duration>,
}

impl ExecutionLimits {
    /// Grant what was requested; admission already checked it fits `eff`.
    pub fn granted(req: &PermissionRequest, eff: &EffectivePolicy) -> Self {
        let timeout = match eff.limits.document_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            memory_limit: req.memory_limit,
            cpu_time_limit_ms: req.cpu_time_limit_ms,
            networking: req.networking,
            file_system: req.file_system,
            imports: req.imports.clone(),
            timeout,
        }
    }
}

#[async_trait]
pub trait ModuleRuntime: Send + Sync + 'static {
    /// Build the isolated context. An error here terminates the sandbox
    /// with `init_failed`.
    async fn instantiate(
        &self,
        module: &ModuleBundle,
        limits: &ExecutionLimits,
    ) -> Result<Box<dyn ModuleInstance>>;
}

#[async_trait]
pub trait ModuleInstance: Send + 'static {
    /// Run to completion. Should return soon after `ctx` reports a stop; a
    /// module that does not is aborted after the grace period.
    async fn run(self: Box<Self>, ctx: SandboxContext) -> Result<()>;
}

/// Handed to a running module.
pub struct SandboxContext {
    id: SandboxId,
    samples: mpsc::Sender<ResourceSample>,
    state: watch::Receiver<SandboxState>,
    stop: watch::Receiver<Option<StopReason>>,
}

impl SandboxContext {
    pub(crate) fn new(
        id: SandboxId,
        samples: mpsc::Sender<ResourceSample>,
        state: watch::Receiver<SandboxState>,
        stop: watch::Receiver<Option<StopReason>>,
    ) -> Self {
        Self {
            id,
            samples,
            state,
            stop,
        }
    }

    pub fn id(&self) -> SandboxId {
        self.id
    }

    pub fn state(&self) -> SandboxState {
        *self.state.borrow()
    }

    /// Push a usage reading to the monitor. Back-pressures when the
    /// supervisor is behind.
    pub async fn report(&self, sample: ResourceSample) -> Result<()> {
        self.samples
            .send(sample)
            .await
            .map_err(|_| LivGuardError::Internal(format!("sandbox {} supervisor gone", self.id)))
    }

    pub fn should_stop(&self) -> bool {
        self.stop.borrow().is_some()
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&mut self) {
        while self.stop.borrow_and_update().is_none() {
            if self.stop.changed().await.is_err() {
                return;
            }
        }
    }

    /// Cooperative yield point: waits while suspended. Returns `false` when
    /// the module should wind down.
    pub async fn checkpoint(&mut self) -> bool {
        loop {
            if self.should_stop() {
                return false;
            }
            if *self.state.borrow_and_update() != SandboxState::Suspended {
                return true;
            }
            tokio::select! {
                r = self.state.changed() => if r.is_err() { return false },
                r = self.stop.changed() => if r.is_err() { return false },
            }
        }
    }
}
