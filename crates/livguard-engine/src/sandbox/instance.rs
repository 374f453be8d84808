use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use livguard_core::error::{LivGuardError, Result};
use livguard_core::policy::EffectivePolicy;
use livguard_core::sample::ResourceSample;
use livguard_core::sandbox::{SandboxId, SandboxState, StopReason};

use super::runtime::SandboxContext;

/// Read-only view of one instance.
#[derive(Debug, Clone, Serialize)]
pub struct SandboxSummary {
    pub id: SandboxId,
    pub document_id: String,
    pub module: String,
    pub policy_id: String,
    pub state: SandboxState,
    pub started_at: DateTime<Utc>,
    pub stop_reason: Option<StopReason>,
    pub latest: Option<ResourceSample>,
}

/// Orchestrator-owned record of one isolated execution.
pub struct SandboxHandle {
    pub id: SandboxId,
    pub document_id: String,
    pub module: String,
    /// Frozen at admission; later policy edits do not reach a live instance.
    pub policy: Arc<EffectivePolicy>,
    pub started_at: DateTime<Utc>,
    state: watch::Sender<SandboxState>,
    stop: watch::Sender<Option<StopReason>>,
    samples: mpsc::Sender<ResourceSample>,
    outcome: Mutex<Option<StopReason>>,
}

impl SandboxHandle {
    pub(crate) fn new(
        document_id: String,
        module: String,
        policy: Arc<EffectivePolicy>,
        samples: mpsc::Sender<ResourceSample>,
    ) -> Self {
        let (state, _) = watch::channel(SandboxState::Created);
        let (stop, _) = watch::channel(None);
        Self {
            id: SandboxId::new(),
            document_id,
            module,
            policy,
            started_at: Utc::now(),
            state,
            stop,
            samples,
            outcome: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SandboxState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SandboxState> {
        self.state.subscribe()
    }

    pub(crate) fn subscribe_stop(&self) -> watch::Receiver<Option<StopReason>> {
        self.stop.subscribe()
    }

    /// Atomically move to `next` if the state machine allows it.
    /// Returns the previous state.
    pub(crate) fn transition(&self, next: SandboxState) -> Result<SandboxState> {
        let mut outcome = Err(LivGuardError::Internal("transition not applied".into()));
        self.state.send_if_modified(|cur| match cur.check_transition(next) {
            Ok(()) => {
                outcome = Ok(*cur);
                *cur = next;
                true
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }

    /// First stop request wins; later ones are ignored.
    pub(crate) fn request_stop(&self, reason: StopReason) -> Result<()> {
        let state = self.state();
        if state.is_final() {
            return Err(LivGuardError::InvalidState {
                from: state.as_str().to_string(),
                to: SandboxState::Terminating.as_str().to_string(),
            });
        }
        self.stop.send_if_modified(|cur| {
            if cur.is_none() {
                *cur = Some(reason);
                true
            } else {
                false
            }
        });
        Ok(())
    }

    pub(crate) fn stop_requested(&self) -> Option<StopReason> {
        self.stop.borrow().clone()
    }

    pub(crate) fn context(&self) -> SandboxContext {
        SandboxContext::new(
            self.id,
            self.samples.clone(),
            self.state.subscribe(),
            self.stop.subscribe(),
        )
    }

    pub(crate) fn sample_sender(&self) -> mpsc::Sender<ResourceSample> {
        self.samples.clone()
    }

    pub(crate) fn set_outcome(&self, reason: StopReason) {
        if let Ok(mut g) = self.outcome.lock() {
            *g = Some(reason);
        }
    }

    /// Why the instance ended, once terminated.
    pub fn outcome(&self) -> Option<StopReason> {
        self.outcome.lock().ok().and_then(|g| g.clone())
    }

    pub fn summary(&self, latest: Option<ResourceSample>) -> SandboxSummary {
        SandboxSummary {
            id: self.id,
            document_id: self.document_id.clone(),
            module: self.module.clone(),
            policy_id: self.policy.policy_id.clone(),
            state: self.state(),
            started_at: self.started_at,
            stop_reason: self.outcome(),
            latest,
        }
    }
}
