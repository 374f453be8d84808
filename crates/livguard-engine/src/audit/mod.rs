//! Append-only security event log.
//!
//! Every policy mutation, evaluation decision, admission rejection, lifecycle
//! transition and violation goes through [`AuditLog::record`]. A record that
//! cannot be persisted fails loudly with `LogUnavailable`, and callers treat
//! their own operation as failed.
//!
//! Appends are serialized under one mutex: `seq` is strictly increasing and
//! timestamps never go backwards, so insertion order is chronological order.

pub mod sink;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use livguard_core::error::{LivGuardError, Result};
use livguard_core::event::{EventQuery, NewEvent, SecurityEvent};

use crate::obs::EngineMetrics;

pub use sink::{AuditSink, FileSink, MemorySink};

struct LogInner {
    events: Vec<SecurityEvent>,
    next_seq: u64,
    last_ts: Option<DateTime<Utc>>,
}

pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
    inner: Mutex<LogInner>,
    metrics: Arc<EngineMetrics>,
}

impl AuditLog {
    /// Open the log, replaying whatever the sink already holds.
    pub fn open(sink: Arc<dyn AuditSink>, metrics: Arc<EngineMetrics>) -> Result<Self> {
        let mut events = sink.load()?;
        events.sort_by_key(|e| e.seq);
        let next_seq = events.last().map(|e| e.seq + 1).unwrap_or(1);
        let last_ts = events.last().map(|e| e.timestamp);
        tracing::info!(sink = sink.name(), replayed = events.len(), "audit log opened");
        Ok(Self {
            sink,
            inner: Mutex::new(LogInner {
                events,
                next_seq,
                last_ts,
            }),
            metrics,
        })
    }

    pub fn in_memory(metrics: Arc<EngineMetrics>) -> Self {
        Self {
            sink: Arc::new(MemorySink),
            inner: Mutex::new(LogInner {
                events: Vec::new(),
                next_seq: 1,
                last_ts: None,
            }),
            metrics,
        }
    }

    /// Append one event. Nothing is kept in memory unless the sink accepted it.
    pub fn record(&self, event: NewEvent) -> Result<SecurityEvent> {
        let action = event.action;
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => {
                self.metrics.audit_failures.inc(&[("action", action.as_str())]);
                return Err(LivGuardError::LogUnavailable("audit log lock poisoned".into()));
            }
        };

        let now = Utc::now();
        let ts = match inner.last_ts {
            Some(last) if last > now => last,
            _ => now,
        };
        let stamped = event.stamp(inner.next_seq, ts);

        if let Err(e) = self.sink.append(&stamped) {
            self.metrics.audit_failures.inc(&[("action", action.as_str())]);
            tracing::error!(action = action.as_str(), sink = self.sink.name(), error = %e, "audit append failed");
            return Err(match e {
                LivGuardError::LogUnavailable(m) => LivGuardError::LogUnavailable(m),
                other => LivGuardError::LogUnavailable(other.to_string()),
            });
        }

        inner.next_seq += 1;
        inner.last_ts = Some(ts);
        inner.events.push(stamped.clone());

        tracing::debug!(
            seq = stamped.seq,
            action = action.as_str(),
            actor = %stamped.actor,
            severity = stamped.severity.as_str(),
            "audit event recorded"
        );
        Ok(stamped)
    }

    /// Matching events in chronological order.
    pub fn query(&self, q: &EventQuery) -> Result<Vec<SecurityEvent>> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| LivGuardError::LogUnavailable("audit log lock poisoned".into()))?;
        let iter = inner.events.iter().filter(|e| q.matches(e)).cloned();
        Ok(match q.limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        })
    }

    pub fn count(&self, q: &EventQuery) -> Result<usize> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| LivGuardError::LogUnavailable("audit log lock poisoned".into()))?;
        Ok(inner.events.iter().filter(|e| q.matches(e)).count())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
