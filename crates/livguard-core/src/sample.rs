//! Resource samples and the violations derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::EffectivePolicy;
use crate::sandbox::SandboxId;

/// Point-in-time usage reading for one sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    pub memory_bytes: u64,
    pub cpu_time_ms: u64,
    pub concurrent_documents: u64,
    /// Bytes per second.
    pub network_bandwidth: u64,
    pub storage_bytes: u64,
}

impl ResourceSample {
    /// An all-zero sample taken now.
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            memory_bytes: 0,
            cpu_time_ms: 0,
            concurrent_documents: 0,
            network_bandwidth: 0,
            storage_bytes: 0,
        }
    }

    pub fn with_memory(mut self, bytes: u64) -> Self {
        self.memory_bytes = bytes;
        self
    }

    pub fn with_cpu_time(mut self, ms: u64) -> Self {
        self.cpu_time_ms = ms;
        self
    }

    pub fn with_concurrent_documents(mut self, n: u64) -> Self {
        self.concurrent_documents = n;
        self
    }

    pub fn with_network_bandwidth(mut self, bps: u64) -> Self {
        self.network_bandwidth = bps;
        self
    }

    pub fn with_storage(mut self, bytes: u64) -> Self {
        self.storage_bytes = bytes;
        self
    }

    pub fn value(&self, kind: LimitKind) -> u64 {
        match kind {
            LimitKind::Memory => self.memory_bytes,
            LimitKind::CpuTime => self.cpu_time_ms,
            LimitKind::ConcurrentDocuments => self.concurrent_documents,
            LimitKind::NetworkBandwidth => self.network_bandwidth,
            LimitKind::Storage => self.storage_bytes,
        }
    }
}

/// Sampled dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    Memory,
    CpuTime,
    ConcurrentDocuments,
    NetworkBandwidth,
    Storage,
}

impl LimitKind {
    pub const ALL: [LimitKind; 5] = [
        LimitKind::Memory,
        LimitKind::CpuTime,
        LimitKind::ConcurrentDocuments,
        LimitKind::NetworkBandwidth,
        LimitKind::Storage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LimitKind::Memory => "memory",
            LimitKind::CpuTime => "cpu_time",
            LimitKind::ConcurrentDocuments => "concurrent_documents",
            LimitKind::NetworkBandwidth => "network_bandwidth",
            LimitKind::Storage => "storage",
        }
    }

    /// Ceiling for this dimension; 0 = no ceiling.
    pub fn ceiling(self, policy: &EffectivePolicy) -> u64 {
        match self {
            LimitKind::Memory => policy.memory_ceiling(),
            LimitKind::CpuTime => policy.cpu_ceiling_ms(),
            LimitKind::ConcurrentDocuments => policy.limits.max_concurrent_documents,
            LimitKind::NetworkBandwidth => policy.limits.max_network_bandwidth,
            LimitKind::Storage => policy.limits.max_storage_usage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Warning,
    Critical,
}

/// A recorded breach of an effective limit. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub policy_id: String,
    pub sandbox_id: SandboxId,
    pub limit: LimitKind,
    pub observed: u64,
    pub limit_value: u64,
    pub timestamp: DateTime<Utc>,
    pub severity: ViolationSeverity,
    /// Consecutive breaching samples for this dimension, this one included.
    pub consecutive: u32,
}

impl Violation {
    /// Machine-readable code, e.g. `memory_exceeded`.
    pub fn code(&self) -> String {
        format!("{}_exceeded", self.limit.as_str())
    }

    pub fn explanation(&self) -> String {
        format!(
            "{} usage {} exceeds limit {} ({} consecutive sample(s))",
            self.limit.as_str(),
            self.observed,
            self.limit_value,
            self.consecutive
        )
    }
}

/// Result of classifying one sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorReport {
    pub sandbox_id: SandboxId,
    pub timestamp: DateTime<Utc>,
    pub violations: Vec<Violation>,
}

impl MonitorReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has_critical(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.severity == ViolationSeverity::Critical)
    }

    pub fn worst(&self) -> Option<&Violation> {
        self.violations.iter().max_by_key(|v| v.severity)
    }
}
