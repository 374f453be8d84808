//! livguard core: policy data model, admission inputs, monitoring and audit
//! records, and the error surface shared by the engine and its hosts.
//!
//! This crate carries no runtime or I/O dependencies so the model can be
//! embedded by viewers, admin tooling and the engine alike.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. All fallible paths
//! surface as `LivGuardError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod decision;
pub mod error;
pub mod event;
pub mod policy;
pub mod request;
pub mod sample;
pub mod sandbox;

pub use decision::Decision;
/// Shared result type.
pub use error::{ErrorClass, LivGuardError, ReasonCode, Result};
pub use event::{EventAction, EventQuery, EventSeverity, NewEvent, Outcome, SecurityEvent};
pub use policy::{EffectivePolicy, Policy};
pub use request::{LoadRequest, ModuleBundle, ModuleDescriptor, ModuleVerification, PermissionRequest};
pub use sample::{LimitKind, MonitorReport, ResourceSample, Violation, ViolationSeverity};
pub use sandbox::{SandboxId, SandboxState, StopReason};
