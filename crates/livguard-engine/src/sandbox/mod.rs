//! Sandboxed execution: admission, lifecycle and teardown.

pub mod instance;
pub mod orchestrator;
pub mod runtime;
pub mod verify;

pub use instance::SandboxSummary;
pub use orchestrator::{OrchestratorDeps, SandboxObserver, SandboxOrchestrator};
pub use runtime::{ExecutionLimits, ModuleInstance, ModuleRuntime, SandboxContext};
pub use verify::{content_digest, verify_module};
