//! livguard engine library entry.
//!
//! Wires the policy store, resolver, permission evaluator, resource monitor,
//! sandbox orchestrator and audit log into one [`engine::Engine`]. It is
//! consumed by the ops binary (`main.rs`), by hosts embedding the engine and
//! by integration tests.

pub mod admin;
pub mod audit;
pub mod config;
pub mod engine;
pub mod evaluator;
pub mod monitor;
pub mod obs;
pub mod ops;
pub mod quarantine;
pub mod resolver;
pub mod router;
pub mod sandbox;
pub mod store;
pub mod templates;

pub use engine::Engine;
