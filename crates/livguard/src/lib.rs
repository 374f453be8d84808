//! Top-level facade crate for livguard.
//!
//! Re-exports the policy model and the engine so hosts can depend on a single crate.

pub mod core {
    pub use livguard_core::*;
}

pub mod engine {
    pub use livguard_engine::*;
}

pub use livguard_engine::Engine;
