//! Cardpool Core - fundamental GPU-sharing data model
//!
//! This crate provides:
//! - The per-card resource vector and its allocation primitives (C1)
//! - Container GPU demand parsing from pod resource requests
//! - The pod annotation/label contract used to persist allocator state
//! - Error types with miette diagnostics

pub mod card;
pub mod demand;
pub mod error;
pub mod fingerprint;
pub mod metadata;
pub mod quantities;

pub use card::Card;
pub use demand::Demand;
pub use error::{CoreError, Result};
pub use fingerprint::fingerprint;

/// Resource name prefix under which GPU core/memory are advertised to the
/// orchestrator, e.g. `cardpool.io/gpu-core`.
pub const RESOURCE_DOMAIN: &str = "cardpool.io";

/// Full GPU core resource name.
pub fn gpu_core_resource_name() -> String {
    format!("{RESOURCE_DOMAIN}/gpu-core")
}

/// Full GPU memory resource name.
pub fn gpu_memory_resource_name() -> String {
    format!("{RESOURCE_DOMAIN}/gpu-memory")
}

// Re-export k8s-openapi types for convenience.
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Node, Pod};
