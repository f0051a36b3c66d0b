//! Cardpool Reconciler - lifecycle reconciler (C6)
//!
//! Consumes the orchestrator's pod-event stream and drives each GPU-bearing
//! pod through the cluster cache via a rate-limited, at-most-one-worker-per-key
//! work queue.

pub mod error;
pub mod queue;
pub mod reconciler;

pub use error::{ReconcilerError, Result};
pub use queue::{PodKey, WorkQueue};
pub use reconciler::Reconciler;
