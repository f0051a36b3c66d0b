//! Cardpool Cache - the cluster-wide scheduling cache (C5)
//!
//! Owns every node's allocator, lazily constructed from live orchestrator
//! state, and is the only component that bridges the allocator's pure
//! domain logic to orchestrator I/O.

pub mod cache;
pub mod error;
mod predicates;

pub use cache::{ClusterCache, FilterOutcome, RaterFactory};
pub use error::{CacheError, Result};
