//! Cardpool Allocator - per-node GPU placement
//!
//! This crate provides:
//! - The rater scoring strategies (binpack/spread/random/load-aware) (C2)
//! - A node allocator owning one node's card vector and plan cache (C3)
//! - The backtracking placement search (C4)
//! - Load-aware policy configuration parsing

pub mod allocator;
pub mod error;
pub mod policy;
pub mod rater;
pub mod search;

pub use allocator::{NodeAllocator, SCORE_MIN};
pub use error::{AllocatorError, Result};
pub use policy::{Policy, PolicySpec, PriorityEntry, SyncPeriodEntry};
pub use rater::{Binpack, LoadAwareRater, Random, Rater, RaterKind, Spread};
pub use search::{search, Plan};
