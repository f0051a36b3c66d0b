//! Cardpool Extender - the scheduler-extender HTTP surface (C7)
//!
//! This crate provides:
//! - The three scheduler-extender endpoints (filter/priorities/bind)
//! - Version/status/metrics endpoints
//! - Axum router wiring and server lifecycle

pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

pub use error::{ApiError, Result};
pub use server::{Config, ExtenderServer};
pub use state::AppState;
