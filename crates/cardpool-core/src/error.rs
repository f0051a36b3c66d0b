// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for the GPU data model
#[derive(Error, Debug, Diagnostic)]
pub enum CoreError {
    /// A pod annotation carrying an assignment was present but not parseable
    #[error("Malformed assignment annotation {key}={value}")]
    #[diagnostic(
        code(cardpool::malformed_metadata),
        help("Assignment annotations must be a comma-separated list of card indices, e.g. \"0,1\"")
    )]
    MalformedMetadata { key: String, value: String },

    /// A resource quantity string could not be parsed
    #[error("Invalid resource quantity for {resource}: {value}")]
    #[diagnostic(
        code(cardpool::invalid_quantity),
        help("GPU core must be an integer 0..=n*100, GPU memory must be a k8s quantity like \"8Gi\"")
    )]
    InvalidQuantity { resource: String, value: String },

    /// Programmer invariant violation: revert without a matching apply, index
    /// out of range, etc. Never expected in correct operation.
    #[error("Invariant violation: {message}")]
    #[diagnostic(
        code(cardpool::invariant_violation),
        help("This is likely a bug. Please report it with the full error details")
    )]
    InvariantViolation { message: String },
}

/// Result type alias for cardpool-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn malformed_metadata(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::MalformedMetadata {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn invalid_quantity(resource: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidQuantity {
            resource: resource.into(),
            value: value.into(),
        }
    }

    pub fn invariant_violation(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }
}
