// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Allocator error type
#[derive(Error, Debug, Diagnostic)]
pub enum AllocatorError {
    /// No placement exists for this pod's demand on this node
    #[error("No feasible placement for pod {pod_uid} on node {node}: {reason}")]
    #[diagnostic(
        code(allocator::infeasible),
        help("The node does not have enough free card capacity for this pod's GPU demand")
    )]
    Infeasible {
        pod_uid: String,
        node: String,
        reason: String,
    },

    /// `commit`/`forget`/`add` referenced a pod the allocator doesn't know
    /// about, or referenced it twice.
    #[error("Unknown pod {pod_uid} on node {node}")]
    #[diagnostic(
        code(allocator::unknown_pod),
        help("The pod was never assumed/added on this node, or was already forgotten")
    )]
    UnknownPod { pod_uid: String, node: String },

    /// `commit` was called without a prior `assume` for the same demand
    /// shape (plan cache miss after it should have been populated).
    #[error("No cached plan for pod {pod_uid} on node {node}; call assume() first")]
    #[diagnostic(
        code(allocator::no_cached_plan),
        help("commit() requires a prior assume() for the same demand fingerprint")
    )]
    NoCachedPlan { pod_uid: String, node: String },

    /// Policy YAML failed to parse
    #[error("Invalid policy configuration: {message}")]
    #[diagnostic(
        code(allocator::invalid_policy),
        help("Check the syncPeriod/priority entries against the documented schema")
    )]
    InvalidPolicy { message: String },

    /// A contract the caller is responsible for upholding was violated —
    /// e.g. a pod with no UID, or a plan whose assignment doesn't match the
    /// demand vector it was built for. Distinct from the card-level `assert`
    /// panics in cardpool-core, which guard *internal* bookkeeping rather
    /// than caller input.
    #[error("Invariant violation: {message}")]
    #[diagnostic(code(allocator::invariant_violation))]
    InvariantViolation { message: String },

    /// Data model error from cardpool-core
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] cardpool_core::CoreError),
}

/// Result type alias for allocator operations
pub type Result<T> = std::result::Result<T, AllocatorError>;

impl AllocatorError {
    pub fn infeasible(
        pod_uid: impl Into<String>,
        node: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Infeasible {
            pod_uid: pod_uid.into(),
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_pod(pod_uid: impl Into<String>, node: impl Into<String>) -> Self {
        Self::UnknownPod {
            pod_uid: pod_uid.into(),
            node: node.into(),
        }
    }

    pub fn no_cached_plan(pod_uid: impl Into<String>, node: impl Into<String>) -> Self {
        Self::NoCachedPlan {
            pod_uid: pod_uid.into(),
            node: node.into(),
        }
    }

    pub fn invalid_policy(message: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            message: message.into(),
        }
    }

    pub fn invariant_violation(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }
}
