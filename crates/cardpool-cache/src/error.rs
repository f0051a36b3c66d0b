use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum CacheError {
    /// The requested node isn't known and couldn't be lazily loaded.
    #[error("node {name} unavailable: {reason}")]
    #[diagnostic(code(cardpool::cache::node_unavailable))]
    NodeUnavailable { name: String, reason: String },

    /// The pod fetched for `bind` doesn't match the UID the caller expected,
    /// even after one refetch — the named pod was deleted and recreated.
    #[error("pod {namespace}/{name} uid mismatch: expected {expected}, found {actual}")]
    #[diagnostic(code(cardpool::cache::pod_uid_mismatch))]
    PodUidMismatch {
        namespace: String,
        name: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Client(#[from] cardpool_client::ClientError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Allocator(#[from] cardpool_allocator::AllocatorError),
}

pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    pub fn node_unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NodeUnavailable {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn pod_uid_mismatch(
        namespace: impl Into<String>,
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::PodUidMismatch {
            namespace: namespace.into(),
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
