use miette::Diagnostic;
use thiserror::Error;

/// Errors from talking to the orchestrator (the Kubernetes API server) or
/// its metrics collaborator.
#[derive(Error, Debug, Diagnostic)]
pub enum ClientError {
    /// The named object doesn't exist. Benign in most call sites — see the
    /// reconciler's transition table.
    #[error("{kind} '{name}' not found")]
    #[diagnostic(code(cardpool::client::not_found))]
    NotFound { kind: &'static str, name: String },

    /// Optimistic-concurrency conflict updating a pod. Callers get one
    /// refetch-and-retry; a second conflict is surfaced as-is.
    #[error("conflict updating {kind} '{name}': resource version is stale")]
    #[diagnostic(
        code(cardpool::client::conflict),
        help("refetch the object and retry the update once")
    )]
    Conflict { kind: &'static str, name: String },

    /// An RPC exceeded its budget (10s per the extender's timeout policy).
    #[error("{operation} timed out")]
    #[diagnostic(code(cardpool::client::timeout))]
    Timeout { operation: &'static str },

    /// Any other orchestrator I/O failure (connection refused, 5xx, bad TLS).
    #[error("orchestrator request failed: {message}")]
    #[diagnostic(code(cardpool::client::io))]
    Io { message: String },

    /// Data model error from cardpool-core (malformed demand/annotation).
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] cardpool_core::CoreError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn conflict(kind: &'static str, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            name: name.into(),
        }
    }

    pub fn timeout(operation: &'static str) -> Self {
        Self::Timeout { operation }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}

impl From<kube::Error> for ClientError {
    fn from(e: kube::Error) -> Self {
        match &e {
            kube::Error::Api(resp) if resp.code == 404 => {
                ClientError::not_found("object", resp.message.clone())
            }
            kube::Error::Api(resp) if resp.code == 409 => {
                ClientError::conflict("object", resp.message.clone())
            }
            other => ClientError::io(other.to_string()),
        }
    }
}
