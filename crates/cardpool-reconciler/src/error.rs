use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum ReconcilerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] cardpool_cache::CacheError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Client(#[from] cardpool_client::ClientError),
}

pub type Result<T> = std::result::Result<T, ReconcilerError>;
