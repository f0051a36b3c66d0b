use cardpool_cache::ClusterCache;
use std::sync::Arc;

/// Shared application state: the cluster cache every handler calls into,
/// plus a version string reported by `GET /version`.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ClusterCache>,
    pub version: Arc<str>,
}

impl AppState {
    pub fn new(cache: Arc<ClusterCache>) -> Self {
        Self::with_version(cache, env!("CARGO_PKG_VERSION"))
    }

    pub fn with_version(cache: Arc<ClusterCache>, version: impl Into<Arc<str>>) -> Self {
        Self {
            cache,
            version: version.into(),
        }
    }
}
