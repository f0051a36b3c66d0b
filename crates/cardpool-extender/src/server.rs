use crate::handlers;
use crate::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Extender server configuration. `PORT` defaults to `39999` per the
/// source's environment-variable contract.
#[derive(Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:39999".parse().unwrap(),
        }
    }
}

impl Config {
    /// Build a `Config` from the `PORT` environment variable, falling back
    /// to the default port when unset or unparseable.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(39999);
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
        }
    }
}

/// The scheduler-extender HTTP server.
pub struct ExtenderServer {
    config: Config,
    state: AppState,
}

impl ExtenderServer {
    pub fn new(config: Config, state: AppState) -> Self {
        Self { config, state }
    }

    fn build_router(&self) -> Router {
        Router::new()
            .route("/scheduler/filter", post(handlers::filter))
            .route("/scheduler/priorities", post(handlers::priorities))
            .route("/scheduler/bind", post(handlers::bind))
            .route("/version", get(handlers::version))
            .route("/status", get(handlers::status))
            .route("/metrics", get(handlers::metrics))
            .route("/healthz", get(handlers::healthz))
            .route("/livez", get(handlers::livez))
            .route("/readyz", get(handlers::readyz))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve until `token` is cancelled, draining in-flight handlers before
    /// returning.
    pub async fn run(self, token: tokio_util::sync::CancellationToken) -> std::io::Result<()> {
        let app = self.build_router();
        info!("starting scheduler extender on {}", self.config.listen_addr);

        let listener = TcpListener::bind(self.config.listen_addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardpool_allocator::RaterKind;
    use cardpool_cache::ClusterCache;
    use cardpool_client::MockClient;
    use std::sync::Arc;

    #[test]
    fn default_config_uses_the_documented_port() {
        let config = Config::default();
        assert_eq!(config.listen_addr.port(), 39999);
    }

    #[tokio::test]
    async fn router_builds_and_answers_healthz() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let client = Arc::new(MockClient::new());
        let cache = Arc::new(ClusterCache::new(client, RaterKind::Binpack));
        let state = AppState::new(cache);
        let server = ExtenderServer::new(Config::default(), state);
        let router = server.build_router();

        let response = router
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
