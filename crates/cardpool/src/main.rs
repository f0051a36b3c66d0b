use cardpool_allocator::{Policy, RaterKind};
use cardpool_cache::ClusterCache;
use cardpool_client::{KubeClient, OrchestratorClient};
use cardpool_extender::{Config as ExtenderConfig, ExtenderServer};
use cardpool_reconciler::Reconciler;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "cardpool", about = "Cardpool GPU-sharing scheduler extender")]
struct Cli {
    /// Placement rater strategy.
    #[arg(long = "priority", default_value = "binpack")]
    priority: RaterKind,

    /// Path to a kubeconfig file. Empty uses in-cluster config, falling
    /// back to `KUBECONFIG`/`~/.kube/config`.
    #[arg(long = "kubeconf")]
    kubeconf: Option<String>,

    /// Comma-separated list of resource modes (reserved for future use;
    /// accepted and logged so deployments can pass it ahead of support).
    #[arg(long = "mode")]
    mode: Option<String>,

    /// Path to the load-aware policy YAML (only read when `--isLoadSchedule`
    /// is set).
    #[arg(long = "policyConfigPath")]
    policy_config_path: Option<String>,

    /// How often the reconciler's informer resyncs, e.g. "30s".
    #[arg(long = "sync-period", default_value = "30s")]
    sync_period: String,

    /// Wrap the chosen rater in the load-aware decorator and load
    /// `--policyConfigPath`.
    #[arg(long = "isLoadSchedule", default_value_t = false)]
    is_load_schedule: bool,

    /// Number of reconciler worker goroutines (informer workers).
    #[arg(long = "threadness")]
    threadness: Option<usize>,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> miette::Result<()> {
    if let Some(path) = &cli.kubeconf {
        std::env::set_var("KUBECONFIG", path);
    }

    if let Some(mode) = &cli.mode {
        info!("resource modes requested: {mode} (not yet load-bearing)");
    }

    // `--sync-period` governs a periodic full relist in client-go-style
    // informers; kube's `watcher()` already relists on every stream restart,
    // so this build accepts and validates the flag without a separate timer.
    let sync_period: Duration = parse_sync_period(&cli.sync_period)
        .map_err(|e| miette::miette!("invalid --sync-period '{}': {}", cli.sync_period, e))?;
    info!("informer resync period: {sync_period:?} (informational; kube watcher relists on restart)");

    let rater_kind = cli.priority;
    let policy = if cli.is_load_schedule {
        let path = cli.policy_config_path.as_deref().ok_or_else(|| {
            miette::miette!("--isLoadSchedule requires --policyConfigPath")
        })?;
        let policy = Policy::from_file(path)
            .map_err(|e| miette::miette!("loading policy from '{}': {}", path, e))?;
        info!(
            "load-aware scheduling enabled with {} priority weight(s) from {}",
            policy.weights().len(),
            path
        );
        Some(policy)
    } else {
        None
    };

    let client: Arc<dyn OrchestratorClient> = Arc::new(
        KubeClient::try_default()
            .await
            .map_err(|e| miette::miette!("building kube client: {}", e))?,
    );

    let cache = Arc::new(match policy {
        Some(policy) => {
            let weights = policy.weights();
            let window = policy
                .spec
                .sync_period
                .iter()
                .filter_map(|entry| entry.duration().ok())
                .max()
                .unwrap_or(Duration::from_secs(15));
            let rater_factory: cardpool_cache::RaterFactory = Arc::new(move || {
                Box::new(cardpool_allocator::LoadAwareRater::new(
                    rater_kind.build(),
                    weights.clone(),
                    window,
                )) as Box<dyn cardpool_allocator::Rater>
            });
            ClusterCache::with_rater_factory(Arc::clone(&client), rater_factory)
        }
        None => ClusterCache::new(Arc::clone(&client), rater_kind),
    });

    let threadness = cli.threadness.unwrap_or_else(|| {
        std::env::var("THREADNESS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    });

    let reconciler = Reconciler::with_config(
        Arc::clone(&client),
        Arc::clone(&cache),
        threadness,
        5,
        Duration::from_millis(500),
    );

    let extender_state = cardpool_extender::AppState::new(Arc::clone(&cache));
    let extender = ExtenderServer::new(ExtenderConfig::from_env(), extender_state);

    let token = CancellationToken::new();

    let reconciler_token = token.clone();
    let reconciler_handle = tokio::spawn(async move {
        if let Err(e) = reconciler.run(reconciler_token).await {
            error!("reconciler error: {e}");
        }
    });

    let extender_token = token.clone();
    let extender_handle = tokio::spawn(async move {
        if let Err(e) = extender.run(extender_token).await {
            error!("extender server error: {e}");
        }
    });

    let sig = shutdown_signal().await;
    info!("received {sig}, shutting down gracefully...");
    token.cancel();

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = tokio::join!(reconciler_handle, extender_handle);
    })
    .await;

    info!("shutdown complete");
    Ok(())
}

/// Wait for either SIGINT (ctrl-c) or SIGTERM, returning which one fired.
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

fn parse_sync_period(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if let Some(secs) = raw.strip_suffix('s') {
        return secs
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| e.to_string());
    }
    if let Some(mins) = raw.strip_suffix('m') {
        return mins
            .parse::<u64>()
            .map(|m| Duration::from_secs(m * 60))
            .map_err(|e| e.to_string());
    }
    if let Some(hours) = raw.strip_suffix('h') {
        return hours
            .parse::<u64>()
            .map(|h| Duration::from_secs(h * 3600))
            .map_err(|e| e.to_string());
    }
    raw.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds_minutes_and_hours() {
        assert_eq!(parse_sync_period("15s").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_sync_period("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_sync_period("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_sync_period("30").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_sync_period("soon").is_err());
    }
}
