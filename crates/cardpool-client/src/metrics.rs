//! Periodic polling of the external metrics collaborator for load-aware
//! scoring — `gpu_core_usage_avg_15s` / `gpu_memory_usage_avg_15s` samples
//! keyed by node. Honors each metric's own sync period from policy.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// One utilization sample for a named metric on a node.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub value: f64,
    pub observed_at: Instant,
}

impl Sample {
    /// Samples older than `window` are treated as missing per the
    /// load-aware rater's staleness rule.
    pub fn is_stale(&self, window: Duration) -> bool {
        self.observed_at.elapsed() > window
    }
}

/// Fetches the current value of a named metric for a node. Implementations
/// talk to whatever collaborator the deployment uses (Prometheus, DCGM
/// exporter, etc.) — this crate only defines the polling contract.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(&self, node: &str, metric: &str) -> crate::error::Result<f64>;
}

/// A single metric's poll configuration: name and how often to refresh it.
#[derive(Debug, Clone)]
pub struct MetricSpec {
    pub name: String,
    pub period: Duration,
}

/// Polls a [`MetricsSource`] on a per-metric schedule and keeps the latest
/// sample for each `(node, metric)` pair in memory.
pub struct MetricsPoller {
    source: Arc<dyn MetricsSource>,
    specs: Vec<MetricSpec>,
    nodes: Arc<RwLock<Vec<String>>>,
    samples: Arc<RwLock<HashMap<(String, String), Sample>>>,
}

impl MetricsPoller {
    pub fn new(source: Arc<dyn MetricsSource>, specs: Vec<MetricSpec>) -> Self {
        Self {
            source,
            specs,
            nodes: Arc::new(RwLock::new(Vec::new())),
            samples: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Nodes to poll metrics for. Typically kept in sync with the cluster
    /// cache's known node set.
    pub fn set_nodes(&self, nodes: Vec<String>) {
        *self.nodes.write().unwrap() = nodes;
    }

    pub fn latest(&self, node: &str, metric: &str) -> Option<Sample> {
        self.samples
            .read()
            .unwrap()
            .get(&(node.to_string(), metric.to_string()))
            .copied()
    }

    /// Run one polling loop per metric, each on its own configured period,
    /// until cancelled.
    pub async fn run(&self, token: CancellationToken) {
        if self.specs.is_empty() {
            debug!("no metric specs configured, metrics poller idling");
            token.cancelled().await;
            return;
        }

        let tasks: Vec<_> = self
            .specs
            .iter()
            .cloned()
            .map(|spec| {
                let token = token.clone();
                let source = Arc::clone(&self.source);
                let nodes = Arc::clone(&self.nodes);
                let samples = Arc::clone(&self.samples);
                async move { poll_one_metric(spec, source, nodes, samples, token).await }
            })
            .collect();

        futures_util::future::join_all(tasks).await;
    }
}

async fn poll_one_metric(
    spec: MetricSpec,
    source: Arc<dyn MetricsSource>,
    nodes: Arc<RwLock<Vec<String>>>,
    samples: Arc<RwLock<HashMap<(String, String), Sample>>>,
    token: CancellationToken,
) {
    info!("polling metric {} every {:?}", spec.name, spec.period);
    let mut interval = tokio::time::interval(spec.period);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("metrics poller for {} shutting down", spec.name);
                return;
            }
            _ = interval.tick() => {
                let targets = nodes.read().unwrap().clone();
                for node in targets {
                    match source.fetch(&node, &spec.name).await {
                        Ok(value) => {
                            samples.write().unwrap().insert(
                                (node, spec.name.clone()),
                                Sample { value, observed_at: Instant::now() },
                            );
                        }
                        Err(e) => {
                            error!("failed to fetch metric {} for node {}: {}", spec.name, node, e);
                        }
                    }
                }
            }
        }
    }
}
