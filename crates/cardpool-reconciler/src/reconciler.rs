//! The lifecycle reconciler (C6): consumes the orchestrator's pod-event
//! stream, filters to GPU-bearing pods, and drives each one through the
//! cluster cache per the transition table in §4.6.

use crate::queue::{PodKey, WorkQueue};
use cardpool_cache::ClusterCache;
use cardpool_client::{ClientError, OrchestratorClient, PodEvent};
use cardpool_core::{Demand, Pod};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(500);
const DEFAULT_WORKER_COUNT: usize = 1;

/// True if any container in the pod declares a nonzero GPU demand.
fn has_gpu_demand(pod: &Pod) -> bool {
    let Some(spec) = &pod.spec else { return false };
    spec.containers.iter().any(|c| {
        Demand::from_container(c)
            .map(|d| !d.is_none())
            .unwrap_or(false)
    })
}

fn pod_key(pod: &Pod) -> PodKey {
    PodKey {
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        name: pod.metadata.name.clone().unwrap_or_default(),
    }
}

fn is_terminal_or_deleting(pod: &Pod) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return true;
    }
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| phase == "Succeeded" || phase == "Failed")
}

/// Drives pods through *unseen -> assumed -> bound -> completed -> released*
/// and rebuilds allocator state after a restart, per the source's design.
pub struct Reconciler {
    client: Arc<dyn OrchestratorClient>,
    cache: Arc<ClusterCache>,
    queue: Arc<WorkQueue>,
    worker_count: usize,
}

impl Reconciler {
    pub fn new(client: Arc<dyn OrchestratorClient>, cache: Arc<ClusterCache>) -> Self {
        Self::with_config(
            client,
            cache,
            DEFAULT_WORKER_COUNT,
            DEFAULT_MAX_RETRIES,
            DEFAULT_BASE_BACKOFF,
        )
    }

    pub fn with_config(
        client: Arc<dyn OrchestratorClient>,
        cache: Arc<ClusterCache>,
        worker_count: usize,
        max_retries: u32,
        base_backoff: Duration,
    ) -> Self {
        Self {
            client,
            cache,
            queue: Arc::new(WorkQueue::new(1024, max_retries, base_backoff)),
            worker_count: worker_count.max(1),
        }
    }

    /// Runs the informer loop and `worker_count` queue workers until
    /// `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) -> crate::Result<()> {
        let mut workers = Vec::with_capacity(self.worker_count);
        for id in 0..self.worker_count {
            let client = Arc::clone(&self.client);
            let cache = Arc::clone(&self.cache);
            let queue = Arc::clone(&self.queue);
            let worker_token = token.clone();
            workers.push(tokio::spawn(async move {
                run_worker(id, client, cache, queue, worker_token).await;
            }));
        }

        let mut stream = self.client.watch_pods().await?;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = stream.next() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            warn!("pod watch stream ended, stopping reconciler");
                            break;
                        }
                    }
                }
            }
        }

            for worker in workers {
            let _ = worker.await;
        }
        Ok(())
    }

    async fn handle_event(&self, event: PodEvent) {
        let pod = match &event {
            PodEvent::Added(pod) => pod,
            PodEvent::Updated(_, new) => new.as_ref(),
            PodEvent::Deleted(pod) => pod,
        };

        if !has_gpu_demand(pod) {
            return;
        }

        self.queue.add(pod_key(pod)).await;
    }
}

async fn run_worker(
    id: usize,
    client: Arc<dyn OrchestratorClient>,
    cache: Arc<ClusterCache>,
    queue: Arc<WorkQueue>,
    token: CancellationToken,
) {
    info!("reconciler worker {id} started");
    loop {
        let key = tokio::select! {
            _ = token.cancelled() => break,
            key = queue.get() => match key {
                Some(key) => key,
                None => break,
            },
        };

        match reconcile_one(&client, &cache, &key).await {
            Ok(()) => queue.done(&key),
            Err(e) => queue.requeue_after_failure(key, e).await,
        }
    }
    info!("reconciler worker {id} stopped");
}

async fn reconcile_one(
    client: &Arc<dyn OrchestratorClient>,
    cache: &Arc<ClusterCache>,
    key: &PodKey,
) -> crate::Result<()> {
    let pod = match client.get_pod(&key.namespace, &key.name).await {
        Ok(pod) => pod,
        Err(ClientError::NotFound { .. }) => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let uid = pod.metadata.uid.clone().unwrap_or_default();

    if is_terminal_or_deleting(&pod) {
        if cache.known(&uid).await {
            cache.release(&pod).await?;
        }
        return Ok(());
    }

    let assigned_node = pod.spec.as_ref().and_then(|s| s.node_name.as_ref());
    let assumed = cardpool_core::metadata::is_assumed(&pod);

    if assigned_node.is_some()
        && assumed
        && !cache.known(&uid).await
        && !cache.released(&uid).await
    {
        cache.add_assumed(&pod).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardpool_allocator::RaterKind;
    use cardpool_client::MockClient;
    use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, PodStatus, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn gpu_pod(uid: &str, name: &str) -> Pod {
        let mut requests = BTreeMap::new();
        requests.insert(cardpool_core::gpu_core_resource_name(), Quantity("50".to_string()));
        requests.insert(cardpool_core::gpu_memory_resource_name(), Quantity("2Gi".to_string()));
        Pod {
            metadata: ObjectMeta {
                uid: Some(uid.to_string()),
                namespace: Some("default".to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "trainer".to_string(),
                    resources: Some(ResourceRequirements {
                        requests: Some(requests),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn non_gpu_pod_has_no_demand() {
        let pod = Pod {
            spec: Some(PodSpec {
                containers: vec![Container::default()],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(!has_gpu_demand(&pod));
    }

    #[test]
    fn gpu_pod_has_demand() {
        assert!(has_gpu_demand(&gpu_pod("u1", "p1")));
    }

    #[test]
    fn succeeded_phase_is_terminal() {
        let mut pod = gpu_pod("u1", "p1");
        pod.status = Some(PodStatus {
            phase: Some("Succeeded".to_string()),
            ..Default::default()
        });
        assert!(is_terminal_or_deleting(&pod));
    }

    #[tokio::test]
    async fn reconcile_missing_pod_is_a_no_op() {
        let client: Arc<dyn OrchestratorClient> = Arc::new(MockClient::new());
        let cache = Arc::new(ClusterCache::new(Arc::clone(&client), RaterKind::Binpack));
        let key = PodKey {
            namespace: "default".to_string(),
            name: "ghost".to_string(),
        };
        reconcile_one(&client, &cache, &key).await.unwrap();
    }

    #[tokio::test]
    async fn reconcile_replays_assumed_pod_not_yet_known() {
        use cardpool_core::metadata;
        use k8s_openapi::api::core::v1::{Node, NodeStatus};

        let client_impl = MockClient::new();
        let mut allocatable = BTreeMap::new();
        allocatable.insert(cardpool_core::gpu_core_resource_name(), Quantity("200".to_string()));
        allocatable.insert(cardpool_core::gpu_memory_resource_name(), Quantity("32Gi".to_string()));
        client_impl.insert_node(Node {
            metadata: ObjectMeta {
                name: Some("node-a".to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                allocatable: Some(allocatable),
                ..Default::default()
            }),
            ..Default::default()
        });

        let mut pod = gpu_pod("u1", "p1");
        pod.spec.as_mut().unwrap().node_name = Some("node-a".to_string());
        metadata::mark_assumed(&mut pod);
        client_impl.insert_pod(pod.clone());

        let client: Arc<dyn OrchestratorClient> = Arc::new(client_impl);
        let cache = Arc::new(ClusterCache::new(Arc::clone(&client), RaterKind::Binpack));
        let key = PodKey {
            namespace: "default".to_string(),
            name: "p1".to_string(),
        };

        reconcile_one(&client, &cache, &key).await.unwrap();
        assert!(cache.known("u1").await);
    }

    #[tokio::test]
    async fn reconcile_releases_a_completed_known_pod() {
        use cardpool_core::metadata;
        use k8s_openapi::api::core::v1::{Node, NodeStatus};

        let client_impl = MockClient::new();
        let mut allocatable = BTreeMap::new();
        allocatable.insert(cardpool_core::gpu_core_resource_name(), Quantity("200".to_string()));
        allocatable.insert(cardpool_core::gpu_memory_resource_name(), Quantity("32Gi".to_string()));
        client_impl.insert_node(Node {
            metadata: ObjectMeta {
                name: Some("node-a".to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                allocatable: Some(allocatable),
                ..Default::default()
            }),
            ..Default::default()
        });

        let mut pod = gpu_pod("u1", "p1");
        pod.spec.as_mut().unwrap().node_name = Some("node-a".to_string());
        metadata::mark_assumed(&mut pod);
        client_impl.insert_pod(pod.clone());

        let client: Arc<dyn OrchestratorClient> = Arc::new(client_impl);
        let cache = Arc::new(ClusterCache::new(Arc::clone(&client), RaterKind::Binpack));
        cache.add_assumed(&pod).await.unwrap();
        assert!(cache.known("u1").await);

        let mut completed = pod.clone();
        completed.status = Some(PodStatus {
            phase: Some("Succeeded".to_string()),
            ..Default::default()
        });

        let key = PodKey {
            namespace: "default".to_string(),
            name: "p1".to_string(),
        };
        // Simulate the orchestrator reporting the pod as completed now.
        let mock = MockClient::new();
        mock.insert_pod(completed);
        let client2: Arc<dyn OrchestratorClient> = Arc::new(mock);
        reconcile_one(&client2, &cache, &key).await.unwrap();

        assert!(!cache.known("u1").await);
        assert!(cache.released("u1").await);
    }
}
