use crate::error::Result;
use async_trait::async_trait;
use cardpool_core::{Node, Pod};

/// One observed change to a pod, as delivered by the orchestrator's watch
/// stream. Mirrors the `added | updated(old, new) | deleted` shape the
/// reconciler's transition table expects.
#[derive(Debug, Clone)]
pub enum PodEvent {
    Added(Pod),
    Updated(Box<Pod>, Box<Pod>),
    Deleted(Pod),
}

/// Abstracts over the orchestrator so the allocator, cache and reconciler
/// never talk HTTP/kube directly. Implemented by [`crate::kube_client::KubeClient`]
/// against a real API server and by [`crate::mock::MockClient`] in tests.
#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// Fetch a node by name, for deriving its advertised GPU capacity.
    async fn get_node(&self, name: &str) -> Result<Node>;

    /// Fetch one pod by namespace/name.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// Pods labeled `<domain>/assumed = true` and bound to `node_name`,
    /// used to replay allocator state when a node is lazily loaded.
    async fn list_assumed_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>>;

    /// Persist `pod`'s annotations/labels (the allocator's metadata
    /// contract). Retries once on an optimistic-concurrency conflict by
    /// refetching and reapplying the same mutation via `patch`.
    async fn update_pod(&self, pod: &Pod) -> Result<Pod>;

    /// Ask the orchestrator to bind `pod_uid` to `node`, the terminal step
    /// of `POST /scheduler/bind`.
    async fn bind_pod(
        &self,
        namespace: &str,
        name: &str,
        pod_uid: &str,
        node: &str,
    ) -> Result<()>;

    /// A live stream of pod add/update/delete events, for the reconciler's
    /// informer loop. Implementations should resync periodically in
    /// addition to the stream to tolerate missed events.
    async fn watch_pods(
        &self,
    ) -> Result<futures_util::stream::BoxStream<'static, PodEvent>>;
}
