//! In-memory [`OrchestratorClient`] for tests — no real API server.

use crate::error::{ClientError, Result};
use crate::traits::{OrchestratorClient, PodEvent};
use async_trait::async_trait;
use cardpool_core::{Node, Pod};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio_stream::wrappers::ReceiverStream;

fn pod_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Maintains an in-memory node/pod registry and a queue of pending watch
/// events that tests can drain via [`MockClient::watch_pods`].
#[derive(Default)]
pub struct MockClient {
    nodes: Mutex<HashMap<String, Node>>,
    pods: Mutex<HashMap<String, Pod>>,
    bound: Mutex<Vec<(String, String, String, String)>>,
    pending_events: Mutex<Vec<PodEvent>>,
    fail_next_update_with_conflict: AtomicBool,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.nodes.lock().unwrap().insert(name, node);
    }

    pub fn insert_pod(&self, pod: Pod) {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.pods.lock().unwrap().insert(pod_key(&namespace, &name), pod);
    }

    /// Enqueue an event that the next (or an already-open) `watch_pods`
    /// stream will deliver.
    pub fn push_event(&self, event: PodEvent) {
        self.pending_events.lock().unwrap().push(event);
    }

    /// Pods bound via `bind_pod`, as `(namespace, name, uid, node)`.
    pub fn bound_calls(&self) -> Vec<(String, String, String, String)> {
        self.bound.lock().unwrap().clone()
    }

    /// Make the next `update_pod` call fail with a resource-version
    /// conflict, to exercise the refetch-and-retry-once policy.
    pub fn fail_next_update_with_conflict(&self) {
        self.fail_next_update_with_conflict.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrchestratorClient for MockClient {
    async fn get_node(&self, name: &str) -> Result<Node> {
        self.nodes
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::not_found("Node", name))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.pods
            .lock()
            .unwrap()
            .get(&pod_key(namespace, name))
            .cloned()
            .ok_or_else(|| ClientError::not_found("Pod", pod_key(namespace, name)))
    }

    async fn list_assumed_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>> {
        Ok(self
            .pods
            .lock()
            .unwrap()
            .values()
            .filter(|p| {
                cardpool_core::metadata::is_assumed(p)
                    && p.spec
                        .as_ref()
                        .and_then(|s| s.node_name.as_deref())
                        .is_some_and(|n| n == node_name)
            })
            .cloned()
            .collect())
    }

    async fn update_pod(&self, pod: &Pod) -> Result<Pod> {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let name = pod.metadata.name.clone().unwrap_or_default();

        if self
            .fail_next_update_with_conflict
            .swap(false, Ordering::SeqCst)
        {
            return Err(ClientError::conflict("Pod", pod_key(&namespace, &name)));
        }

        self.pods
            .lock()
            .unwrap()
            .insert(pod_key(&namespace, &name), pod.clone());
        Ok(pod.clone())
    }

    async fn bind_pod(
        &self,
        namespace: &str,
        name: &str,
        pod_uid: &str,
        node: &str,
    ) -> Result<()> {
        self.bound.lock().unwrap().push((
            namespace.to_string(),
            name.to_string(),
            pod_uid.to_string(),
            node.to_string(),
        ));
        Ok(())
    }

    async fn watch_pods(&self) -> Result<BoxStream<'static, PodEvent>> {
        let events = std::mem::take(&mut *self.pending_events.lock().unwrap());
        let (tx, rx) = tokio::sync::mpsc::channel(events.len().max(1));
        for event in events {
            let _ = tx.send(event).await;
        }
        Ok(ReceiverStream::new(rx).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod(namespace: &str, name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn get_pod_round_trips() {
        let client = MockClient::new();
        client.insert_pod(pod("default", "p1"));
        let fetched = client.get_pod("default", "p1").await.unwrap();
        assert_eq!(fetched.metadata.name.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn get_pod_missing_is_not_found() {
        let client = MockClient::new();
        assert!(matches!(
            client.get_pod("default", "missing").await,
            Err(ClientError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn bind_pod_is_recorded() {
        let client = MockClient::new();
        client.bind_pod("default", "p1", "uid-1", "node-a").await.unwrap();
        assert_eq!(
            client.bound_calls(),
            vec![(
                "default".to_string(),
                "p1".to_string(),
                "uid-1".to_string(),
                "node-a".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn watch_pods_delivers_queued_events() {
        let client = MockClient::new();
        client.push_event(PodEvent::Added(pod("default", "p1")));
        let mut stream = client.watch_pods().await.unwrap();
        let event = stream.next().await.unwrap();
        assert!(matches!(event, PodEvent::Added(_)));
    }
}
