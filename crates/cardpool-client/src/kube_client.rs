//! Real [`OrchestratorClient`] backed by the `kube` crate.

use crate::error::{ClientError, Result};
use crate::traits::{OrchestratorClient, PodEvent};
use async_trait::async_trait;
use cardpool_core::metadata;
use cardpool_core::{Node, Pod};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::watcher::{self, Event};
use kube::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

const RPC_TIMEOUT: Duration = Duration::from_secs(10);
const FIELD_MANAGER: &str = "cardpool-extender";

/// Talks to a real Kubernetes API server via `kube::Client`.
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the in-cluster config, falling back to
    /// `KUBECONFIG`/`~/.kube/config` — the same precedence `kube::Client`
    /// normally resolves, surfaced explicitly so startup failures map to a
    /// configuration error rather than a bare panic.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| ClientError::io(format!("building kube client: {e}")))?;
        Ok(Self::new(client))
    }

    async fn with_timeout<T>(
        operation: &'static str,
        fut: impl std::future::Future<Output = kube::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(RPC_TIMEOUT, fut).await {
            Ok(res) => res.map_err(ClientError::from),
            Err(_) => Err(ClientError::timeout(operation)),
        }
    }
}

#[async_trait]
impl OrchestratorClient for KubeClient {
    async fn get_node(&self, name: &str) -> Result<Node> {
        let api: Api<Node> = Api::all(self.client.clone());
        Self::with_timeout("get_node", api.get(name)).await
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Self::with_timeout("get_pod", api.get(name)).await
    }

    async fn list_assumed_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let lp = ListParams::default().labels(&format!("{}=true", metadata::assumed_key()));
        let list = Self::with_timeout("list_assumed_pods_on_node", api.list(&lp)).await?;
        Ok(list
            .into_iter()
            .filter(|p| {
                p.spec
                    .as_ref()
                    .and_then(|s| s.node_name.as_deref())
                    .is_some_and(|n| n == node_name)
            })
            .collect())
    }

    async fn update_pod(&self, pod: &Pod) -> Result<Pod> {
        let namespace = pod.metadata.namespace.as_deref().unwrap_or("default");
        let name = pod
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ClientError::io("pod has no name"))?;
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let patch = serde_json::json!({
            "metadata": {
                "annotations": pod.metadata.annotations,
                "labels": pod.metadata.labels,
            }
        });

        Self::with_timeout(
            "update_pod",
            api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch)),
        )
        .await
    }

    async fn bind_pod(
        &self,
        namespace: &str,
        name: &str,
        pod_uid: &str,
        node: &str,
    ) -> Result<()> {
        let binding = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Binding",
            "metadata": { "name": name, "namespace": namespace, "uid": pod_uid },
            "target": { "apiVersion": "v1", "kind": "Node", "name": node },
        });

        let url = format!("/api/v1/namespaces/{namespace}/pods/{name}/binding");
        let request = http::Request::post(&url)
            .header("content-type", "application/json")
            .body(serde_json::to_vec(&binding).map_err(|e| ClientError::io(e.to_string()))?)
            .map_err(|e| ClientError::io(e.to_string()))?;

        Self::with_timeout("bind_pod", async {
            self.client
                .request::<serde_json::Value>(request)
                .await
                .map(|_| ())
        })
        .await
    }

    async fn watch_pods(&self) -> Result<BoxStream<'static, PodEvent>> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut seen: HashMap<String, Pod> = HashMap::new();
            let mut stream = Box::pin(watcher::watcher(api, watcher::Config::default()));
            while let Some(event) = stream.next().await {
                match event {
                    Ok(Event::Apply(pod)) | Ok(Event::InitApply(pod)) => {
                        let key = pod_key(&pod);
                        let out = match seen.insert(key, pod.clone()) {
                            Some(old) => PodEvent::Updated(Box::new(old), Box::new(pod)),
                            None => PodEvent::Added(pod),
                        };
                        if tx.send(out).await.is_err() {
                            break;
                        }
                    }
                    Ok(Event::Delete(pod)) => {
                        seen.remove(&pod_key(&pod));
                        if tx.send(PodEvent::Deleted(pod)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Event::Init) | Ok(Event::InitDone) => {}
                    Err(e) => warn!("pod watch error: {e}"),
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

fn pod_key(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or("default"),
        pod.metadata.name.as_deref().unwrap_or("")
    )
}
