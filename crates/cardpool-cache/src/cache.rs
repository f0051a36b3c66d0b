//! Cluster scheduling cache (C5): the single source of truth for which
//! node owns which card vector, and the only thing that talks to both the
//! allocator and the orchestrator client.

use crate::error::{CacheError, Result};
use crate::predicates;
use cardpool_allocator::{NodeAllocator, Rater, RaterKind, SCORE_MIN};
use cardpool_client::{ClientError, OrchestratorClient};
use cardpool_core::{quantities, gpu_core_resource_name, gpu_memory_resource_name, metadata, Pod};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Builds a fresh [`Rater`] for a newly loaded node. Boxed so callers can
/// plug in a load-aware decorator (see [`ClusterCache::with_rater_factory`])
/// without the cache knowing about policy YAML or metrics.
pub type RaterFactory = Arc<dyn Fn() -> Box<dyn Rater> + Send + Sync>;

struct Inner {
    nodes: HashMap<String, NodeAllocator>,
    pods: HashMap<String, Pod>,
    released: HashSet<String>,
    no_gpu: HashSet<String>,
}

/// Outcome of a `filter` call: which of the requested nodes can fit the pod,
/// and why each of the rest can't.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub passed: Vec<String>,
    pub failed: HashMap<String, String>,
}

/// Owns every node's [`NodeAllocator`] plus the pod/released bookkeeping
/// needed by the lifecycle reconciler, serialized under one mutex per the
/// design notes — contention is low and the correctness argument is
/// simpler than per-node locking.
pub struct ClusterCache {
    inner: Mutex<Inner>,
    client: Arc<dyn OrchestratorClient>,
    rater_factory: RaterFactory,
}

impl ClusterCache {
    pub fn new(client: Arc<dyn OrchestratorClient>, rater_kind: RaterKind) -> Self {
        Self::with_rater_factory(client, Arc::new(move || rater_kind.build()))
    }

    /// Build a cache whose nodes are scored by whatever `rater_factory`
    /// produces — the hook a load-aware policy uses to wrap the configured
    /// base rater in [`cardpool_allocator::LoadAwareRater`].
    pub fn with_rater_factory(client: Arc<dyn OrchestratorClient>, rater_factory: RaterFactory) -> Self {
        Self {
            inner: Mutex::new(Inner {
                nodes: HashMap::new(),
                pods: HashMap::new(),
                released: HashSet::new(),
                no_gpu: HashSet::new(),
            }),
            client,
            rater_factory,
        }
    }

    /// `filter(nodeNames, pod)`: lazily construct each node's allocator,
    /// then try to place the pod on it. Nodes that can fit it are reported
    /// in `passed`; the rest carry a reason in `failed`.
    pub async fn filter(&self, node_names: &[String], pod: &Pod) -> Result<FilterOutcome> {
        let mut inner = self.inner.lock().await;
        let mut outcome = FilterOutcome::default();

        for name in node_names {
            if let Ok(node) = self.client.get_node(name).await {
                if let Err(reason) = predicates::check(pod, &node) {
                    outcome.failed.insert(name.clone(), reason);
                    continue;
                }
            }

            if let Err(e) = self.ensure_node(&mut inner, name).await {
                outcome.failed.insert(name.clone(), e.to_string());
                continue;
            }
            let allocator = inner.nodes.get_mut(name).expect("just ensured");
            match allocator.assume(pod) {
                Ok(true) => outcome.passed.push(name.clone()),
                Ok(false) => {
                    outcome
                        .failed
                        .insert(name.clone(), "no feasible placement".to_string());
                }
                Err(e) => {
                    outcome.failed.insert(name.clone(), e.to_string());
                }
            }
        }

        Ok(outcome)
    }

    /// `score(nodeNames, pod)`: the cached (or freshly computed) plan score
    /// per node, in the same order as `node_names`. Missing/unavailable
    /// nodes yield [`SCORE_MIN`].
    pub async fn score(&self, node_names: &[String], pod: &Pod) -> Result<Vec<i64>> {
        let mut inner = self.inner.lock().await;
        let mut scores = Vec::with_capacity(node_names.len());

        for name in node_names {
            if self.ensure_node(&mut inner, name).await.is_err() {
                scores.push(SCORE_MIN);
                continue;
            }
            let allocator = inner.nodes.get_mut(name).expect("just ensured");
            scores.push(allocator.score(pod)?);
        }

        Ok(scores)
    }

    /// `bind(name, pod)`: commit the cached plan, persist the assignment to
    /// the pod's metadata, then ask the orchestrator to bind it. Rolls back
    /// the allocator via `forget` if anything after the commit fails — see
    /// the design notes' resolution of the source's ambiguous rollback
    /// behavior.
    pub async fn bind(&self, name: &str, pod: &Pod) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_node(&mut inner, name).await?;

        let allocator = inner.nodes.get_mut(name).expect("just ensured");
        let assigned = allocator.commit(pod)?;

        let mut updated = pod.clone();
        metadata::mark_assumed(&mut updated);
        if let Some(spec) = &pod.spec {
            for (container, indices) in spec.containers.iter().zip(assigned.iter()) {
                metadata::write_assignment(&mut updated, &container.name, indices);
            }
        }

        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let pod_name = pod.metadata.name.clone().unwrap_or_default();
        let uid = pod.metadata.uid.clone().unwrap_or_default();

        match self.client.update_pod(&updated).await {
            Ok(_) => {}
            Err(ClientError::Conflict { .. }) => {
                warn!("stale resource version updating pod {namespace}/{pod_name}, refetching and retrying once");
                let refetch_and_retry: Result<()> = async {
                    let mut refetched = self.client.get_pod(&namespace, &pod_name).await?;
                    metadata::mark_assumed(&mut refetched);
                    if let Some(spec) = &pod.spec {
                        for (container, indices) in spec.containers.iter().zip(assigned.iter()) {
                            metadata::write_assignment(&mut refetched, &container.name, indices);
                        }
                    }
                    self.client.update_pod(&refetched).await?;
                    updated = refetched;
                    Ok(())
                }
                .await;
                if let Err(e) = refetch_and_retry {
                    warn!("rolling back allocator for pod {namespace}/{pod_name} after retry-on-conflict failure: {e}");
                    let allocator = inner.nodes.get_mut(name).expect("just ensured");
                    allocator.forget(pod)?;
                    return Err(e);
                }
            }
            Err(e) => {
                warn!("rolling back allocator for pod {namespace}/{pod_name} after metadata update failure: {e}");
                let allocator = inner.nodes.get_mut(name).expect("just ensured");
                allocator.forget(pod)?;
                return Err(e.into());
            }
        }

        if let Err(e) = self.client.bind_pod(&namespace, &pod_name, &uid, name).await {
            warn!("rolling back allocator for pod {namespace}/{pod_name} after orchestrator bind failure: {e}");
            let allocator = inner.nodes.get_mut(name).expect("just ensured");
            allocator.forget(pod)?;
            return Err(e.into());
        }

        inner.pods.insert(uid, updated);
        Ok(())
    }

    /// `bind` as the extender's wire protocol names it: by node/namespace/
    /// name/UID rather than a full `Pod`. Fetches the real pod from the
    /// orchestrator first — the `/scheduler/bind` body carries no spec, so
    /// without this the allocator would commit against an empty demand
    /// vector and never match the plan cached during `filter`/`priorities`.
    /// Mirrors the reference `GetPod`'s one-retry-then-verify-UID handling
    /// of a pod that was deleted and recreated between `filter` and `bind`.
    pub async fn bind_by_name(
        &self,
        node: &str,
        namespace: &str,
        name: &str,
        uid: &str,
    ) -> Result<()> {
        let mut pod = self.client.get_pod(namespace, name).await?;
        if pod.metadata.uid.as_deref() != Some(uid) {
            pod = self.client.get_pod(namespace, name).await?;
            if pod.metadata.uid.as_deref() != Some(uid) {
                return Err(CacheError::pod_uid_mismatch(
                    namespace,
                    name,
                    uid,
                    pod.metadata.uid.clone().unwrap_or_default(),
                ));
            }
        }
        self.bind(node, &pod).await
    }

    /// Idempotent registration of a pod bound out-of-band (startup replay,
    /// or a pod another process already committed).
    pub async fn add_assumed(&self, pod: &Pod) -> Result<()> {
        let Some(name) = pod.spec.as_ref().and_then(|s| s.node_name.clone()) else {
            return Ok(());
        };
        let mut inner = self.inner.lock().await;
        self.ensure_node(&mut inner, &name).await?;

        let uid = pod.metadata.uid.clone().unwrap_or_default();
        if inner.nodes.get(&name).is_some_and(|a| a.known(&uid)) {
            return Ok(());
        }

        let allocator = inner.nodes.get_mut(&name).expect("just ensured");
        allocator.add(pod)?;
        inner.pods.insert(uid, pod.clone());
        Ok(())
    }

    /// Return a pod's resources to its node's allocator and move it into
    /// the released set.
    pub async fn release(&self, pod: &Pod) -> Result<()> {
        let Some(name) = pod.spec.as_ref().and_then(|s| s.node_name.clone()) else {
            return Ok(());
        };
        let uid = pod.metadata.uid.clone().unwrap_or_default();

        let mut inner = self.inner.lock().await;
        if let Some(allocator) = inner.nodes.get_mut(&name) {
            allocator.forget(pod)?;
        }
        inner.pods.remove(&uid);
        inner.released.insert(uid);
        Ok(())
    }

    pub async fn known(&self, uid: &str) -> bool {
        self.inner.lock().await.pods.contains_key(uid)
    }

    pub async fn released(&self, uid: &str) -> bool {
        self.inner.lock().await.released.contains(uid)
    }

    /// A snapshot of every loaded node's card vector, for `GET /status`.
    /// Nodes never lazily loaded (no pod has touched them yet) are absent.
    pub async fn snapshot(&self) -> HashMap<String, Vec<cardpool_core::Card>> {
        let inner = self.inner.lock().await;
        inner
            .nodes
            .iter()
            .map(|(name, allocator)| (name.clone(), allocator.cards().to_vec()))
            .collect()
    }

    /// First use of `name`: fetch the Node and its already-assumed pods
    /// from the orchestrator, build a fresh allocator sized to the node's
    /// advertised GPU capacity, and replay each pod onto it.
    async fn ensure_node(&self, inner: &mut Inner, name: &str) -> Result<()> {
        if inner.nodes.contains_key(name) {
            return Ok(());
        }

        let node = self.client.get_node(name).await?;
        let Some((card_count, mem_per_card)) = node_capacity(&node) else {
            inner.no_gpu.insert(name.to_string());
            return Err(CacheError::node_unavailable(name, "no GPU capacity advertised"));
        };

        if inner.no_gpu.remove(name) {
            info!("node {name} advertised GPU capacity after previously having none ({card_count} cards); building allocator");
        }

        let mut allocator = NodeAllocator::new(name, card_count, mem_per_card, (self.rater_factory)());

        match self.client.list_assumed_pods_on_node(name).await {
            Ok(pods) => {
                for pod in pods {
                    let pod_name = pod.metadata.name.clone().unwrap_or_default();
                    if let Err(e) = allocator.add(&pod) {
                        warn!("skipping replay of pod {pod_name} on node {name}: {e}");
                        continue;
                    }
                    let uid = pod.metadata.uid.clone().unwrap_or_default();
                    inner.pods.insert(uid, pod);
                }
            }
            Err(e) => warn!("failed to list assumed pods on node {name}: {e}"),
        }

        info!("lazily loaded allocator for node {name} ({card_count} cards)");
        inner.nodes.insert(name.to_string(), allocator);
        Ok(())
    }
}

fn node_capacity(node: &cardpool_core::Node) -> Option<(usize, i64)> {
    let allocatable = node.status.as_ref()?.allocatable.as_ref()?;

    let total_core = allocatable
        .get(&gpu_core_resource_name())
        .and_then(|q| quantities::parse_gpu_core(&q.0).ok())?;
    let card_count = (total_core / 100).max(1) as usize;

    let total_mem = allocatable
        .get(&gpu_memory_resource_name())
        .and_then(|q| quantities::parse_gpu_memory(&q.0).ok())
        .unwrap_or(0);
    let mem_per_card = total_mem / card_count as i64;

    debug!("node capacity: {card_count} cards, {mem_per_card} bytes/card");
    Some((card_count, mem_per_card))
}
