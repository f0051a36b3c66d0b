//! The three scheduler-extender endpoints plus version/status/metrics,
//! translating directly to [`cardpool_cache::ClusterCache`] calls.

use crate::error::Result;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use cardpool_core::Pod;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct ExtenderArgs {
    #[serde(rename = "Pod")]
    pub pod: Pod,
    #[serde(rename = "NodeNames")]
    pub node_names: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Default)]
pub struct FilterResult {
    #[serde(rename = "NodeNames")]
    pub node_names: Vec<String>,
    #[serde(rename = "FailedNodes")]
    pub failed_nodes: HashMap<String, String>,
    #[serde(rename = "Error")]
    pub error: String,
}

pub async fn filter(
    State(state): State<AppState>,
    Json(args): Json<ExtenderArgs>,
) -> Json<FilterResult> {
    let Some(node_names) = args.node_names else {
        return Json(FilterResult {
            error: "node cache required".to_string(),
            ..Default::default()
        });
    };

    match state.cache.filter(&node_names, &args.pod).await {
        Ok(outcome) => Json(FilterResult {
            node_names: outcome.passed,
            failed_nodes: outcome.failed,
            error: String::new(),
        }),
        Err(e) => Json(FilterResult {
            error: e.to_string(),
            ..Default::default()
        }),
    }
}

#[derive(Debug, Serialize)]
pub struct HostPriority {
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Score")]
    pub score: i64,
}

pub async fn priorities(
    State(state): State<AppState>,
    Json(args): Json<ExtenderArgs>,
) -> Result<Json<Vec<HostPriority>>> {
    let node_names = args.node_names.unwrap_or_default();
    let scores = state.cache.score(&node_names, &args.pod).await?;

    let priorities = node_names
        .into_iter()
        .zip(scores)
        .map(|(host, score)| HostPriority { host, score })
        .collect();

    Ok(Json(priorities))
}

#[derive(Debug, Deserialize)]
pub struct BindArgs {
    #[serde(rename = "PodName")]
    pub pod_name: String,
    #[serde(rename = "PodNamespace")]
    pub pod_namespace: String,
    #[serde(rename = "PodUID")]
    pub pod_uid: String,
    #[serde(rename = "Node")]
    pub node: String,
}

#[derive(Debug, Serialize, Default)]
pub struct BindResult {
    #[serde(rename = "Error")]
    pub error: String,
}

pub async fn bind(
    State(state): State<AppState>,
    Json(args): Json<BindArgs>,
) -> Json<BindResult> {
    match state
        .cache
        .bind_by_name(&args.node, &args.pod_namespace, &args.pod_name, &args.pod_uid)
        .await
    {
        Ok(()) => Json(BindResult::default()),
        Err(e) => Json(BindResult {
            error: e.to_string(),
        }),
    }
}

pub async fn version(State(state): State<AppState>) -> String {
    state.version.to_string()
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub nodes: HashMap<String, Vec<cardpool_core::Card>>,
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        nodes: state.cache.snapshot().await,
    })
}

pub async fn metrics(State(state): State<AppState>) -> String {
    let snapshot = state.cache.snapshot().await;
    let mut out = String::new();

    out.push_str("# HELP cardpool_card_core_avail Free GPU core percentage on this card.\n");
    out.push_str("# TYPE cardpool_card_core_avail gauge\n");
    for (node, cards) in &snapshot {
        for (index, card) in cards.iter().enumerate() {
            out.push_str(&format!(
                "cardpool_card_core_avail{{node=\"{node}\",card=\"{index}\"}} {}\n",
                card.core_avail
            ));
        }
    }

    out.push_str("# HELP cardpool_card_mem_avail_bytes Free GPU memory bytes on this card.\n");
    out.push_str("# TYPE cardpool_card_mem_avail_bytes gauge\n");
    for (node, cards) in &snapshot {
        for (index, card) in cards.iter().enumerate() {
            out.push_str(&format!(
                "cardpool_card_mem_avail_bytes{{node=\"{node}\",card=\"{index}\"}} {}\n",
                card.mem_avail
            ));
        }
    }

    out
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn livez() -> &'static str {
    "ok"
}

pub async fn readyz() -> &'static str {
    "ok"
}
