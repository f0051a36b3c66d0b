//! Ordinary node-selector / taint-toleration filtering, ahead of the GPU
//! allocator's own feasibility check. Spec's Non-goals only exclude
//! GPU-specific isolation/preemption, so a scheduler extender's `filter`
//! still has to honor these like any other extender would.

use cardpool_core::{Node, Pod};

/// Why a node failed the node-selector or taint-toleration predicate,
/// ahead of ever consulting the GPU allocator.
pub fn check_node_selector(pod: &Pod, node: &Node) -> Result<(), String> {
    let Some(spec) = &pod.spec else {
        return Ok(());
    };
    let Some(selector) = &spec.node_selector else {
        return Ok(());
    };

    let node_labels = node.metadata.labels.as_ref();
    for (key, value) in selector {
        let node_value = node_labels.and_then(|labels| labels.get(key));
        if node_value != Some(value) {
            return Err(format!("node selector mismatch: {key}={value}"));
        }
    }
    Ok(())
}

pub fn check_taints(pod: &Pod, node: &Node) -> Result<(), String> {
    let Some(taints) = node.spec.as_ref().and_then(|s| s.taints.as_ref()) else {
        return Ok(());
    };
    if taints.is_empty() {
        return Ok(());
    }

    let tolerations = pod
        .spec
        .as_ref()
        .and_then(|s| s.tolerations.as_ref());

    let Some(tolerations) = tolerations else {
        return Err("node has taints but pod has no tolerations".to_string());
    };

    for taint in taints {
        let tolerated = tolerations.iter().any(|t| {
            t.key.as_ref() == Some(&taint.key)
                && (t.effect.is_none() || t.effect.as_ref() == Some(&taint.effect))
        });
        if !tolerated {
            return Err(format!(
                "pod does not tolerate taint: {}={}",
                taint.key, taint.effect
            ));
        }
    }
    Ok(())
}

/// Run both ordinary predicates; the first failure short-circuits.
pub fn check(pod: &Pod, node: &Node) -> Result<(), String> {
    check_node_selector(pod, node)?;
    check_taints(pod, node)
}
