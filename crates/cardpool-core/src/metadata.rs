//! The pod annotation/label contract that carries allocator state across
//! filter -> bind -> reconcile, as durable metadata on the pod itself.

use crate::error::CoreError;
use crate::{Pod, RESOURCE_DOMAIN};

/// `cardpool.io/assumed` — set once the allocator has reserved resources.
pub fn assumed_key() -> String {
    format!("{RESOURCE_DOMAIN}/assumed")
}

/// `cardpool.io/container-<name>` — card indices assigned to one container.
pub fn container_key(container_name: &str) -> String {
    format!("{RESOURCE_DOMAIN}/container-{container_name}")
}

/// True if the pod is marked as assumed (allocator has reserved resources
/// for it, whether or not binding has completed).
pub fn is_assumed(pod: &Pod) -> bool {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(&assumed_key()))
        .map(|v| v == "true")
        .unwrap_or(false)
}

/// Mark a pod as assumed in both its annotations and labels.
pub fn mark_assumed(pod: &mut Pod) {
    let key = assumed_key();
    pod.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(key.clone(), "true".to_string());
    pod.metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(key, "true".to_string());
}

/// Record the card indices assigned to `container_name`.
pub fn write_assignment(pod: &mut Pod, container_name: &str, indices: &[usize]) {
    let value = indices
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",");
    pod.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(container_key(container_name), value);
}

/// Read back the card indices assigned to `container_name`. Returns an empty
/// vec if the container has no GPU demand (and thus no annotation). A
/// present-but-unparseable annotation is reported rather than panicking —
/// malformed metadata is an external-input error, not a programmer bug.
pub fn read_assignment(pod: &Pod, container_name: &str) -> crate::Result<Vec<usize>> {
    let key = container_key(container_name);
    let Some(raw) = pod.metadata.annotations.as_ref().and_then(|a| a.get(&key)) else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| CoreError::malformed_metadata(key.clone(), raw.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assumed_roundtrip() {
        let mut pod = Pod::default();
        assert!(!is_assumed(&pod));
        mark_assumed(&mut pod);
        assert!(is_assumed(&pod));
    }

    #[test]
    fn assignment_roundtrip() {
        let mut pod = Pod::default();
        write_assignment(&mut pod, "trainer", &[0, 1, 3]);
        assert_eq!(read_assignment(&pod, "trainer").unwrap(), vec![0, 1, 3]);
    }

    #[test]
    fn missing_assignment_is_empty() {
        let pod = Pod::default();
        assert_eq!(read_assignment(&pod, "trainer").unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn malformed_assignment_is_rejected_not_panicked() {
        let mut pod = Pod::default();
        pod.metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(container_key("trainer"), "0,bogus,2".to_string());
        assert!(read_assignment(&pod, "trainer").is_err());
    }
}
