//! Node allocator (C3): owns one node's card vector and plan cache, and is
//! the only thing that ever mutates card availability.

use crate::error::AllocatorError;
use crate::rater::Rater;
use crate::search::{self, Plan};
use cardpool_core::{metadata, Card, Demand, Pod};
use std::collections::{HashMap, HashSet};

/// Score returned by [`NodeAllocator::score`] when no plan exists.
pub const SCORE_MIN: i64 = i64::MIN;

fn pod_uid(pod: &Pod) -> crate::Result<String> {
    pod.metadata
        .uid
        .clone()
        .ok_or_else(|| AllocatorError::invariant_violation("pod has no uid"))
}

fn pod_demands(pod: &Pod) -> crate::Result<Vec<(String, Demand)>> {
    let containers = pod
        .spec
        .as_ref()
        .map(|s| s.containers.as_slice())
        .unwrap_or(&[]);
    containers
        .iter()
        .map(|c| Ok((c.name.clone(), Demand::from_container(c)?)))
        .collect()
}

fn fingerprint_of(demands: &[(String, Demand)]) -> String {
    let just_demands: Vec<Demand> = demands.iter().map(|(_, d)| *d).collect();
    cardpool_core::fingerprint(&just_demands)
}

/// One node's GPU cards, the rater used to score candidate plans for it, and
/// a small cache of plans keyed by demand fingerprint.
pub struct NodeAllocator {
    name: String,
    cards: Vec<Card>,
    rater: Box<dyn Rater>,
    plans: HashMap<String, Plan>,
    pods: HashSet<String>,
}

impl NodeAllocator {
    pub fn new(name: impl Into<String>, card_count: usize, mem_total_per_card: i64, rater: Box<dyn Rater>) -> Self {
        let cards = (0..card_count)
            .map(|i| Card::new(i, mem_total_per_card))
            .collect();
        Self {
            name: name.into(),
            cards,
            rater,
            plans: HashMap::new(),
            pods: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn known(&self, uid: &str) -> bool {
        self.pods.contains(uid)
    }

    /// Compute (or reuse) a Plan for `pod` and cache it. Does not mutate the
    /// card vector. Returns `Ok(false)` on infeasibility rather than an
    /// error — infeasibility is a normal filter outcome, not a failure.
    pub fn assume(&mut self, pod: &Pod) -> crate::Result<bool> {
        let demands = pod_demands(pod)?;
        let fp = fingerprint_of(&demands);
        if self.plans.contains_key(&fp) {
            return Ok(true);
        }
        let just_demands: Vec<Demand> = demands.iter().map(|(_, d)| *d).collect();
        let mut working = self.cards.clone();
        match search::search(&mut working, &just_demands, self.rater.as_ref()) {
            Some(plan) => {
                self.plans.insert(fp, plan);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Return the cached plan's score, computing it first if necessary.
    /// [`SCORE_MIN`] if no plan exists for this pod's demand shape.
    pub fn score(&mut self, pod: &Pod) -> crate::Result<i64> {
        if self.assume(pod)? {
            let demands = pod_demands(pod)?;
            let fp = fingerprint_of(&demands);
            Ok(self.plans.get(&fp).map(|p| p.score).unwrap_or(SCORE_MIN))
        } else {
            Ok(SCORE_MIN)
        }
    }

    /// Apply the cached plan to the card vector, flush the plan cache
    /// (availability has changed, so every other cached plan may now be
    /// stale), and register the pod. Requires a prior successful `assume`
    /// for the same demand shape.
    pub fn commit(&mut self, pod: &Pod) -> crate::Result<Vec<Vec<usize>>> {
        let uid = pod_uid(pod)?;
        let demands = pod_demands(pod)?;
        let fp = fingerprint_of(&demands);
        let plan = self
            .plans
            .get(&fp)
            .cloned()
            .ok_or_else(|| AllocatorError::no_cached_plan(uid.clone(), self.name.clone()))?;

        for (container_demand, indices) in demands.iter().map(|(_, d)| d).zip(plan.assigned.iter()) {
            for &idx in indices {
                self.cards[idx].apply(container_demand);
            }
        }

        self.plans.clear();
        self.pods.insert(uid);
        Ok(plan.assigned)
    }

    /// Revert the card vector using the assignment recorded on the pod's
    /// own annotations (not the plan cache, which may be stale or absent —
    /// e.g. after a process restart), and drop the pod from this allocator.
    pub fn forget(&mut self, pod: &Pod) -> crate::Result<()> {
        let uid = pod_uid(pod)?;
        self.apply_from_annotations(pod, Direction::Revert)?;
        self.plans.clear();
        self.pods.remove(&uid);
        Ok(())
    }

    /// Reconstruct a plan from a pod's existing annotations and apply it.
    /// Used at startup and for pods bound outside this process.
    pub fn add(&mut self, pod: &Pod) -> crate::Result<()> {
        let uid = pod_uid(pod)?;
        self.apply_from_annotations(pod, Direction::Apply)?;
        self.pods.insert(uid);
        Ok(())
    }

    fn apply_from_annotations(&mut self, pod: &Pod, dir: Direction) -> crate::Result<()> {
        let demands = pod_demands(pod)?;
        for (container_name, demand) in &demands {
            if demand.is_none() {
                continue;
            }
            let indices = metadata::read_assignment(pod, container_name)?;
            for idx in indices {
                if idx >= self.cards.len() {
                    return Err(AllocatorError::invariant_violation(format!(
                        "card index {idx} out of range for node {} ({} cards)",
                        self.name,
                        self.cards.len()
                    )));
                }
                match dir {
                    Direction::Apply => self.cards[idx].apply(demand),
                    Direction::Revert => self.cards[idx].revert(demand),
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Apply,
    Revert,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rater::Binpack;
    use k8s_openapi::api::core::v1::{Container, PodSpec, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn pod_with(uid: &str, container_name: &str, core: &str, mem: &str) -> Pod {
        let mut requests = BTreeMap::new();
        requests.insert(
            cardpool_core::gpu_core_resource_name(),
            Quantity(core.to_string()),
        );
        requests.insert(
            cardpool_core::gpu_memory_resource_name(),
            Quantity(mem.to_string()),
        );
        Pod {
            metadata: ObjectMeta {
                uid: Some(uid.to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: container_name.to_string(),
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
    fn assume_then_commit_mutates_card_vector() {
        let mut a = NodeAllocator::new("n0", 2, 16 * 1024, Box::new(Binpack));
        let pod = pod_with("u1", "trainer", "50", "2048");
        assert!(a.assume(&pod).unwrap());
        let assigned = a.commit(&pod).unwrap();
        assert_eq!(assigned, vec![vec![0]]);
        assert_eq!(a.cards()[0].core_avail, 50);
        assert!(a.known("u1"));
    }

    #[test]
    fn commit_without_assume_is_an_error() {
        let mut a = NodeAllocator::new("n0", 2, 16 * 1024, Box::new(Binpack));
        let pod = pod_with("u1", "trainer", "50", "2048");
        assert!(a.commit(&pod).is_err());
    }

    #[test]
    fn score_is_min_on_infeasible_demand() {
        let mut a = NodeAllocator::new("n0", 1, 1024, Box::new(Binpack));
        let pod = pod_with("u1", "trainer", "300", "0");
        assert_eq!(a.score(&pod).unwrap(), SCORE_MIN);
    }

    #[test]
    fn commit_flushes_the_plan_cache() {
        let mut a = NodeAllocator::new("n0", 2, 16 * 1024, Box::new(Binpack));
        let pod = pod_with("u1", "trainer", "50", "2048");
        a.assume(&pod).unwrap();
        a.commit(&pod).unwrap();
        assert!(a.plans.is_empty());
    }

    #[test]
    fn add_then_forget_restores_card_vector() {
        let mut a = NodeAllocator::new("n0", 2, 16 * 1024, Box::new(Binpack));
        let mut pod = pod_with("u1", "trainer", "50", "2048");
        cardpool_core::metadata::write_assignment(&mut pod, "trainer", &[0]);
        let before = a.cards().to_vec();
        a.add(&pod).unwrap();
        assert_ne!(a.cards(), before.as_slice());
        a.forget(&pod).unwrap();
        assert_eq!(a.cards(), before.as_slice());
        assert!(!a.known("u1"));
    }
}
