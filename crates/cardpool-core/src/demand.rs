use crate::quantities::{parse_gpu_core, parse_gpu_memory};
use crate::{gpu_core_resource_name, gpu_memory_resource_name};
use k8s_openapi::api::core::v1::Container;

/// GPU demand of a single container.
///
/// `core` is a percentage of one card's compute, `100` meaning a whole card
/// and multiples of `100` meaning several whole cards (see [`Demand::whole_count`]).
/// `mem` is bytes. Both are zero for a container that doesn't request a GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Demand {
    pub core: u32,
    pub mem: i64,
}

impl Demand {
    pub const NONE: Demand = Demand { core: 0, mem: 0 };

    /// Parse a container's GPU demand from its resource requests. Absent or
    /// zero-valued `cardpool.io/gpu-*` requests are `Demand::NONE`.
    pub fn from_container(container: &Container) -> crate::Result<Self> {
        let requests = container
            .resources
            .as_ref()
            .and_then(|r| r.requests.as_ref());

        let Some(requests) = requests else {
            return Ok(Demand::NONE);
        };

        let core = match requests.get(&gpu_core_resource_name()) {
            Some(q) => parse_gpu_core(&q.0)?,
            None => 0,
        };
        let mem = match requests.get(&gpu_memory_resource_name()) {
            Some(q) => parse_gpu_memory(&q.0)?,
            None => 0,
        };

        Ok(Demand { core, mem })
    }

    /// True for a container that requests no GPU resources at all.
    pub fn is_none(&self) -> bool {
        self.core == 0 && self.mem == 0
    }

    /// True when this demand reserves one or more entire cards.
    pub fn is_whole(&self) -> bool {
        self.core >= 100
    }

    /// Number of entire cards this demand reserves. Zero unless `is_whole()`.
    pub fn whole_count(&self) -> u32 {
        if self.is_whole() {
            self.core / 100
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ResourceRequirements;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use std::collections::BTreeMap;

    fn container_with(core: &str, mem: &str) -> Container {
        let mut requests = BTreeMap::new();
        requests.insert(gpu_core_resource_name(), Quantity(core.to_string()));
        requests.insert(gpu_memory_resource_name(), Quantity(mem.to_string()));
        Container {
            resources: Some(ResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn no_requests_is_none() {
        let c = Container::default();
        assert_eq!(Demand::from_container(&c).unwrap(), Demand::NONE);
    }

    #[test]
    fn shared_slice() {
        let c = container_with("50", "2Gi");
        let d = Demand::from_container(&c).unwrap();
        assert!(!d.is_none());
        assert!(!d.is_whole());
        assert_eq!(d.core, 50);
        assert_eq!(d.mem, 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn whole_cards() {
        let c = container_with("200", "16Gi");
        let d = Demand::from_container(&c).unwrap();
        assert!(d.is_whole());
        assert_eq!(d.whole_count(), 2);
    }
}
