use crate::demand::Demand;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Short, process-local key for a demand vector, used to memoize placement
/// plans across filter -> score -> bind for the same pod shape. It is never
/// authoritative and is not meant to be stable across process restarts.
pub fn fingerprint(demands: &[Demand]) -> String {
    let mut hasher = DefaultHasher::new();
    demands.len().hash(&mut hasher);
    for d in demands {
        d.hash(&mut hasher);
    }
    format!("{:08x}", (hasher.finish() & 0xffff_ffff) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_for_identical_vectors() {
        let a = vec![Demand { core: 50, mem: 100 }, Demand { core: 0, mem: 0 }];
        let b = vec![Demand { core: 50, mem: 100 }, Demand { core: 0, mem: 0 }];
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn differs_for_different_shapes() {
        let a = vec![Demand { core: 50, mem: 100 }];
        let b = vec![Demand { core: 60, mem: 100 }];
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn is_eight_hex_chars() {
        let a = vec![Demand::NONE];
        assert_eq!(fingerprint(&a).len(), 8);
    }
}
