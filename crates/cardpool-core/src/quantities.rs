use crate::error::CoreError;

/// Parse a `cardpool.io/gpu-core` quantity: a bare non-negative integer
/// percentage, `100` per whole card (e.g. `"50"`, `"200"`).
pub fn parse_gpu_core(s: &str) -> crate::Result<u32> {
    s.trim()
        .parse::<u32>()
        .map_err(|_| CoreError::invalid_quantity("cardpool.io/gpu-core", s))
}

/// Parse a `cardpool.io/gpu-memory` quantity, accepting the k8s binary
/// suffixes (`Ki`, `Mi`, `Gi`) or a bare byte count.
pub fn parse_gpu_memory(s: &str) -> crate::Result<i64> {
    let invalid = || CoreError::invalid_quantity("cardpool.io/gpu-memory", s);

    if let Some(num) = s.strip_suffix("Ki") {
        num.parse::<i64>().map(|n| n * 1024).map_err(|_| invalid())
    } else if let Some(num) = s.strip_suffix("Mi") {
        num.parse::<i64>()
            .map(|n| n * 1024 * 1024)
            .map_err(|_| invalid())
    } else if let Some(num) = s.strip_suffix("Gi") {
        num.parse::<i64>()
            .map(|n| n * 1024 * 1024 * 1024)
            .map_err(|_| invalid())
    } else {
        s.parse::<i64>().map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_parses_bare_integer() {
        assert_eq!(parse_gpu_core("50").unwrap(), 50);
        assert_eq!(parse_gpu_core("200").unwrap(), 200);
        assert!(parse_gpu_core("0.5").is_err());
    }

    #[test]
    fn memory_parses_binary_suffixes() {
        assert_eq!(parse_gpu_memory("1024").unwrap(), 1024);
        assert_eq!(parse_gpu_memory("1Ki").unwrap(), 1024);
        assert_eq!(parse_gpu_memory("16Gi").unwrap(), 16 * 1024 * 1024 * 1024);
        assert!(parse_gpu_memory("16GB").is_err());
    }
}
