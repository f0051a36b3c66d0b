//! Load-aware policy configuration: which metrics to sync, how often, and
//! the weight each carries in scoring. Parsed from the `--policyConfigPath`
//! YAML file; see [`crate::rater::LoadAwareRater`] for where it's consumed.

use crate::error::AllocatorError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Policy {
    pub spec: PolicySpec,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PolicySpec {
    #[serde(default, rename = "syncPeriod")]
    pub sync_period: Vec<SyncPeriodEntry>,
    #[serde(default)]
    pub priority: Vec<PriorityEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncPeriodEntry {
    pub name: String,
    pub period: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PriorityEntry {
    pub name: String,
    pub weight: f64,
}

impl Policy {
    pub fn from_yaml_str(s: &str) -> crate::Result<Self> {
        serde_yaml::from_str(s)
            .map_err(|e| AllocatorError::invalid_policy(format!("parsing policy YAML: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AllocatorError::invalid_policy(format!(
                "reading policy file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_yaml_str(&raw)
    }

    /// `(metric name, weight)` pairs, in file order.
    pub fn weights(&self) -> Vec<(String, f64)> {
        self.spec
            .priority
            .iter()
            .map(|p| (p.name.clone(), p.weight))
            .collect()
    }
}

impl SyncPeriodEntry {
    /// Parse `period` (e.g. `"15s"`, `"2m"`) into a [`Duration`]. Supports
    /// the same `s`/`m`/`h` suffixes as the rest of the duration-ish
    /// configuration surface; a bare integer is seconds.
    pub fn duration(&self) -> crate::Result<Duration> {
        parse_duration(&self.period)
            .ok_or_else(|| AllocatorError::invalid_policy(format!(
                "syncPeriod entry {:?} has unparseable period {:?}",
                self.name, self.period
            )))
    }
}

fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(n) = s.strip_suffix('h') {
        return n.trim().parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600));
    }
    if let Some(n) = s.strip_suffix('m') {
        return n.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60));
    }
    if let Some(n) = s.strip_suffix('s') {
        return n.trim().parse::<u64>().ok().map(Duration::from_secs);
    }
    s.parse::<u64>().ok().map(Duration::from_secs)
}
