//! fleet.toml configuration.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use fleet_placement::{LoadWeights, PolicyKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub version: String,
    /// Default image for new containers (`registry/name:tag`).
    pub image: Option<String>,
    /// Default options passed to the runtime for new containers.
    pub options: Option<HashMap<String, String>>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub kill: KillConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub policy: PolicyKind,
    #[serde(default)]
    pub weights: LoadWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub interval_secs: u64,
    /// Upper bound on each provider or runtime probe.
    pub probe_timeout_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            probe_timeout_ms: 2_000,
        }
    }
}

impl ReconcileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KillConfig {
    /// Grace period used when the caller does not pick one.
    pub grace_period_ms: u64,
    /// How long a forced removal may take before the kill is abandoned.
    pub force_timeout_ms: u64,
}

impl Default for KillConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 10_000,
            force_timeout_ms: 5_000,
        }
    }
}

impl KillConfig {
    pub fn force_timeout(&self) -> Duration {
        Duration::from_millis(self.force_timeout_ms)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            version: "0.0.0".to_string(),
            image: None,
            options: None,
            scheduler: SchedulerConfig::default(),
            reconcile: ReconcileConfig::default(),
            kill: KillConfig::default(),
        }
    }
}

impl ClusterConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClusterConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.reconcile.interval_secs == 0 {
            bail!("reconcile.interval_secs must be at least 1");
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
