//! ngm.toml configuration parser and live configuration handle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::error::{ConfigError, ConfigResult};

const DEFAULT_PROFILE_SECONDS: u64 = 10;
const DEFAULT_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_TIMEOUT_SECONDS: u64 = 120;
const DEFAULT_DATA_RETENTION_SECONDS: u64 = 3 * 24 * 60 * 60;

fn default_profile_seconds() -> u64 {
    DEFAULT_PROFILE_SECONDS
}

fn default_interval_seconds() -> u64 {
    DEFAULT_INTERVAL_SECONDS
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_data_retention_seconds() -> u64 {
    DEFAULT_DATA_RETENTION_SECONDS
}

fn default_scheme() -> String {
    "http".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NgmConfig {
    #[serde(default)]
    pub continuous_profiling: ContinuousProfilingConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// Scrape scheduling settings shared by every profiling target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuousProfilingConfig {
    #[serde(default)]
    pub enable: bool,
    /// Duration passed to CPU profiles as `seconds=<n>`.
    #[serde(default = "default_profile_seconds")]
    pub profile_seconds: u64,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// Upper bound for a single scrape cycle.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Consumed by profile storage, not by the scheduler.
    #[serde(default = "default_data_retention_seconds")]
    pub data_retention_seconds: u64,
}

impl Default for ContinuousProfilingConfig {
    fn default() -> Self {
        Self {
            enable: false,
            profile_seconds: DEFAULT_PROFILE_SECONDS,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            data_retention_seconds: DEFAULT_DATA_RETENTION_SECONDS,
        }
    }
}

impl ContinuousProfilingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn profile_duration(&self) -> Duration {
        Duration::from_secs(self.profile_seconds)
    }

    pub fn data_retention(&self) -> Duration {
        Duration::from_secs(self.data_retention_seconds)
    }

    /// Check the relationships between the durations.
    ///
    /// A profile must fit inside both the scrape interval and the scrape
    /// timeout, and retention must cover at least one interval.
    pub fn validate(&self) -> ConfigResult<()> {
        let valid = self.profile_seconds > 0
            && self.interval_seconds > 0
            && self.timeout_seconds > 0
            && self.profile_seconds <= self.interval_seconds
            && self.profile_seconds <= self.timeout_seconds
            && self.data_retention_seconds >= self.interval_seconds;
        if valid {
            return Ok(());
        }
        let rendered = serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"));
        Err(ConfigError::Invalid(rendered))
    }
}

/// One component instance to scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub component: String,
    /// Logical address used in the target identity.
    pub address: String,
    /// Physical address to connect to; defaults to `address`.
    #[serde(default)]
    pub scrape_address: Option<String>,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Extra headers sent with every request to this component.
    #[serde(default)]
    pub header: BTreeMap<String, String>,
}

impl TargetConfig {
    pub fn scrape_address(&self) -> &str {
        self.scrape_address.as_deref().unwrap_or(&self.address)
    }
}

/// How to request one profile kind from a component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilingPathConfig {
    pub path: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Appended as `seconds=<n>` when non-zero.
    #[serde(default)]
    pub seconds: u64,
    #[serde(default)]
    pub header: BTreeMap<String, String>,
}

impl NgmConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NgmConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.continuous_profiling.validate()?;
        for target in &self.targets {
            if target.component.is_empty() || target.address.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "target needs both component and address: {target:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Shared, observable continuous profiling configuration.
///
/// Components receive a handle at construction and read [`current`] at the
/// start of every cycle, so an update takes effect from the next cycle on.
///
/// [`current`]: ConfigHandle::current
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<ContinuousProfilingConfig>>,
}

impl ConfigHandle {
    pub fn new(config: ContinuousProfilingConfig) -> Self {
        let (tx, _rx) = watch::channel(config);
        Self { tx: Arc::new(tx) }
    }

    /// Snapshot of the configuration in force right now.
    pub fn current(&self) -> ContinuousProfilingConfig {
        self.tx.borrow().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.borrow().enable
    }

    /// Replace the configuration. Invalid configurations are rejected and
    /// the previous one stays in force.
    pub fn update(&self, config: ContinuousProfilingConfig) -> ConfigResult<()> {
        config.validate()?;
        let previous = self.tx.send_replace(config.clone());
        if previous != config {
            info!(
                enable = config.enable,
                interval_seconds = config.interval_seconds,
                timeout_seconds = config.timeout_seconds,
                profile_seconds = config.profile_seconds,
                "continuous profiling config updated"
            );
        }
        Ok(())
    }

    /// Modify a copy of the current configuration and publish it.
    pub fn update_with(
        &self,
        f: impl FnOnce(&mut ContinuousProfilingConfig),
    ) -> ConfigResult<()> {
        let mut config = self.current();
        f(&mut config);
        self.update(config)
    }

    pub fn subscribe(&self) -> watch::Receiver<ContinuousProfilingConfig> {
        self.tx.subscribe()
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(ContinuousProfilingConfig::default())
    }
}
