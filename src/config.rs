use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Connection settings for one named target.
///
/// `params` stays an opaque TOML table; each engine adapter knows which keys
/// it needs (DSN, file path, host/port, ...). Secret resolution happens
/// outside the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub engine: String,
    #[serde(default)]
    pub params: toml::value::Table,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
}

/// Tunable limits for the cache, scheduler, and result store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Per-response cap on items returned for a single edge; 0 disables
    /// truncation.
    #[serde(default = "default_edge_items")]
    pub edge_items: usize,
    #[serde(default = "default_max_nodes_per_request")]
    pub max_nodes_per_request: usize,
    /// Row cap used when a query supplies none.
    #[serde(default = "default_max_rows")]
    pub default_max_rows: usize,
    /// Hard ceiling no query may exceed.
    #[serde(default = "default_hard_max_rows")]
    pub hard_max_rows: usize,
    /// Cumulative row budget across all stored results.
    #[serde(default = "default_result_row_budget")]
    pub result_row_budget: usize,
    /// Results younger than this are never evicted, budget or not.
    #[serde(default = "default_result_min_age_secs")]
    pub result_min_age_secs: u64,
}

fn default_edge_items() -> usize {
    500
}

fn default_max_nodes_per_request() -> usize {
    100
}

fn default_max_rows() -> usize {
    200
}

fn default_hard_max_rows() -> usize {
    1000
}

fn default_result_row_budget() -> usize {
    1000
}

fn default_result_min_age_secs() -> u64 {
    600
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            edge_items: default_edge_items(),
            max_nodes_per_request: default_max_nodes_per_request(),
            default_max_rows: default_max_rows(),
            hard_max_rows: default_hard_max_rows(),
            result_row_budget: default_result_row_budget(),
            result_min_age_secs: default_result_min_age_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub targets: HashMap<String, TargetConfig>,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: DaemonConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        debug!(
            "Loaded config from {} ({} targets)",
            path.display(),
            config.targets.len()
        );
        Ok(config)
    }

    /// Load from the user config directory; a missing file yields defaults.
    pub fn load_default() -> Result<Self> {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(Self::default());
        };
        let path = config_dir.join("dbnav").join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.get(name)
    }
}
