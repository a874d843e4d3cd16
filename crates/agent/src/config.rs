//! Agent configuration

use anyhow::{Context, Result};
use monitor_lib::MonitorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "MONITOR_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "monitor-agent.toml";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node identity stamped on every snapshot and system alert
    #[serde(default = "default_node_id")]
    pub node_id: String,

    #[serde(default = "default_node_type")]
    pub node_type: String,

    /// API server port for health, metrics and lifecycle calls
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Root of the cgroup v2 hierarchy holding one cgroup per instance
    #[serde(default = "default_cgroup_root")]
    pub cgroup_root: PathBuf,

    #[serde(default)]
    pub monitor: MonitorConfig,
}

fn default_node_id() -> String {
    std::env::var("NODE_ID").unwrap_or_else(|_| "unknown".to_string())
}

fn default_node_type() -> String {
    "main".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_cgroup_root() -> PathBuf {
    PathBuf::from(monitor_lib::monitor::DEFAULT_CGROUP_ROOT)
}

impl AgentConfig {
    /// Load configuration from the file named by `MONITOR_CONFIG` and the
    /// environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    /// Load configuration from an optional file plus `AGENT_*` variables.
    ///
    /// Nested keys use `__`, e.g. `AGENT_MONITOR__POLL_PERIOD_MS`.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("AGENT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read agent configuration")?;

        let agent: AgentConfig = config
            .try_deserialize()
            .context("Invalid agent configuration")?;
        agent.monitor.validate()?;

        Ok(agent)
    }
}
