//! slotshare.toml configuration parser.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::LaunchPlan;

/// Default blacklist cooldown for an agent role.
pub const DEFAULT_BLACKLIST_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub daemon: DaemonSection,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub agents: Vec<AgentRoleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSection {
    /// Application the agent roles belong to.
    pub app: String,
    pub data_dir: PathBuf,
    pub port: u16,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            app: "default".to_string(),
            data_dir: PathBuf::from("/var/lib/slotshare"),
            port: 8470,
        }
    }
}

/// Timing of the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tick of the reconciliation loop.
    pub loop_interval_secs: u64,
    /// Minimum spacing between two full slot syncs.
    pub full_sync_interval_secs: u64,
    /// Spacing between two passes over persisted agent-node entries.
    pub gc_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            loop_interval_secs: 1,
            full_sync_interval_secs: 10,
            gc_interval_secs: 300,
        }
    }
}

impl SchedulerConfig {
    pub fn loop_interval(&self) -> Duration {
        Duration::from_secs(self.loop_interval_secs.max(1))
    }
}

/// Settings for the in-process cluster scheduler used in standalone mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Hosts slots are handed out on, round-robin.
    pub hosts: Vec<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1".to_string()],
        }
    }
}

/// Declaration of one agent role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRoleConfig {
    pub name: String,
    #[serde(flatten)]
    pub info: AgentRoleInfo,
}

/// Configuration of a shareable agent role.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentRoleInfo {
    pub launch_plan: LaunchPlan,
    /// Anchored regular expressions over target-role names.
    #[serde(default)]
    pub target_roles: Vec<String>,
    /// Fixed config path pushed to the worker.
    #[serde(default)]
    pub config_path: Option<String>,
    /// The worker serves every target with a single shared config.
    #[serde(default)]
    pub global_agent: bool,
    #[serde(default)]
    pub global_config: BTreeMap<String, String>,
    /// Per-target config path overrides.
    #[serde(default)]
    pub target_config_paths: BTreeMap<String, String>,
    /// Map targets through the hash range of the agent's partition.
    #[serde(default)]
    pub dynamic_mapping: bool,
    #[serde(default = "default_blacklist_timeout")]
    pub blacklist_timeout_secs: u64,
}

fn default_blacklist_timeout() -> u64 {
    DEFAULT_BLACKLIST_TIMEOUT_SECS
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal() {
        let config = DaemonConfig::from_toml("").unwrap();
        assert_eq!(config.daemon.app, "default");
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert!(config.agents.is_empty());
    }

    #[test]
    fn parse_agents() {
        let toml_str = r#"
[daemon]
app = "search"
data_dir = "/tmp/slotshare"
port = 9000

[scheduler]
loop_interval_secs = 2
full_sync_interval_secs = 20
gc_interval_secs = 60

[[agents]]
name = "search.agent.b1.online.1.0"
target_roles = ["searcher\\..*"]
dynamic_mapping = true

[agents.launch_plan]
packages = [{ uri = "hdfs://pkg/searcher" }]

[[agents.launch_plan.processes]]
name = "agent"
cmd = "/bin/agent"
args = [["heartbeat_mode", "agent"]]
"#;
        let config = DaemonConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.daemon.port, 9000);
        assert_eq!(config.scheduler.full_sync_interval_secs, 20);

        let agent = &config.agents[0];
        assert_eq!(agent.name, "search.agent.b1.online.1.0");
        assert!(agent.info.dynamic_mapping);
        assert_eq!(agent.info.blacklist_timeout_secs, DEFAULT_BLACKLIST_TIMEOUT_SECS);
        assert!(agent.info.launch_plan.has_heartbeat_mode());
    }

    #[test]
    fn loop_interval_never_zero() {
        let config = SchedulerConfig {
            loop_interval_secs: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.loop_interval(), Duration::from_secs(1));
    }
}
