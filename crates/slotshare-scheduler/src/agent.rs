//! Declared agent roles.
//!
//! Each declaration is validated once and its target patterns compiled into
//! anchored regular expressions. A secondary index maps build ids to the
//! agent names of that build so rollouts can look up their agents without a
//! scan.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use tracing::{info, warn};

use slotshare_core::{owning_partition, AgentRoleInfo, AgentRoleName};

use crate::error::{SchedulerError, SchedulerResult};

/// One declared agent role with its compiled matching rules.
#[derive(Debug, Clone)]
pub struct AgentEntry {
    pub name: String,
    pub info: AgentRoleInfo,
    /// Parsed name coordinates, when the name follows the agent naming scheme.
    pub identity: Option<AgentRoleName>,
    patterns: Vec<Regex>,
}

impl AgentEntry {
    /// Whether any target pattern matches `role_name` in full.
    pub fn matches(&self, role_name: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(role_name))
    }

    /// Whether this agent may serve `role_name`.
    ///
    /// Dynamically mapped agents additionally require their partition to own
    /// the role's position in the hash space.
    pub fn claims(&self, role_name: &str) -> bool {
        if !self.matches(role_name) {
            return false;
        }
        if !self.info.dynamic_mapping {
            return true;
        }
        self.identity
            .as_ref()
            .is_some_and(|id| owning_partition(role_name, id.partition_count) == id.index)
    }

    pub fn is_dynamic(&self) -> bool {
        self.info.dynamic_mapping
    }

    pub fn blacklist_timeout_secs(&self) -> u64 {
        self.info.blacklist_timeout_secs
    }
}

/// Registry of declared agent roles, keyed by name.
#[derive(Debug)]
pub struct AgentRegistry {
    app: String,
    agents: BTreeMap<String, AgentEntry>,
    by_build_id: BTreeMap<String, BTreeSet<String>>,
}

impl AgentRegistry {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            agents: BTreeMap::new(),
            by_build_id: BTreeMap::new(),
        }
    }

    /// Validate and insert (or replace) an agent declaration.
    pub fn declare(&mut self, name: &str, info: AgentRoleInfo) -> SchedulerResult<()> {
        let entry = self.compile(name, info).inspect_err(|e| {
            warn!(agent = %name, error = %e, "agent role declaration rejected");
        })?;

        self.unindex(name);
        if let Some(id) = &entry.identity {
            self.by_build_id
                .entry(id.build_id.clone())
                .or_default()
                .insert(name.to_string());
        }
        info!(
            agent = %name,
            patterns = entry.patterns.len(),
            dynamic = entry.info.dynamic_mapping,
            "agent role declared"
        );
        self.agents.insert(name.to_string(), entry);
        Ok(())
    }

    /// Remove a declaration. Returns true if it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let removed = self.agents.remove(name).is_some();
        if removed {
            self.unindex(name);
            info!(agent = %name, "agent role removed");
        }
        removed
    }

    /// Drop every agent whose build id is not in `in_use`. Agents whose name
    /// does not parse are dropped as well. Returns the removed names.
    pub fn retain_build_ids(&mut self, in_use: &BTreeSet<String>) -> Vec<String> {
        let doomed: Vec<String> = self
            .agents
            .values()
            .filter(|entry| {
                entry
                    .identity
                    .as_ref()
                    .is_none_or(|id| !in_use.contains(&id.build_id))
            })
            .map(|entry| entry.name.clone())
            .collect();
        for name in &doomed {
            self.remove(name);
        }
        doomed
    }

    pub fn get(&self, name: &str) -> Option<&AgentEntry> {
        self.agents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentEntry> {
        self.agents.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn names_by_build_id(&self, build_id: &str) -> Vec<String> {
        self.by_build_id
            .get(build_id)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn compile(&self, name: &str, info: AgentRoleInfo) -> SchedulerResult<AgentEntry> {
        if info.launch_plan.is_empty() {
            return Err(SchedulerError::EmptyAgentInfo(name.to_string()));
        }
        if !info.launch_plan.has_heartbeat_mode() {
            return Err(SchedulerError::MissingHeartbeatMode(name.to_string()));
        }

        let identity = AgentRoleName::parse(&self.app, name).ok();
        if info.dynamic_mapping && identity.is_none() {
            return Err(SchedulerError::InvalidAgentName {
                name: name.to_string(),
                reason: "dynamic mapping needs a partitioned agent role name".to_string(),
            });
        }

        let patterns = info
            .target_roles
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
                    SchedulerError::InvalidTargetPattern {
                        agent: name.to_string(),
                        pattern: pattern.clone(),
                        source,
                    }
                })
            })
            .collect::<SchedulerResult<Vec<_>>>()?;

        Ok(AgentEntry {
            name: name.to_string(),
            info,
            identity,
            patterns,
        })
    }

    fn unindex(&mut self, name: &str) {
        self.by_build_id.retain(|_, names| {
            names.remove(name);
            !names.is_empty()
        });
    }
}
