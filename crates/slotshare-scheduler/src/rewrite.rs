//! Plan rewriting.
//!
//! Roles claimed by an agent are folded into that agent's target status and
//! dropped from the plan the cluster scheduler sees; every agent's own launch
//! plan is added in their place.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use slotshare_cluster::{AgentTarget, AgentTargetStatus};
use slotshare_core::AppPlan;

use crate::agent::{AgentEntry, AgentRegistry};
use crate::blacklist::Blacklist;

/// Target role → the agent role that claims it.
pub type TargetRoleMap = BTreeMap<String, String>;

/// Assign each plan role to the first agent, in name order, that claims it.
///
/// Agent roles themselves are never targets.
pub fn build_target_map(plan: &AppPlan, agents: &AgentRegistry) -> TargetRoleMap {
    plan.roles
        .keys()
        .filter(|role| !agents.contains(role))
        .filter_map(|role| {
            agents
                .iter()
                .find(|agent| agent.claims(role))
                .map(|agent| (role.clone(), agent.name.clone()))
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct RewriteOutcome {
    /// Plan to forward to the cluster scheduler.
    pub plan: AppPlan,
    /// Agent → targets it now serves.
    pub assignments: BTreeMap<String, Vec<AgentTarget>>,
}

impl RewriteOutcome {
    pub fn multiplexed_roles(&self) -> usize {
        self.assignments.values().map(Vec::len).sum()
    }
}

/// Rewrite `plan` against the declared agents.
///
/// A role stays in the plan unless it maps to an agent, is not blacklisted
/// for that agent, and ships exactly the agent's packages.
pub fn rewrite_plan(
    plan: &AppPlan,
    agents: &AgentRegistry,
    target_map: &TargetRoleMap,
    blacklist: &Blacklist,
) -> RewriteOutcome {
    let mut outcome = RewriteOutcome::default();

    for (role, launch_plan) in &plan.roles {
        let agent = target_map
            .get(role)
            .and_then(|name| agents.get(name))
            .filter(|agent| !blacklist.contains(role, &agent.name));
        let Some(agent) = agent else {
            outcome.plan.roles.insert(role.clone(), launch_plan.clone());
            continue;
        };

        if !launch_plan.packages_match(&agent.info.launch_plan) {
            debug!(target = %role, agent = %agent.name, "package mismatch, role kept");
            outcome.plan.roles.insert(role.clone(), launch_plan.clone());
            continue;
        }

        let process_info = match serde_json::to_string(&launch_plan.processes) {
            Ok(json) => json,
            Err(e) => {
                warn!(target = %role, error = %e, "cannot encode process info, role kept");
                outcome.plan.roles.insert(role.clone(), launch_plan.clone());
                continue;
            }
        };
        outcome
            .assignments
            .entry(agent.name.clone())
            .or_default()
            .push(AgentTarget {
                role_name: role.clone(),
                process_info,
                config_path: agent.info.target_config_paths.get(role).cloned(),
            });
    }

    for agent in agents.iter() {
        outcome
            .plan
            .roles
            .entry(agent.name.clone())
            .or_insert_with(|| agent.info.launch_plan.clone());
    }
    outcome
}

/// Desired worker state of `agent` given the targets it was assigned.
pub fn target_status(agent: &AgentEntry, targets: &[AgentTarget]) -> AgentTargetStatus {
    AgentTargetStatus {
        config_path: agent.info.config_path.clone(),
        global_agent: agent.info.global_agent,
        global_config: agent.info.global_config.clone(),
        targets: targets.to_vec(),
    }
}
