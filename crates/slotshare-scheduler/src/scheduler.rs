//! Agent-sharing scheduler.
//!
//! Sits between the plan builder and the cluster scheduler. Incoming plans
//! are rewritten so that roles an agent can serve ride on the agent's slots
//! instead of getting their own; slot queries for those roles are answered
//! from the agent's slots. All mutable state lives in one
//! [`SchedulerState`] behind a single mutex and every public operation holds
//! it for its whole duration.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use slotshare_cluster::{AgentCurrentStatus, ClusterScheduler, NodeRegistry};
use slotshare_core::{
    slots_identifier, AgentRoleInfo, AppPlan, ReleasePreference, ResourceTotals, RoleSlots,
    SchedulerConfig, SlotId, SlotInfo,
};
use slotshare_state::StateStore;

use crate::agent::{AgentEntry, AgentRegistry};
use crate::blacklist::{Blacklist, BlacklistEntry};
use crate::error::SchedulerResult;
use crate::rewrite::{build_target_map, rewrite_plan, target_status, TargetRoleMap};
use crate::slots::{relabel, AgentSlotState};
use crate::stats::SchedulerStats;

/// Source of the current time in unix seconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

#[derive(Debug)]
pub(crate) struct SchedulerState {
    pub(crate) agents: AgentRegistry,
    pub(crate) target_map: TargetRoleMap,
    /// Agent → target roles it serves since the last rewrite.
    pub(crate) assignments: BTreeMap<String, Vec<String>>,
    pub(crate) blacklist: Blacklist,
    /// Agent → slots observed by the last full sync.
    pub(crate) slot_states: BTreeMap<String, AgentSlotState>,
    pub(crate) resource_totals: ResourceTotals,
    pub(crate) reclaiming_agents: usize,
    pub(crate) last_full_sync: Option<u64>,
    pub(crate) last_gc: Option<u64>,
    /// Blacklist version last written to the store.
    pub(crate) persisted_version: u64,
    pub(crate) persisted_bytes: usize,
}

impl SchedulerState {
    fn new(app: &str) -> Self {
        Self {
            agents: AgentRegistry::new(app),
            target_map: TargetRoleMap::new(),
            assignments: BTreeMap::new(),
            blacklist: Blacklist::new(),
            slot_states: BTreeMap::new(),
            resource_totals: ResourceTotals::default(),
            reclaiming_agents: 0,
            last_full_sync: None,
            last_gc: None,
            persisted_version: 0,
            persisted_bytes: 0,
        }
    }

    pub(crate) fn blacklist_dirty(&self) -> bool {
        self.blacklist.version() != self.persisted_version
    }

    fn is_serving(&self, agent: &str, target: &str) -> bool {
        self.assignments
            .get(agent)
            .is_some_and(|targets| targets.iter().any(|t| t == target))
    }
}

/// Multiplexes target roles onto shared agent slots.
pub struct AgentSharingScheduler {
    pub(crate) app: String,
    pub(crate) config: SchedulerConfig,
    pub(crate) cluster: Arc<dyn ClusterScheduler>,
    pub(crate) nodes: Arc<dyn NodeRegistry>,
    pub(crate) store: StateStore,
    clock: Clock,
    pub(crate) state: Mutex<SchedulerState>,
}

impl AgentSharingScheduler {
    pub fn new(
        app: impl Into<String>,
        cluster: Arc<dyn ClusterScheduler>,
        nodes: Arc<dyn NodeRegistry>,
        store: StateStore,
    ) -> Self {
        let app = app.into();
        let state = Mutex::new(SchedulerState::new(&app));
        Self {
            app,
            config: SchedulerConfig::default(),
            cluster,
            nodes,
            store,
            clock: Arc::new(epoch_secs),
            state,
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the wall clock, e.g. with a controllable one in tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> u64 {
        (self.clock)()
    }

    // ── Agent registry ────────────────────────────────────────────

    /// Declare (or redeclare) an agent role. Takes effect on the next plan.
    pub fn declare_agent_role(&self, name: &str, info: AgentRoleInfo) -> SchedulerResult<()> {
        self.state.lock().agents.declare(name, info)
    }

    /// Forget an agent role. Its node is left for the GC pass.
    pub fn remove_agent_role(&self, name: &str) -> bool {
        let mut state = self.state.lock();
        state.slot_states.remove(name);
        state.agents.remove(name)
    }

    pub fn get_agent_role_names(&self) -> Vec<String> {
        self.state.lock().agents.names()
    }

    pub fn get_agent_role_names_by_build_id(&self, build_id: &str) -> Vec<String> {
        self.state.lock().agents.names_by_build_id(build_id)
    }

    /// Drop every agent role whose build is not in `in_use_build_ids`.
    /// Returns the removed names.
    pub fn remove_useless_agent_nodes(&self, in_use_build_ids: &BTreeSet<String>) -> Vec<String> {
        let mut state = self.state.lock();
        let removed = state.agents.retain_build_ids(in_use_build_ids);
        for name in &removed {
            state.slot_states.remove(name);
        }
        if !removed.is_empty() {
            info!(count = removed.len(), "useless agent roles removed");
        }
        removed
    }

    // ── Plan rewriting ────────────────────────────────────────────

    /// Rewrite `plan` for the declared agents and forward it to the cluster
    /// scheduler.
    pub fn set_app_plan(&self, plan: AppPlan) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.agents.is_empty() {
            state.target_map.clear();
            state.assignments.clear();
            state.blacklist.clear();
            state.slot_states.clear();
            debug!(roles = plan.roles.len(), "no agent roles, plan forwarded as is");
            self.cluster.set_app_plan(plan);
            return;
        }

        let now = self.now();
        state.target_map = build_target_map(&plan, &state.agents);
        let expired =
            state
                .blacklist
                .refresh(now, &state.target_map, &state.agents, &state.slot_states);
        self.ensure_agent_nodes(&state.agents);

        let outcome = rewrite_plan(&plan, &state.agents, &state.target_map, &state.blacklist);
        for agent in state.agents.iter() {
            let targets = outcome
                .assignments
                .get(&agent.name)
                .map(Vec::as_slice)
                .unwrap_or_default();
            self.nodes
                .get_or_create_node(&agent.name)
                .set_target_status(target_status(agent, targets));
        }

        state.assignments = outcome
            .assignments
            .iter()
            .map(|(agent, targets)| {
                let names = targets.iter().map(|t| t.role_name.clone()).collect();
                (agent.clone(), names)
            })
            .collect();

        info!(
            roles = plan.roles.len(),
            multiplexed = outcome.multiplexed_roles(),
            forwarded = outcome.plan.roles.len(),
            expired,
            "app plan rewritten"
        );
        self.cluster.set_app_plan(outcome.plan);
    }

    /// One node per declared agent. Rebuilds every node when stale nodes
    /// are left over.
    fn ensure_agent_nodes(&self, agents: &AgentRegistry) {
        for agent in agents.iter() {
            self.nodes.get_or_create_node(&agent.name);
        }
        let count = self.nodes.node_count();
        if count != agents.len() {
            warn!(nodes = count, agents = agents.len(), "agent nodes out of step, rebuilding");
            self.nodes.clear_all_nodes();
            for agent in agents.iter() {
                self.nodes.get_or_create_node(&agent.name);
            }
        }
    }

    pub fn find_agent_role_name(&self, target: &str) -> Option<String> {
        self.state.lock().target_map.get(target).cloned()
    }

    /// Whether the last rewrite assigned any target to `agent`.
    pub fn has_valid_target_roles(&self, agent: &str) -> bool {
        self.state
            .lock()
            .assignments
            .get(agent)
            .is_some_and(|targets| !targets.is_empty())
    }

    // ── Slot views ────────────────────────────────────────────────

    /// Slots of every role, agent-served targets included.
    pub fn get_all_role_slots(&self) -> BTreeMap<String, RoleSlots> {
        let mut state = self.state.lock();
        self.sync_all_role_slots(&mut state)
    }

    /// Slots of one role. Falls back to the serving agent's slots when the
    /// cluster scheduler has none for it.
    pub fn get_role_slots(&self, role_name: &str) -> RoleSlots {
        let state = self.state.lock();
        let direct = self.cluster.get_role_slots(role_name);
        if !direct.is_empty() {
            return direct;
        }

        let Some(agent) = state.target_map.get(role_name) else {
            return direct;
        };
        if !state.agents.contains(agent)
            || !state.is_serving(agent, role_name)
            || state.blacklist.contains(role_name, agent)
        {
            return RoleSlots::new();
        }
        relabel(&self.cluster.get_role_slots(agent), role_name)
    }

    pub fn release_slots(&self, slot_ids: &[SlotId], preference: &ReleasePreference) {
        let _state = self.state.lock();
        let unique: BTreeSet<&SlotId> = slot_ids.iter().collect();
        let slot_ids: Vec<SlotId> = unique.into_iter().cloned().collect();
        self.cluster.release_slots(&slot_ids, preference);
    }

    /// Full slot sync: refreshes totals, agent slot states and node slot
    /// infos, blacklists targets of reclaimed dynamic agents, and returns
    /// every role's slots with agent-served targets filled in.
    pub(crate) fn sync_all_role_slots(
        &self,
        state: &mut SchedulerState,
    ) -> BTreeMap<String, RoleSlots> {
        let now = self.now();
        let mut all = self.cluster.get_all_role_slots();

        let mut totals = ResourceTotals::default();
        for slot in all.values().flatten() {
            totals.add(&slot.resources);
        }
        state.resource_totals = totals;

        let mut observed = BTreeMap::new();
        self.nodes.for_each_active_node(&mut |node| {
            let name = node.role_name();
            if !state.agents.contains(name) {
                return;
            }
            node.set_slot_infos(all.get(name).cloned().unwrap_or_default());
            observed.insert(name.to_string(), AgentSlotState::from_node(node));
        });

        state.reclaiming_agents = 0;
        for (agent, slot_state) in observed.iter().filter(|(_, s)| s.reclaiming) {
            state.reclaiming_agents += 1;
            if !state.agents.get(agent).is_some_and(AgentEntry::is_dynamic) {
                continue;
            }
            let Some(targets) = state.assignments.get(agent) else {
                continue;
            };
            for target in targets {
                if state.blacklist.contains(target, agent) {
                    continue;
                }
                warn!(target = %target, agent = %agent, "agent slot reclaimed, target blacklisted");
                state.blacklist.upsert(
                    target,
                    BlacklistEntry {
                        agent_role: agent.clone(),
                        timestamp: now,
                        is_reclaim: true,
                        slot_address: slot_state.address.clone(),
                    },
                );
            }
        }
        state.slot_states = observed;

        for (agent, targets) in &state.assignments {
            if !state.agents.contains(agent) {
                continue;
            }
            let Some(agent_slots) = all.get(agent).filter(|s| !s.is_empty()).cloned() else {
                continue;
            };
            for target in targets {
                let has_own = all.get(target).is_some_and(|s| !s.is_empty());
                if has_own || state.blacklist.contains(target, agent) {
                    continue;
                }
                all.insert(target.clone(), relabel(&agent_slots, target));
            }
        }

        state.last_full_sync = Some(now);
        debug!(
            roles = all.len(),
            reclaiming = state.reclaiming_agents,
            "role slots synced"
        );
        all
    }

    // ── Blacklist ─────────────────────────────────────────────────

    /// Blacklist `target` for the agent serving it after the caller saw it
    /// fail on `observed_slots`.
    ///
    /// Returns the agent name when an entry was recorded. Reports about slots
    /// the agent no longer runs on are ignored.
    pub fn add_target_role_to_blacklist(
        &self,
        target: &str,
        observed_slots: &[SlotInfo],
    ) -> Option<String> {
        let mut state = self.state.lock();
        let agent = state.target_map.get(target)?.clone();
        if state.blacklist.contains(target, &agent) {
            return None;
        }

        let slot_state = state.slot_states.get(&agent)?.clone();
        if slot_state.address.is_empty() {
            return None;
        }
        let observed = slots_identifier(observed_slots);
        if observed != slot_state.identifier {
            debug!(
                target = %target,
                agent = %agent,
                observed = %observed,
                current = %slot_state.identifier,
                "stale failure report ignored"
            );
            return None;
        }

        let entry = BlacklistEntry {
            agent_role: agent.clone(),
            timestamp: self.now(),
            is_reclaim: slot_state.reclaiming,
            slot_address: slot_state.address,
        };
        state.blacklist.upsert(target, entry);
        info!(target = %target, agent = %agent, "target blacklisted for agent");
        Some(agent)
    }

    pub fn is_in_blacklist(&self, target: &str, agent: &str) -> bool {
        self.state.lock().blacklist.contains(target, agent)
    }

    pub fn get_in_blacklist_agent_roles(&self, target: &str) -> BTreeSet<String> {
        self.state.lock().blacklist.agents_for(target)
    }

    /// Most recent blacklist timestamp of `agent` across all targets.
    pub fn get_agent_node_in_blacklist_timestamp(&self, agent: &str) -> Option<u64> {
        self.state.lock().blacklist.agent_timestamp(agent)
    }

    // ── Readiness ─────────────────────────────────────────────────

    /// Slot identity observed for `agent` by the last full sync.
    pub fn get_agent_identifier(&self, agent: &str) -> Option<String> {
        self.state
            .lock()
            .slot_states
            .get(agent)
            .map(|s| s.identifier.clone())
            .filter(|id| !id.is_empty())
    }

    /// Hand a worker's status report to its agent node. Takes effect on the
    /// next reconciliation tick. Reports for undeclared agents are dropped.
    pub fn report_agent_status(&self, agent: &str, status: AgentCurrentStatus) -> bool {
        if !self.state.lock().agents.contains(agent) {
            debug!(agent = %agent, "status report for undeclared agent dropped");
            return false;
        }
        self.nodes.heartbeat(agent, status)
    }

    /// The worker reports ready from the very slot the scheduler last saw
    /// the agent on.
    pub fn is_agent_service_ready(&self, agent: &str) -> bool {
        let state = self.state.lock();
        let Some(expected) = state
            .slot_states
            .get(agent)
            .map(|s| s.identifier.as_str())
            .filter(|id| !id.is_empty())
        else {
            return false;
        };
        let Some(node) = self.nodes.get_node(agent) else {
            return false;
        };
        let current = node.current_status();
        current.service_ready && current.identifier == expected
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.state.lock();
        SchedulerStats {
            declared_agents: state.agents.len(),
            blacklist_size: state.blacklist.len(),
            reclaiming_agents: state.reclaiming_agents,
            multiplexed_roles: state.assignments.values().map(Vec::len).sum(),
            persisted_blacklist_bytes: state.persisted_bytes,
            resource_totals: state.resource_totals,
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
