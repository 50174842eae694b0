//! Cluster scheduler — owns physical slot allocation.
//!
//! [`ClusterScheduler`] is the seam the agent-sharing scheduler forwards its
//! rewritten plan to. [`LocalClusterScheduler`] is a single-process stand-in
//! that hands every role of the plan one slot on a round-robin host.

use std::collections::{BTreeMap, HashSet};

use parking_lot::RwLock;
use tracing::{debug, info};

use slotshare_core::{AppPlan, ReleasePreference, RoleSlots, SlotId, SlotInfo};

/// The underlying cluster scheduler.
///
/// Implementations must be thread-safe and must not call back into the
/// agent-sharing scheduler.
pub trait ClusterScheduler: Send + Sync {
    /// Replace the resource plan the cluster should satisfy.
    fn set_app_plan(&self, plan: AppPlan);

    fn get_role_slots(&self, role_name: &str) -> RoleSlots;

    fn get_all_role_slots(&self) -> BTreeMap<String, RoleSlots>;

    fn release_slots(&self, slot_ids: &[SlotId], preference: &ReleasePreference);
}

#[derive(Debug, Default)]
struct LocalState {
    plan: AppPlan,
    /// Active slots: role name → slots.
    slots: BTreeMap<String, RoleSlots>,
    next_slot_id: u64,
    host_cursor: usize,
}

/// Single-process cluster scheduler.
pub struct LocalClusterScheduler {
    hosts: Vec<String>,
    state: RwLock<LocalState>,
}

impl LocalClusterScheduler {
    /// Create a scheduler handing out slots on `hosts`.
    pub fn new(hosts: Vec<String>) -> Self {
        let hosts = if hosts.is_empty() {
            vec!["127.0.0.1".to_string()]
        } else {
            hosts
        };
        Self {
            hosts,
            state: RwLock::new(LocalState::default()),
        }
    }

    /// The last plan received.
    pub fn app_plan(&self) -> AppPlan {
        self.state.read().plan.clone()
    }

    /// Flag every slot of `role_name` as being reclaimed. Returns how many
    /// slots were flagged.
    pub fn reclaim_role(&self, role_name: &str) -> usize {
        let mut state = self.state.write();
        let flagged = match state.slots.get_mut(role_name) {
            Some(slots) => {
                let mut count = 0;
                for slot in slots.iter_mut().filter(|s| !s.reclaiming) {
                    slot.reclaiming = true;
                    count += 1;
                }
                count
            }
            None => 0,
        };
        if flagged > 0 {
            info!(role = %role_name, slots = flagged, "slots marked for reclaim");
        }
        flagged
    }

    /// Drop reclaiming slots of `role_name` and give it a fresh slot if it
    /// has none left.
    pub fn finish_reclaim(&self, role_name: &str) {
        let mut state = self.state.write();
        if let Some(slots) = state.slots.get_mut(role_name) {
            slots.retain(|s| !s.reclaiming);
        }
        let needs_slot = state.plan.contains(role_name)
            && state.slots.get(role_name).is_none_or(|s| s.is_empty());
        if needs_slot {
            Self::allocate(&self.hosts, &mut state, role_name);
        }
    }

    fn allocate(hosts: &[String], state: &mut LocalState, role_name: &str) {
        let Some(plan) = state.plan.roles.get(role_name) else {
            return;
        };
        let resources = plan.resources;
        let host = hosts[state.host_cursor % hosts.len()].clone();
        state.host_cursor += 1;
        state.next_slot_id += 1;

        let slot = SlotInfo {
            slot_id: SlotId::new(host, state.next_slot_id),
            role: role_name.to_string(),
            reclaiming: false,
            resources,
        };
        debug!(role = %role_name, slot = %slot.slot_id.identifier(), "slot allocated");
        state.slots.entry(role_name.to_string()).or_default().push(slot);
    }
}

impl ClusterScheduler for LocalClusterScheduler {
    fn set_app_plan(&self, plan: AppPlan) {
        let mut state = self.state.write();
        state.slots.retain(|role, _| plan.contains(role));
        state.plan = plan;

        let missing: Vec<String> = state
            .plan
            .roles
            .keys()
            .filter(|role| !state.slots.contains_key(*role))
            .cloned()
            .collect();
        for role in &missing {
            Self::allocate(&self.hosts, &mut state, role);
        }
        info!(
            roles = state.plan.roles.len(),
            allocated = missing.len(),
            "app plan applied"
        );
    }

    fn get_role_slots(&self, role_name: &str) -> RoleSlots {
        self.state
            .read()
            .slots
            .get(role_name)
            .cloned()
            .unwrap_or_default()
    }

    fn get_all_role_slots(&self) -> BTreeMap<String, RoleSlots> {
        self.state.read().slots.clone()
    }

    fn release_slots(&self, slot_ids: &[SlotId], preference: &ReleasePreference) {
        let released: HashSet<&SlotId> = slot_ids.iter().collect();
        let mut state = self.state.write();

        let mut emptied = Vec::new();
        for (role, slots) in state.slots.iter_mut() {
            let before = slots.len();
            slots.retain(|s| !released.contains(&s.slot_id));
            if slots.is_empty() && before > 0 {
                emptied.push(role.clone());
            }
        }
        for role in &emptied {
            state.slots.remove(role);
            Self::allocate(&self.hosts, &mut state, role);
        }
        info!(
            slots = slot_ids.len(),
            preference = ?preference.kind,
            "slots released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotshare_core::{LaunchPlan, ResourceRequirements};

    fn plan(roles: &[&str]) -> AppPlan {
        let mut plan = AppPlan::new();
        for role in roles {
            plan = plan.with_role(
                *role,
                LaunchPlan {
                    resources: ResourceRequirements { cpu: 100, mem: 512 },
                    ..LaunchPlan::default()
                },
            );
        }
        plan
    }

    fn scheduler() -> LocalClusterScheduler {
        LocalClusterScheduler::new(vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()])
    }

    #[test]
    fn every_role_gets_one_slot() {
        let cluster = scheduler();
        cluster.set_app_plan(plan(&["a", "b"]));

        let all = cluster.get_all_role_slots();
        assert_eq!(all.len(), 2);
        assert_eq!(all["a"].len(), 1);
        assert_eq!(all["a"][0].role, "a");
        assert_eq!(all["a"][0].resources.cpu, 100);
        assert_ne!(all["a"][0].slot_id.ip, all["b"][0].slot_id.ip, "round-robin hosts");
    }

    #[test]
    fn replanning_keeps_existing_slots() {
        let cluster = scheduler();
        cluster.set_app_plan(plan(&["a"]));
        let before = cluster.get_role_slots("a");

        cluster.set_app_plan(plan(&["a", "b"]));
        assert_eq!(cluster.get_role_slots("a"), before);
        assert_eq!(cluster.get_role_slots("b").len(), 1);
    }

    #[test]
    fn dropped_roles_lose_their_slots() {
        let cluster = scheduler();
        cluster.set_app_plan(plan(&["a", "b"]));
        cluster.set_app_plan(plan(&["b"]));
        assert!(cluster.get_role_slots("a").is_empty());
        assert_eq!(cluster.app_plan(), plan(&["b"]));
    }

    #[test]
    fn release_reallocates_a_fresh_slot() {
        let cluster = scheduler();
        cluster.set_app_plan(plan(&["a"]));
        let old = cluster.get_role_slots("a")[0].slot_id.clone();

        cluster.release_slots(&[old.clone()], &ReleasePreference::default());
        let slots = cluster.get_role_slots("a");
        assert_eq!(slots.len(), 1);
        assert_ne!(slots[0].slot_id, old);
    }

    #[test]
    fn reclaim_flags_then_replaces() {
        let cluster = scheduler();
        cluster.set_app_plan(plan(&["a"]));
        let old = cluster.get_role_slots("a")[0].slot_id.clone();

        assert_eq!(cluster.reclaim_role("a"), 1);
        assert!(cluster.get_role_slots("a")[0].reclaiming);
        assert_eq!(cluster.reclaim_role("a"), 0, "already reclaiming");

        cluster.finish_reclaim("a");
        let slots = cluster.get_role_slots("a");
        assert_eq!(slots.len(), 1);
        assert!(!slots[0].reclaiming);
        assert_ne!(slots[0].slot_id, old);
    }
}
