//! Agent node — live state of one agent role's worker.
//!
//! The node carries two views joined by the agent role name:
//! - the *target status* the control plane wants the worker to run
//! - the *current status* the worker last reported, plus the slots the
//!   cluster scheduler reports for the role

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use slotshare_core::{slots_address, slots_identifier, RoleSlots};

/// One target role assigned to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTarget {
    pub role_name: String,
    /// JSON-serialized process list of the target's launch plan.
    pub process_info: String,
    /// Per-target config override.
    pub config_path: Option<String>,
}

/// What the agent worker should be running.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentTargetStatus {
    pub config_path: Option<String>,
    pub global_agent: bool,
    pub global_config: BTreeMap<String, String>,
    pub targets: Vec<AgentTarget>,
}

impl AgentTargetStatus {
    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.role_name.as_str())
    }
}

/// What the agent worker last reported through its heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentCurrentStatus {
    /// Slot identity the worker believes it runs on (`ip|id`).
    pub identifier: String,
    pub service_ready: bool,
    /// Targets the worker has actually loaded.
    #[serde(default)]
    pub served_targets: Vec<String>,
    /// Unix timestamp (seconds) of the heartbeat.
    #[serde(default)]
    pub heartbeat_at: u64,
}

#[derive(Debug, Default)]
struct NodeState {
    target: AgentTargetStatus,
    current: AgentCurrentStatus,
    slots: RoleSlots,
}

/// Live node of one agent role.
#[derive(Debug)]
pub struct AgentNode {
    role_name: String,
    state: Mutex<NodeState>,
}

impl AgentNode {
    pub fn new(role_name: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            state: Mutex::new(NodeState::default()),
        }
    }

    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    pub fn set_target_status(&self, target: AgentTargetStatus) {
        self.state.lock().target = target;
    }

    pub fn target_status(&self) -> AgentTargetStatus {
        self.state.lock().target.clone()
    }

    pub fn set_slot_infos(&self, slots: RoleSlots) {
        self.state.lock().slots = slots;
    }

    /// Any slot of the node is being reclaimed.
    pub fn is_reclaiming(&self) -> bool {
        self.state.lock().slots.iter().any(|s| s.reclaiming)
    }

    /// Identity of the node's non-reclaiming slots.
    pub fn slot_identifier(&self) -> String {
        slots_identifier(&self.state.lock().slots)
    }

    /// `ip|id` of every slot of the node, reclaiming ones included.
    pub fn slot_address(&self) -> String {
        slots_address(&self.state.lock().slots)
    }

    pub fn current_status(&self) -> AgentCurrentStatus {
        self.state.lock().current.clone()
    }

    pub fn update_current_status(&self, current: AgentCurrentStatus) {
        self.state.lock().current = current;
    }

    /// Drop the readiness flag, keeping the last reported identity.
    pub fn mark_not_ready(&self) {
        self.state.lock().current.service_ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotshare_core::{ResourceRequirements, SlotId, SlotInfo};

    fn slot(id: u64, reclaiming: bool) -> SlotInfo {
        SlotInfo {
            slot_id: SlotId::new("10.0.0.1", id),
            role: "app.agent.b1.c.1.0".to_string(),
            reclaiming,
            resources: ResourceRequirements::default(),
        }
    }

    #[test]
    fn new_node_is_empty() {
        let node = AgentNode::new("app.agent.b1.c.1.0");
        assert_eq!(node.role_name(), "app.agent.b1.c.1.0");
        assert_eq!(node.target_status(), AgentTargetStatus::default());
        assert!(node.slot_address().is_empty());
        assert!(!node.is_reclaiming());
        assert!(node.slot_identifier().is_empty());
    }

    #[test]
    fn reclaim_is_detected_from_slots() {
        let node = AgentNode::new("app.agent.b1.c.1.0");
        node.set_slot_infos(vec![slot(1, false)]);
        assert!(!node.is_reclaiming());
        assert_eq!(node.slot_identifier(), "10.0.0.1|1");

        node.set_slot_infos(vec![slot(1, true)]);
        assert!(node.is_reclaiming());
        assert!(node.slot_identifier().is_empty());
        assert_eq!(node.slot_address(), "10.0.0.1|1");
    }

    #[test]
    fn mark_not_ready_keeps_identifier() {
        let node = AgentNode::new("app.agent.b1.c.1.0");
        node.update_current_status(AgentCurrentStatus {
            identifier: "10.0.0.1|1".to_string(),
            service_ready: true,
            ..AgentCurrentStatus::default()
        });
        node.mark_not_ready();

        let current = node.current_status();
        assert!(!current.service_ready);
        assert_eq!(current.identifier, "10.0.0.1|1");
    }
}
