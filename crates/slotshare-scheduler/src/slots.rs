//! Slot views of agent roles.

use slotshare_cluster::AgentNode;
use slotshare_core::{RoleSlots, SlotInfo};

/// What the last full sync observed about one agent's slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentSlotState {
    /// `ip|id` of every non-reclaiming slot. Empty while fully reclaimed.
    pub identifier: String,
    /// `ip|id` of every slot.
    pub address: String,
    pub reclaiming: bool,
}

impl AgentSlotState {
    /// Read back the slots last pushed onto `node`.
    pub fn from_node(node: &AgentNode) -> Self {
        Self {
            identifier: node.slot_identifier(),
            address: node.slot_address(),
            reclaiming: node.is_reclaiming(),
        }
    }
}

/// Copy of an agent's slots reported under `role_name`.
pub fn relabel(slots: &[SlotInfo], role_name: &str) -> RoleSlots {
    slots
        .iter()
        .map(|slot| SlotInfo {
            role: role_name.to_string(),
            ..slot.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotshare_core::{ResourceRequirements, SlotId};

    fn slot(id: u64, reclaiming: bool) -> SlotInfo {
        SlotInfo {
            slot_id: SlotId::new("10.0.0.1", id),
            role: "app.agent.b1.online.1.0".to_string(),
            reclaiming,
            resources: ResourceRequirements { cpu: 100, mem: 256 },
        }
    }

    #[test]
    fn state_separates_identity_from_address() {
        let node = AgentNode::new("app.agent.b1.online.1.0");
        node.set_slot_infos(vec![slot(1, true), slot(2, false)]);
        let state = AgentSlotState::from_node(&node);
        assert_eq!(state.identifier, "10.0.0.1|2");
        assert_eq!(state.address, "10.0.0.1|1;10.0.0.1|2");
        assert!(state.reclaiming);
    }

    #[test]
    fn relabel_keeps_slot_ids() {
        let view = relabel(&[slot(1, false)], "T1");
        assert_eq!(view[0].role, "T1");
        assert_eq!(view[0].slot_id, SlotId::new("10.0.0.1", 1));
        assert_eq!(view[0].resources.cpu, 100);
    }
}
