//! Agent blacklist — (target role, agent role) pairs that must not be paired.
//!
//! Every mutation bumps a version counter. The persistence step snapshots the
//! blacklist together with its version and only treats the write as current
//! when the version has not moved in the meantime.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agent::AgentRegistry;
use crate::slots::AgentSlotState;

/// Why one agent must not serve one target role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub agent_role: String,
    /// Unix seconds of insertion or last refresh.
    pub timestamp: u64,
    /// The agent's slot was being reclaimed when the entry was recorded.
    pub is_reclaim: bool,
    /// Full slot address of the agent at insertion.
    pub slot_address: String,
}

/// Outcome of decoding a persisted blacklist.
#[derive(Debug)]
pub struct RecoveredBlacklist {
    pub blacklist: Blacklist,
    /// Entries or target lists skipped because they were malformed.
    pub dropped: usize,
}

#[derive(Debug, Default)]
pub struct Blacklist {
    entries: BTreeMap<String, Vec<BlacklistEntry>>,
    /// Agent → most recent timestamp across all targets.
    agent_timestamps: BTreeMap<String, u64>,
    version: u64,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutation counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of (target, agent) pairs.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn contains(&self, target: &str, agent: &str) -> bool {
        self.entries
            .get(target)
            .is_some_and(|list| list.iter().any(|e| e.agent_role == agent))
    }

    pub fn agents_for(&self, target: &str) -> BTreeSet<String> {
        self.entries
            .get(target)
            .map(|list| list.iter().map(|e| e.agent_role.clone()).collect())
            .unwrap_or_default()
    }

    pub fn agent_timestamp(&self, agent: &str) -> Option<u64> {
        self.agent_timestamps.get(agent).copied()
    }

    /// Insert `entry` for `target`, replacing the agent's previous entry.
    pub fn upsert(&mut self, target: &str, entry: BlacklistEntry) {
        let list = self.entries.entry(target.to_string()).or_default();
        match list.iter_mut().find(|e| e.agent_role == entry.agent_role) {
            Some(existing) => *existing = entry,
            None => list.push(entry),
        }
        self.changed();
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.changed();
        }
    }

    /// Drop expired and obsolete entries. Returns how many pairs were removed.
    ///
    /// A target's list goes away entirely when the target no longer maps to
    /// an agent. An entry goes away when its agent is undeclared, when its
    /// cooldown has elapsed, or when it was recorded during a reclaim and the
    /// agent's slot address has since changed while it holds a live slot.
    pub fn refresh(
        &mut self,
        now: u64,
        target_map: &BTreeMap<String, String>,
        agents: &AgentRegistry,
        slot_states: &BTreeMap<String, AgentSlotState>,
    ) -> usize {
        let before = self.len();

        self.entries.retain(|target, list| {
            if !target_map.contains_key(target) {
                debug!(target = %target, "blacklist target no longer mapped");
                return false;
            }
            list.retain(|entry| {
                let Some(agent) = agents.get(&entry.agent_role) else {
                    return false;
                };
                if now.saturating_sub(entry.timestamp) >= agent.blacklist_timeout_secs() {
                    info!(
                        target = %target,
                        agent = %entry.agent_role,
                        "blacklist cooldown elapsed"
                    );
                    return false;
                }
                if entry.is_reclaim {
                    let moved = slot_states.get(&entry.agent_role).is_some_and(|state| {
                        !state.identifier.is_empty() && state.address != entry.slot_address
                    });
                    if moved {
                        info!(
                            target = %target,
                            agent = %entry.agent_role,
                            "agent recovered from reclaim"
                        );
                        return false;
                    }
                }
                true
            });
            !list.is_empty()
        });

        let removed = before - self.len();
        if removed > 0 {
            self.changed();
        }
        removed
    }

    /// JSON form: target role → list of entries.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.entries)
    }

    /// Decode a persisted blacklist, keeping every well-formed entry.
    ///
    /// Fails only when `data` is not a JSON object at all.
    pub fn from_json(data: &[u8]) -> serde_json::Result<RecoveredBlacklist> {
        let raw: serde_json::Map<String, Value> = serde_json::from_slice(data)?;
        let mut blacklist = Blacklist::new();
        let mut dropped = 0;

        for (target, value) in raw {
            let Value::Array(items) = value else {
                warn!(target = %target, "dropping malformed blacklist target list");
                dropped += 1;
                continue;
            };
            for item in items {
                match serde_json::from_value::<BlacklistEntry>(item) {
                    Ok(entry) => {
                        let list = blacklist.entries.entry(target.clone()).or_default();
                        match list.iter_mut().find(|e| e.agent_role == entry.agent_role) {
                            Some(existing) if existing.timestamp < entry.timestamp => {
                                *existing = entry
                            }
                            Some(_) => {}
                            None => list.push(entry),
                        }
                    }
                    Err(e) => {
                        warn!(target = %target, error = %e, "dropping malformed blacklist entry");
                        dropped += 1;
                    }
                }
            }
        }
        blacklist.entries.retain(|_, list| !list.is_empty());
        blacklist.rebuild_agent_timestamps();

        Ok(RecoveredBlacklist { blacklist, dropped })
    }

    fn changed(&mut self) {
        self.version += 1;
        self.rebuild_agent_timestamps();
    }

    fn rebuild_agent_timestamps(&mut self) {
        self.agent_timestamps.clear();
        for entry in self.entries.values().flatten() {
            let ts = self
                .agent_timestamps
                .entry(entry.agent_role.clone())
                .or_insert(entry.timestamp);
            *ts = (*ts).max(entry.timestamp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::agent_info;

    const A1: &str = "app.agent.b1.online.1.0";
    const A2: &str = "app.agent.b2.online.1.0";

    fn entry(agent: &str, timestamp: u64) -> BlacklistEntry {
        BlacklistEntry {
            agent_role: agent.to_string(),
            timestamp,
            is_reclaim: false,
            slot_address: "10.0.0.1|1".to_string(),
        }
    }

    fn registry() -> AgentRegistry {
        let mut agents = AgentRegistry::new("app");
        agents.declare(A1, agent_info(&["T1", "T2"])).unwrap();
        agents
    }

    fn target_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(t, a)| (t.to_string(), a.to_string()))
            .collect()
    }

    #[test]
    fn upsert_refreshes_in_place() {
        let mut blacklist = Blacklist::new();
        blacklist.upsert("T1", entry(A1, 100));
        blacklist.upsert("T1", entry(A1, 150));
        blacklist.upsert("T2", entry(A1, 120));

        assert_eq!(blacklist.len(), 2);
        assert!(blacklist.contains("T1", A1));
        assert!(!blacklist.contains("T1", A2));
        assert_eq!(blacklist.agent_timestamp(A1), Some(150));
        assert_eq!(blacklist.version(), 3);
    }

    #[test]
    fn refresh_applies_cooldown() {
        let agents = registry();
        let map = target_map(&[("T1", A1)]);
        let mut blacklist = Blacklist::new();
        blacklist.upsert("T1", entry(A1, 1000));

        assert_eq!(blacklist.refresh(1059, &map, &agents, &BTreeMap::new()), 0);
        assert!(blacklist.contains("T1", A1));

        let version = blacklist.version();
        assert_eq!(blacklist.refresh(1060, &map, &agents, &BTreeMap::new()), 1);
        assert!(blacklist.is_empty());
        assert!(blacklist.version() > version);
        assert_eq!(blacklist.agent_timestamp(A1), None);
    }

    #[test]
    fn refresh_drops_unmapped_and_undeclared() {
        let agents = registry();
        let mut blacklist = Blacklist::new();
        blacklist.upsert("T1", entry(A1, 1000));
        blacklist.upsert("T2", entry(A2, 1000));

        let map = target_map(&[("T2", A1)]);
        assert_eq!(blacklist.refresh(1001, &map, &agents, &BTreeMap::new()), 2);
        assert!(blacklist.is_empty());
    }

    #[test]
    fn refresh_without_removal_keeps_version() {
        let agents = registry();
        let map = target_map(&[("T1", A1)]);
        let mut blacklist = Blacklist::new();
        blacklist.upsert("T1", entry(A1, 1000));

        let version = blacklist.version();
        blacklist.refresh(1001, &map, &agents, &BTreeMap::new());
        assert_eq!(blacklist.version(), version);
    }

    #[test]
    fn reclaim_entry_clears_once_agent_moves() {
        let agents = registry();
        let map = target_map(&[("T1", A1)]);
        let mut blacklist = Blacklist::new();
        blacklist.upsert(
            "T1",
            BlacklistEntry {
                is_reclaim: true,
                ..entry(A1, 1000)
            },
        );

        let mut states = BTreeMap::new();
        states.insert(A1.to_string(), AgentSlotState::default());
        assert_eq!(blacklist.refresh(1001, &map, &agents, &states), 0, "still reclaiming");

        states.insert(
            A1.to_string(),
            AgentSlotState {
                identifier: "10.0.0.1|1".to_string(),
                address: "10.0.0.1|1".to_string(),
                reclaiming: false,
            },
        );
        assert_eq!(blacklist.refresh(1001, &map, &agents, &states), 0, "same slot");

        states.insert(
            A1.to_string(),
            AgentSlotState {
                identifier: "10.0.0.2|7".to_string(),
                address: "10.0.0.2|7".to_string(),
                reclaiming: false,
            },
        );
        assert_eq!(blacklist.refresh(1001, &map, &agents, &states), 1);
    }

    #[test]
    fn reclaim_entry_survives_while_address_is_unchanged() {
        let agents = registry();
        let map = target_map(&[("T1", A1)]);
        let mut blacklist = Blacklist::new();
        blacklist.upsert(
            "T1",
            BlacklistEntry {
                is_reclaim: true,
                slot_address: "10.0.0.1|1;10.0.0.1|2".to_string(),
                ..entry(A1, 1000)
            },
        );

        // Old slot still held next to its replacement.
        let mut states = BTreeMap::new();
        states.insert(
            A1.to_string(),
            AgentSlotState {
                identifier: "10.0.0.1|2".to_string(),
                address: "10.0.0.1|1;10.0.0.1|2".to_string(),
                reclaiming: true,
            },
        );
        assert_eq!(blacklist.refresh(1001, &map, &agents, &states), 0);
        assert!(blacklist.contains("T1", A1));

        // Reclaimed slot gone.
        states.insert(
            A1.to_string(),
            AgentSlotState {
                identifier: "10.0.0.1|2".to_string(),
                address: "10.0.0.1|2".to_string(),
                reclaiming: false,
            },
        );
        assert_eq!(blacklist.refresh(1002, &map, &agents, &states), 1);
    }

    #[test]
    fn json_keeps_timestamps() {
        let mut blacklist = Blacklist::new();
        blacklist.upsert("T1", entry(A1, 1234));
        let data = blacklist.to_json().unwrap();

        let recovered = Blacklist::from_json(&data).unwrap();
        assert_eq!(recovered.dropped, 0);
        assert!(recovered.blacklist.contains("T1", A1));
        assert_eq!(recovered.blacklist.agent_timestamp(A1), Some(1234));
    }

    #[test]
    fn recovery_drops_only_malformed_entries() {
        let data = br#"{
            "T1": [
                {"agent_role": "app.agent.b1.online.1.0", "timestamp": 10, "is_reclaim": false, "slot_address": "a"},
                {"agent_role": "app.agent.b2.online.1.0"}
            ],
            "T2": "not a list",
            "T3": [42]
        }"#;

        let recovered = Blacklist::from_json(data).unwrap();
        assert_eq!(recovered.dropped, 3);
        assert_eq!(recovered.blacklist.len(), 1);
        assert!(recovered.blacklist.contains("T1", A1));
        assert_eq!(recovered.blacklist.agent_timestamp(A1), Some(10));
    }

    #[test]
    fn recovery_rejects_non_objects() {
        assert!(Blacklist::from_json(b"[1, 2, 3]").is_err());
        assert!(Blacklist::from_json(b"garbage").is_err());
    }
}
