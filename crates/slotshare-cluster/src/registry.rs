//! Node registry — tracks the live agent nodes and their heartbeats.
//!
//! Workers report through [`NodeRegistry::heartbeat`]; reports are
//! buffered and applied to the nodes on the next
//! [`NodeRegistry::sync_nodes_status`], so a sync is cheap and never talks to
//! the cluster scheduler.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use slotshare_state::{AgentNodeRecord, StateStore};

use crate::error::ClusterResult;
use crate::node::{AgentCurrentStatus, AgentNode};

/// Per-role live worker-node bookkeeping.
///
/// Implementations must be thread-safe. The agent-sharing scheduler calls
/// them while holding its own lock and never expects a call back.
pub trait NodeRegistry: Send + Sync {
    /// Return the node of `role_name`, creating it if absent.
    fn get_or_create_node(&self, role_name: &str) -> Arc<AgentNode>;

    fn get_node(&self, role_name: &str) -> Option<Arc<AgentNode>>;

    /// Visit every live node.
    fn for_each_active_node(&self, f: &mut dyn FnMut(&Arc<AgentNode>));

    fn node_count(&self) -> usize;

    /// Record a worker report, applied on the next sync. Returns false when
    /// no node exists for `role_name`.
    fn heartbeat(&self, role_name: &str, status: AgentCurrentStatus) -> bool;

    /// Apply buffered worker reports to the nodes.
    fn sync_nodes_status(&self);

    /// Drop every live node. Persisted records are left for the GC pass.
    fn clear_all_nodes(&self);

    /// Role names of every persisted node record.
    fn list_persisted_nodes(&self) -> ClusterResult<Vec<String>>;

    /// Delete one persisted node record. Returns true if it existed.
    fn remove_persisted_node(&self, role_name: &str) -> ClusterResult<bool>;
}

/// In-process node registry fed by worker heartbeats.
pub struct HeartbeatRegistry {
    state: StateStore,
    nodes: RwLock<BTreeMap<String, Arc<AgentNode>>>,
    /// Latest report per role since the last sync.
    pending: Mutex<HashMap<String, AgentCurrentStatus>>,
    /// Silence after which a worker is no longer considered ready.
    dead_timeout: Duration,
}

impl HeartbeatRegistry {
    pub fn new(state: StateStore) -> Self {
        Self {
            state,
            nodes: RwLock::new(BTreeMap::new()),
            pending: Mutex::new(HashMap::new()),
            dead_timeout: Duration::from_secs(30),
        }
    }

    /// Set the silence threshold after which a node loses readiness.
    pub fn with_dead_timeout(mut self, timeout: Duration) -> Self {
        self.dead_timeout = timeout;
        self
    }
}

impl NodeRegistry for HeartbeatRegistry {
    fn get_or_create_node(&self, role_name: &str) -> Arc<AgentNode> {
        if let Some(node) = self.nodes.read().get(role_name) {
            return Arc::clone(node);
        }

        let mut nodes = self.nodes.write();
        // Another caller may have created it between the two locks.
        if let Some(node) = nodes.get(role_name) {
            return Arc::clone(node);
        }
        let node = Arc::new(AgentNode::new(role_name));
        nodes.insert(role_name.to_string(), Arc::clone(&node));

        let record = AgentNodeRecord {
            role_name: role_name.to_string(),
            created_at: epoch_secs(),
        };
        if let Err(e) = self.state.put_agent_node(&record) {
            warn!(role = %role_name, error = %e, "failed to persist agent node record");
        }
        info!(role = %role_name, "agent node created");
        node
    }

    fn get_node(&self, role_name: &str) -> Option<Arc<AgentNode>> {
        self.nodes.read().get(role_name).cloned()
    }

    fn for_each_active_node(&self, f: &mut dyn FnMut(&Arc<AgentNode>)) {
        for node in self.nodes.read().values() {
            f(node);
        }
    }

    fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    fn heartbeat(&self, role_name: &str, mut status: AgentCurrentStatus) -> bool {
        if !self.nodes.read().contains_key(role_name) {
            warn!(role = %role_name, "heartbeat from unknown agent node");
            return false;
        }
        if status.heartbeat_at == 0 {
            status.heartbeat_at = epoch_secs();
        }
        self.pending.lock().insert(role_name.to_string(), status);
        debug!(role = %role_name, "heartbeat received");
        true
    }

    fn sync_nodes_status(&self) {
        let reports: HashMap<String, AgentCurrentStatus> = std::mem::take(&mut *self.pending.lock());
        let now = epoch_secs();
        let nodes = self.nodes.read();

        for (role_name, status) in reports {
            if let Some(node) = nodes.get(&role_name) {
                node.update_current_status(status);
            }
        }

        for node in nodes.values() {
            let current = node.current_status();
            if current.service_ready
                && now.saturating_sub(current.heartbeat_at) > self.dead_timeout.as_secs()
            {
                node.mark_not_ready();
                warn!(role = %node.role_name(), "agent heartbeat timed out");
            }
        }
    }

    fn clear_all_nodes(&self) {
        let mut nodes = self.nodes.write();
        let count = nodes.len();
        nodes.clear();
        self.pending.lock().clear();
        info!(count, "agent nodes cleared");
    }

    fn list_persisted_nodes(&self) -> ClusterResult<Vec<String>> {
        Ok(self.state.list_agent_node_names()?)
    }

    fn remove_persisted_node(&self, role_name: &str) -> ClusterResult<bool> {
        Ok(self.state.delete_agent_node(role_name)?)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT: &str = "app.agent.b1.online.1.0";

    fn test_registry() -> HeartbeatRegistry {
        HeartbeatRegistry::new(StateStore::open_in_memory().unwrap())
    }

    fn ready(identifier: &str) -> AgentCurrentStatus {
        AgentCurrentStatus {
            identifier: identifier.to_string(),
            service_ready: true,
            ..AgentCurrentStatus::default()
        }
    }

    #[test]
    fn get_or_create_returns_same_node() {
        let registry = test_registry();
        let a = registry.get_or_create_node(AGENT);
        let b = registry.get_or_create_node(AGENT);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.node_count(), 1);
    }

    #[test]
    fn create_persists_record() {
        let registry = test_registry();
        registry.get_or_create_node(AGENT);
        assert_eq!(registry.list_persisted_nodes().unwrap(), vec![AGENT.to_string()]);
    }

    #[test]
    fn heartbeat_applies_on_sync_only() {
        let registry = test_registry();
        let node = registry.get_or_create_node(AGENT);

        assert!(registry.heartbeat(AGENT, ready("10.0.0.1|1")));
        assert!(node.current_status().identifier.is_empty());

        registry.sync_nodes_status();
        let current = node.current_status();
        assert_eq!(current.identifier, "10.0.0.1|1");
        assert!(current.service_ready);
        assert!(current.heartbeat_at > 0);
    }

    #[test]
    fn heartbeat_unknown_node_is_dropped() {
        let registry = test_registry();
        assert!(!registry.heartbeat(AGENT, ready("10.0.0.1|1")));
    }

    #[test]
    fn silent_node_loses_readiness() {
        let registry = test_registry().with_dead_timeout(Duration::from_secs(5));
        let node = registry.get_or_create_node(AGENT);

        let mut status = ready("10.0.0.1|1");
        status.heartbeat_at = 1000; // Very old.
        registry.heartbeat(AGENT, status);
        registry.sync_nodes_status();

        let current = node.current_status();
        assert!(!current.service_ready);
        assert_eq!(current.identifier, "10.0.0.1|1");
    }

    #[test]
    fn clear_keeps_persisted_records() {
        let registry = test_registry();
        registry.get_or_create_node(AGENT);
        registry.clear_all_nodes();

        assert_eq!(registry.node_count(), 0);
        assert!(registry.get_node(AGENT).is_none());
        assert_eq!(registry.list_persisted_nodes().unwrap().len(), 1);

        assert!(registry.remove_persisted_node(AGENT).unwrap());
        assert!(registry.list_persisted_nodes().unwrap().is_empty());
    }

    #[test]
    fn for_each_visits_all_nodes() {
        let registry = test_registry();
        registry.get_or_create_node("app.agent.b1.online.2.0");
        registry.get_or_create_node("app.agent.b1.online.2.1");

        let mut seen = Vec::new();
        registry.for_each_active_node(&mut |node| seen.push(node.role_name().to_string()));
        assert_eq!(seen.len(), 2);
    }
}
