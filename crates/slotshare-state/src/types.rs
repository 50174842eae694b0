//! Persisted record types.

use serde::{Deserialize, Serialize};

/// Key of the compressed agent blacklist blob.
pub const BLACKLIST_KEY: &str = "agent_blacklist";

/// Durable trace of an agent node, written when the node is first created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentNodeRecord {
    pub role_name: String,
    /// Unix timestamp (seconds) when the node was created.
    pub created_at: u64,
}
