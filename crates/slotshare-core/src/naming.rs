//! Agent-role naming.
//!
//! Agent roles are generated with structured names so they can be parsed
//! back into their build and partition coordinates:
//!
//! ```text
//! {app}.agent.{build_id}.{config_name}.{partition_count}.{index}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Marker segment separating the application from the agent coordinates.
const AGENT_MARKER: &str = "agent";

/// Size of the hash space split between dynamically mapped agents.
pub const HASH_RANGE: u32 = 65_536;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("not an agent role name: {0}")]
    NotAgentRole(String),
    #[error("agent role {name} belongs to application {found}, expected {expected}")]
    ForeignApp {
        name: String,
        found: String,
        expected: String,
    },
    #[error("invalid partition in agent role name {name}: {reason}")]
    InvalidPartition { name: String, reason: String },
}

/// Structured identity of an agent role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentRoleName {
    pub app: String,
    pub build_id: String,
    pub config_name: String,
    pub partition_count: u32,
    pub index: u32,
}

impl AgentRoleName {
    pub fn new(
        app: impl Into<String>,
        build_id: impl Into<String>,
        config_name: impl Into<String>,
        partition_count: u32,
        index: u32,
    ) -> Self {
        Self {
            app: app.into(),
            build_id: build_id.into(),
            config_name: config_name.into(),
            partition_count,
            index,
        }
    }

    /// Parse `name` and require it to belong to application `app`.
    pub fn parse(app: &str, name: &str) -> Result<Self, NamingError> {
        let parsed: AgentRoleName = name.parse()?;
        if parsed.app != app {
            return Err(NamingError::ForeignApp {
                name: name.to_string(),
                found: parsed.app,
                expected: app.to_string(),
            });
        }
        Ok(parsed)
    }
}

impl FromStr for AgentRoleName {
    type Err = NamingError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let not_agent = || NamingError::NotAgentRole(name.to_string());

        let parts: Vec<&str> = name.split('.').collect();
        let [app, marker, build_id, config_name, count, index] = parts.as_slice() else {
            return Err(not_agent());
        };
        if *marker != AGENT_MARKER
            || app.is_empty()
            || build_id.is_empty()
            || config_name.is_empty()
        {
            return Err(not_agent());
        }

        let invalid = |reason: &str| NamingError::InvalidPartition {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        let partition_count: u32 = count.parse().map_err(|_| invalid("count is not a number"))?;
        let index: u32 = index.parse().map_err(|_| invalid("index is not a number"))?;
        if partition_count == 0 {
            return Err(invalid("count must be at least 1"));
        }
        if index >= partition_count {
            return Err(invalid("index out of range"));
        }

        Ok(Self::new(*app, *build_id, *config_name, partition_count, index))
    }
}

impl fmt::Display for AgentRoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}.{}",
            self.app, AGENT_MARKER, self.build_id, self.config_name, self.partition_count, self.index
        )
    }
}

/// Position of a role name in the dynamic-mapping hash space.
///
/// First four bytes of the SHA-256 of the name, reduced to [`HASH_RANGE`].
pub fn role_hash(role_name: &str) -> u32 {
    let digest = Sha256::digest(role_name.as_bytes());
    let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    head % HASH_RANGE
}

/// Index of the partition whose range owns `role_name` when the hash space
/// is split into `partition_count` equal ranges.
pub fn owning_partition(role_name: &str, partition_count: u32) -> u32 {
    if partition_count == 0 {
        return 0;
    }
    let hash = u64::from(role_hash(role_name));
    (hash * u64::from(partition_count) / u64::from(HASH_RANGE)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display() {
        let name = AgentRoleName::new("search", "b42", "online", 4, 2);
        let flat = name.to_string();
        assert_eq!(flat, "search.agent.b42.online.4.2");
        assert_eq!(AgentRoleName::parse("search", &flat).unwrap(), name);
    }

    #[test]
    fn rejects_other_applications() {
        let err = AgentRoleName::parse("search", "ads.agent.b42.online.4.2").unwrap_err();
        assert!(matches!(err, NamingError::ForeignApp { .. }));
    }

    #[test]
    fn rejects_malformed_names() {
        for name in [
            "search",
            "search.worker.b42.online.4.2",
            "search.agent.b42.online.4",
            "search.agent..online.4.2",
            "search.agent.b42.online.x.2",
        ] {
            assert!(
                matches!(
                    name.parse::<AgentRoleName>(),
                    Err(NamingError::NotAgentRole(_)) | Err(NamingError::InvalidPartition { .. })
                ),
                "{name} should not parse"
            );
        }
    }

    #[test]
    fn rejects_out_of_range_partition() {
        assert!(matches!(
            "search.agent.b42.online.4.4".parse::<AgentRoleName>(),
            Err(NamingError::InvalidPartition { .. })
        ));
        assert!(matches!(
            "search.agent.b42.online.0.0".parse::<AgentRoleName>(),
            Err(NamingError::InvalidPartition { .. })
        ));
    }

    #[test]
    fn owning_partition_is_stable_and_in_range() {
        for role in ["T1", "T2", "searcher.3", "qrs.0"] {
            let first = owning_partition(role, 4);
            assert!(first < 4);
            assert_eq!(first, owning_partition(role, 4));
            assert_eq!(owning_partition(role, 1), 0);
        }
    }
}
