//! slotshare-core — shared types for the SlotShare control plane.
//!
//! - [`types`]: launch plans, application plans, slots and slot identities
//! - [`naming`]: structured agent-role names and their flat string form
//! - [`config`]: the daemon's TOML configuration and agent-role declarations

pub mod config;
pub mod naming;
pub mod types;

pub use config::{AgentRoleConfig, AgentRoleInfo, ClusterConfig, DaemonConfig, SchedulerConfig};
pub use naming::{owning_partition, role_hash, AgentRoleName, NamingError, HASH_RANGE};
pub use types::*;
