//! slotshare-scheduler — the agent-sharing scheduler.
//!
//! Wraps a [`ClusterScheduler`](slotshare_cluster::ClusterScheduler) and lets
//! long-lived *agent roles* host many lightweight *target roles* on their
//! slots. The scheduler:
//!
//! - Rewrites incoming application plans so claimed targets ride on agents
//! - Answers slot queries for those targets from the agents' slots
//! - Blacklists (target, agent) pairs that failed, with a per-agent cooldown
//! - Reconciles against live slots and heartbeats on a background loop
//! - Persists the blacklist so it survives restarts
//!
//! # Architecture
//!
//! ```text
//! AgentSharingScheduler
//!   ├── Mutex<SchedulerState>
//!   │     ├── AgentRegistry (declared agents, build-id index)
//!   │     ├── TargetRoleMap (target → agent, rebuilt per plan)
//!   │     ├── Blacklist (versioned, persisted as zstd JSON)
//!   │     └── AgentSlotState per agent (identity cache)
//!   ├── ClusterScheduler (rewritten plan in, slots out)
//!   ├── NodeRegistry (agent nodes, heartbeats)
//!   └── StateStore (blacklist blob)
//! ```

pub mod agent;
pub mod blacklist;
pub mod error;
pub mod reconcile;
pub mod rewrite;
pub mod scheduler;
pub mod slots;
pub mod stats;

pub use agent::{AgentEntry, AgentRegistry};
pub use blacklist::{Blacklist, BlacklistEntry};
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{AgentSharingScheduler, Clock};
pub use stats::{render_prometheus, SchedulerStats};
