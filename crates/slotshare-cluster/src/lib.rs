//! slotshare-cluster — the live side of the control plane.
//!
//! Defines the two collaborators the agent-sharing scheduler drives, and a
//! reference implementation of each:
//!
//! ```text
//! NodeRegistry (trait)
//!   └── HeartbeatRegistry
//!       ├── One AgentNode per agent role (target status + current status)
//!       ├── Buffers worker heartbeats until sync_nodes_status()
//!       └── Persists a record per node to the StateStore
//!
//! ClusterScheduler (trait)
//!   └── LocalClusterScheduler
//!       ├── One slot per role of the submitted plan
//!       ├── Round-robin host assignment
//!       └── Release + reclaim simulation
//! ```

pub mod error;
pub mod node;
pub mod registry;
pub mod scheduler;

pub use error::{ClusterError, ClusterResult};
pub use node::{AgentCurrentStatus, AgentNode, AgentTarget, AgentTargetStatus};
pub use registry::{HeartbeatRegistry, NodeRegistry};
pub use scheduler::{ClusterScheduler, LocalClusterScheduler};
