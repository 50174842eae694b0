//! Shared types used across SlotShare crates.
//!
//! These mirror what the plan builder and the cluster scheduler exchange:
//! per-role launch plans, the application plan that bundles them, and the
//! physical slots the cluster scheduler hands back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of a role (agent or target).
pub type RoleName = String;

/// Process argument an agent launch plan must carry so the worker reports
/// its status through heartbeats.
pub const HEARTBEAT_MODE_ARG: &str = "heartbeat_mode";

// ── Launch plan ───────────────────────────────────────────────────

/// Kind of a deployable package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    #[default]
    Archive,
    Image,
    Rpm,
}

/// A package a worker process needs installed before launch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageInfo {
    pub uri: String,
    #[serde(default)]
    pub kind: PackageKind,
}

/// Declared resources of a slot or a launch plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// CPU in hundredths of a core.
    #[serde(default)]
    pub cpu: u64,
    /// Memory in megabytes.
    #[serde(default)]
    pub mem: u64,
}

/// One process launched inside a slot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: String,
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<(String, String)>,
    #[serde(default)]
    pub envs: Vec<(String, String)>,
}

/// Everything needed to start the worker of one role.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LaunchPlan {
    #[serde(default)]
    pub packages: Vec<PackageInfo>,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default)]
    pub processes: Vec<ProcessInfo>,
}

impl LaunchPlan {
    /// A plan without processes launches nothing.
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Whether any process carries a non-empty heartbeat-mode argument.
    pub fn has_heartbeat_mode(&self) -> bool {
        self.processes.iter().any(|p| {
            p.args
                .iter()
                .any(|(k, v)| k == HEARTBEAT_MODE_ARG && !v.is_empty())
        })
    }

    /// Exact package sequence equality: same URIs, same kinds, same order.
    pub fn packages_match(&self, other: &LaunchPlan) -> bool {
        self.packages == other.packages
    }
}

/// The full resource plan of an application: role name → launch plan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppPlan {
    #[serde(default)]
    pub roles: BTreeMap<RoleName, LaunchPlan>,
}

impl AppPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for assembling plans.
    pub fn with_role(mut self, name: impl Into<RoleName>, plan: LaunchPlan) -> Self {
        self.roles.insert(name.into(), plan);
        self
    }

    pub fn contains(&self, role_name: &str) -> bool {
        self.roles.contains_key(role_name)
    }
}

// ── Slots ─────────────────────────────────────────────────────────

/// Physical slot identifier assigned by the cluster scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId {
    pub ip: String,
    pub id: u64,
}

impl SlotId {
    pub fn new(ip: impl Into<String>, id: u64) -> Self {
        Self { ip: ip.into(), id }
    }

    /// The `ip|id` identity of this slot.
    pub fn identifier(&self) -> String {
        format!("{}|{}", self.ip, self.id)
    }
}

/// A slot as reported for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub slot_id: SlotId,
    /// Role the slot is reported for.
    pub role: RoleName,
    /// The cluster scheduler is taking this slot back.
    #[serde(default)]
    pub reclaiming: bool,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

/// All slots of one role.
pub type RoleSlots = Vec<SlotInfo>;

/// Identity of a slot list: `ip|id` of every non-reclaiming slot, joined by `;`.
///
/// Empty when every slot is reclaiming or the list is empty.
pub fn slots_identifier(slots: &[SlotInfo]) -> String {
    join_identifiers(slots.iter().filter(|s| !s.reclaiming))
}

/// Address of a slot list: `ip|id` of every slot, reclaiming ones included.
pub fn slots_address(slots: &[SlotInfo]) -> String {
    join_identifiers(slots.iter())
}

fn join_identifiers<'a>(slots: impl Iterator<Item = &'a SlotInfo>) -> String {
    slots
        .map(|s| s.slot_id.identifier())
        .collect::<Vec<_>>()
        .join(";")
}

/// How the cluster scheduler should treat hosts of released slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceKind {
    #[default]
    Default,
    Prefer,
    NotPrefer,
}

/// Host preference attached to a slot release.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReleasePreference {
    pub kind: PreferenceKind,
    /// How long the preference stays in effect.
    pub lease_secs: u64,
}

/// Sum of declared resources across a set of slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceTotals {
    pub cpu: u64,
    pub mem: u64,
    pub slots: u64,
}

impl ResourceTotals {
    pub fn add(&mut self, resources: &ResourceRequirements) {
        self.cpu = self.cpu.saturating_add(resources.cpu);
        self.mem = self.mem.saturating_add(resources.mem);
        self.slots = self.slots.saturating_add(1);
    }
}
