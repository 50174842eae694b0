//! Scheduler error types.

use thiserror::Error;

/// Errors returned by agent-role declaration and persistence.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("agent role {0}: launch plan has no processes")]
    EmptyAgentInfo(String),

    #[error("agent role {0}: launch plan lacks the heartbeat_mode argument")]
    MissingHeartbeatMode(String),

    #[error("agent role {agent}: invalid target pattern {pattern:?}: {source}")]
    InvalidTargetPattern {
        agent: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("agent role {name}: {reason}")]
    InvalidAgentName { name: String, reason: String },

    #[error("state store error: {0}")]
    State(#[from] slotshare_state::StateError),

    #[error("blacklist encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
