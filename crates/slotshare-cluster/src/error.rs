//! Cluster error types.

use thiserror::Error;

/// Errors raised by node registry operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("state store error: {0}")]
    State(#[from] slotshare_state::StateError),
}

pub type ClusterResult<T> = Result<T, ClusterError>;
