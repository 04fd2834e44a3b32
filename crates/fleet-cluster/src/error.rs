//! Control-plane error types.

use thiserror::Error;

use fleet_state::StateError;

/// Errors surfaced by the cluster service.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    #[error("already running: {0}")]
    AlreadyRunning(String),

    #[error("no eligible node for placement")]
    NoEligibleNode,

    /// The node has no attached runtime client.
    #[error("node not running: {0}")]
    NodeNotRunning(String),

    #[error("{operation} failed: {source}")]
    Provider {
        operation: &'static str,
        source: anyhow::Error,
    },

    /// Neither the graceful stop nor the forced removal was acknowledged.
    #[error("kill timed out for node {node} after {waited_ms}ms")]
    KillTimeout { node: String, waited_ms: u64 },

    #[error(transparent)]
    State(#[from] StateError),
}

impl ClusterError {
    pub(crate) fn provider(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Provider { operation, source }
    }
}

pub type ClusterResult<T> = Result<T, ClusterError>;
