//! Error types for the fleet inventory.

use thiserror::Error;

use crate::status::State;

/// Result type alias for inventory operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors raised by the inventory and the types it owns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// The container is registered but has no status record.
    #[error("container status not found: {0}")]
    ContainerStatusNotFound(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The node is registered but has no status record.
    #[error("node status not found: {0}")]
    NodeStatusNotFound(String),

    /// Containers may only be placed on a running node.
    #[error("node not running: {0}")]
    NodeNotRunning(String),

    #[error("duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("node name space exhausted below ceiling {0}")]
    NameSpaceExhausted(u64),

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: State, to: State },

    #[error("invalid selector: {0}")]
    InvalidSelector(&'static str),
}
