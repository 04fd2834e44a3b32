//! Domain types owned by the inventory.
//!
//! Identity records (`Node`, `Container`) are kept apart from their
//! observed status (`NodeStatus`, `ContainerStatus`). A container and its
//! status are created together and share the same id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};
use crate::image::Image;
use crate::status::{State, StatusRecord};

/// Opaque unique identifier for a node.
pub type NodeId = String;

/// Opaque unique identifier for a container (and its status).
pub type ContainerId = String;

/// Facts reported by a resource provider; not interpreted by the fleet.
pub type ResourceInfo = HashMap<String, String>;

/// Options passed through to the container runtime untouched.
pub type ContainerOptions = HashMap<String, String>;

/// Namespace assigned to node statuses when none is given.
pub const DEFAULT_NAMESPACE: &str = "default";

// ── Node ──────────────────────────────────────────────────────────

/// A machine capable of hosting containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Human-readable unique name (`node-<n>`).
    pub name: String,
    /// Mirror of the status state, kept in sync by the inventory.
    pub state: State,
    /// Resource facts returned by the provider when the node was run.
    pub resource_info: ResourceInfo,
    /// Name of the resource provider that manages this node.
    pub provider: String,
}

/// Observed status of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub name: String,
    pub namespace: String,
    #[serde(flatten)]
    pub record: StatusRecord,
    pub load_average: f64,
    pub memory_mb: u64,
    pub disk_gb: u64,
}

impl NodeStatus {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            record: StatusRecord::new("created"),
            load_average: 0.0,
            memory_mb: 0,
            disk_gb: 0,
        }
    }

    pub fn state(&self) -> State {
        self.record.state
    }
}

// ── Container ─────────────────────────────────────────────────────

/// A workload instance bound to exactly one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    /// Shared with the container's status record.
    pub id: ContainerId,
    /// Name on the node; unique per node.
    pub name: String,
    /// Runtime-specific hash, empty until the runtime reports one.
    pub hash: String,
    pub node_id: NodeId,
    pub node_name: String,
    pub image: Image,
    /// Image id on the node, empty until pulled.
    pub image_id: String,
    pub options: ContainerOptions,
}

/// Observed status of a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub id: ContainerId,
    pub name: String,
    pub node_name: String,
    #[serde(flatten)]
    pub record: StatusRecord,
}

impl ContainerStatus {
    pub fn new(id: &str, name: &str, node_name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            node_name: node_name.to_string(),
            record: StatusRecord::new("created"),
        }
    }

    pub fn state(&self) -> State {
        self.record.state
    }
}

// ── Selectors ─────────────────────────────────────────────────────

/// How to find a node: by id or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKey {
    Id(NodeId),
    Name(String),
}

impl NodeKey {
    /// Build a key from optional parts; the id wins when both are set.
    pub fn from_parts(id: Option<&str>, name: Option<&str>) -> StateResult<Self> {
        match (non_empty(id), non_empty(name)) {
            (Some(id), _) => Ok(Self::Id(id.to_string())),
            (None, Some(name)) => Ok(Self::Name(name.to_string())),
            (None, None) => Err(StateError::InvalidSelector("id or name required")),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Id(id) => format!("id:{id}"),
            Self::Name(name) => format!("name:{name}"),
        }
    }
}

/// How to find a container: by id, or by name together with its node name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerKey {
    Id(ContainerId),
    Name { name: String, node_name: String },
}

impl ContainerKey {
    /// Build a key from optional parts.
    ///
    /// Requires either an id or both a name and a node name.
    pub fn from_parts(
        id: Option<&str>,
        name: Option<&str>,
        node_name: Option<&str>,
    ) -> StateResult<Self> {
        match (non_empty(id), non_empty(name), non_empty(node_name)) {
            (Some(id), _, _) => Ok(Self::Id(id.to_string())),
            (None, Some(name), Some(node_name)) => Ok(Self::Name {
                name: name.to_string(),
                node_name: node_name.to_string(),
            }),
            _ => Err(StateError::InvalidSelector(
                "id or (name and node_name) required",
            )),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Id(id) => format!("id:{id}"),
            Self::Name { name, node_name } => format!("name:{name}, node_name:{node_name}"),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
