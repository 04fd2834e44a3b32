//! Collaborator interfaces consumed by the control plane.
//!
//! A [`ResourceProvider`] runs, stops, and removes nodes on some substrate
//! (VM hypervisor, bare metal agent, cloud API). Running a node yields a
//! [`ContainerRuntimeClient`] that performs container lifecycle operations
//! on that node. Neither is implemented here beyond the in-memory
//! substrate in [`crate::memory`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fleet_state::{Container, Node, ResourceInfo, State};

/// Result of running a node.
pub struct RunningNode {
    /// Opaque facts stored on the node as-is.
    pub resource_info: ResourceInfo,
    /// Runtime attached to the node while it runs.
    pub client: Arc<dyn ContainerRuntimeClient>,
}

/// What a provider currently reports about a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeObservation {
    pub state: State,
    pub load_average: f64,
    pub memory_mb: u64,
    pub disk_gb: u64,
}

/// What a runtime currently reports about a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerObservation {
    pub state: State,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
}

/// Substrate driver that manages node machines.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Name recorded on every node this provider manages.
    fn name(&self) -> &str;

    async fn run_node(&self, node: &Node) -> anyhow::Result<RunningNode>;

    /// Ask the node to shut down. Resolves once the node reports exit.
    async fn stop_node(&self, node: &Node) -> anyhow::Result<()>;

    /// Tear the node down without waiting for it to cooperate.
    async fn remove_node(&self, node: &Node) -> anyhow::Result<()>;

    async fn inspect_node(&self, node: &Node) -> anyhow::Result<NodeObservation>;
}

/// Container lifecycle operations on one running node.
#[async_trait]
pub trait ContainerRuntimeClient: Send + Sync {
    async fn start_container(&self, container: &Container) -> anyhow::Result<()>;

    async fn stop_container(&self, container: &Container) -> anyhow::Result<()>;

    async fn inspect_container(&self, container: &Container)
    -> anyhow::Result<ContainerObservation>;
}
