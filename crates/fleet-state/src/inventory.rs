//! Inventory — the authoritative registry of nodes and containers.
//!
//! Each entity type lives in its own table behind a `tokio::sync::RwLock`.
//! A table's primary list, status map, and indices are only mutated under
//! one write guard, so readers always see a fully indexed entity or none
//! at all. When both tables are needed the node table is locked first.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::image::Image;
use crate::naming::NameGenerator;
use crate::status::State;
use crate::types::*;

#[derive(Debug, Default)]
struct NodeTable {
    /// Registration order.
    nodes: Vec<Node>,
    statuses: HashMap<NodeId, NodeStatus>,
    by_id: HashMap<NodeId, usize>,
    by_name: HashMap<String, usize>,
    names: NameGenerator,
}

impl NodeTable {
    fn get(&self, id: &str) -> StateResult<&Node> {
        self.by_id
            .get(id)
            .map(|&i| &self.nodes[i])
            .ok_or_else(|| StateError::NodeNotFound(id.to_string()))
    }

    fn find(&self, key: &NodeKey) -> Option<&Node> {
        let idx = match key {
            NodeKey::Id(id) => self.by_id.get(id),
            NodeKey::Name(name) => self.by_name.get(name),
        };
        idx.map(|&i| &self.nodes[i])
    }

    fn is_live(&self, id: &str) -> bool {
        self.statuses.get(id).is_some_and(|s| s.state().is_live())
    }
}

#[derive(Debug, Default)]
struct ContainerTable {
    /// Registration order.
    containers: Vec<Container>,
    statuses: HashMap<ContainerId, ContainerStatus>,
    by_id: HashMap<ContainerId, usize>,
    by_name: HashMap<(String, String), usize>,
    /// Sequence used for generated container names.
    seq: u64,
}

impl ContainerTable {
    fn find(&self, key: &ContainerKey) -> Option<&Container> {
        let idx = match key {
            ContainerKey::Id(id) => self.by_id.get(id),
            ContainerKey::Name { name, node_name } => {
                self.by_name.get(&(name.clone(), node_name.clone()))
            }
        };
        idx.map(|&i| &self.containers[i])
    }

    fn is_live(&self, id: &str) -> bool {
        self.statuses.get(id).is_some_and(|s| s.state().is_live())
    }
}

/// Shared registry of nodes, containers, and their status records.
///
/// Explicitly constructed and passed around (typically behind an `Arc`);
/// there is no process-wide instance.
#[derive(Debug, Default)]
pub struct Inventory {
    nodes: RwLock<NodeTable>,
    containers: RwLock<ContainerTable>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom name generator (e.g. a small ceiling in tests).
    pub fn with_name_generator(names: NameGenerator) -> Self {
        Self {
            nodes: RwLock::new(NodeTable {
                names,
                ..NodeTable::default()
            }),
            containers: RwLock::new(ContainerTable::default()),
        }
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Reserve a name and register a new node with its status record.
    ///
    /// Name reservation and registration happen under one write guard, so
    /// concurrent callers can never claim the same name.
    pub async fn create_node(&self, id: NodeId, provider: &str) -> StateResult<Node> {
        let mut table = self.nodes.write().await;
        if table.by_id.contains_key(&id) {
            return Err(StateError::DuplicateId { kind: "node", id });
        }

        let node_count = table.nodes.len();
        let NodeTable { names, by_name, .. } = &mut *table;
        let name = names.next_name(node_count, |n| by_name.contains_key(n))?;

        let node = Node {
            id: id.clone(),
            name: name.clone(),
            state: State::Unknown,
            resource_info: ResourceInfo::new(),
            provider: provider.to_string(),
        };
        let status = NodeStatus::new(&id, &name);

        let idx = table.nodes.len();
        table.nodes.push(node.clone());
        table.statuses.insert(id.clone(), status);
        table.by_id.insert(id.clone(), idx);
        table.by_name.insert(name.clone(), idx);

        debug!(node_id = %id, node_name = %name, "node registered");
        Ok(node)
    }

    /// List nodes in registration order.
    ///
    /// With `all = false` only nodes whose status is live (neither
    /// `Unknown` nor `Exited`) are returned.
    pub async fn nodes(&self, all: bool) -> Vec<Node> {
        let table = self.nodes.read().await;
        table
            .nodes
            .iter()
            .filter(|n| all || table.is_live(&n.id))
            .cloned()
            .collect()
    }

    pub async fn node(&self, id: &str) -> StateResult<Node> {
        let table = self.nodes.read().await;
        table.get(id).cloned()
    }

    pub async fn find_node(&self, key: &NodeKey) -> StateResult<Node> {
        let table = self.nodes.read().await;
        table
            .find(key)
            .cloned()
            .ok_or_else(|| StateError::NodeNotFound(key.describe()))
    }

    /// Look up a node status by id or name.
    ///
    /// Fails with `NodeStatusNotFound` when the node is registered but has
    /// no status, and with `NodeNotFound` when nothing matches at all.
    pub async fn node_status(&self, key: &NodeKey) -> StateResult<NodeStatus> {
        let table = self.nodes.read().await;
        let node = table
            .find(key)
            .ok_or_else(|| StateError::NodeNotFound(key.describe()))?;
        table
            .statuses
            .get(&node.id)
            .cloned()
            .ok_or_else(|| StateError::NodeStatusNotFound(key.describe()))
    }

    /// Snapshot of every node status, in node registration order.
    pub async fn node_statuses(&self) -> Vec<NodeStatus> {
        let table = self.nodes.read().await;
        table
            .nodes
            .iter()
            .filter_map(|n| table.statuses.get(&n.id).cloned())
            .collect()
    }

    /// Mutate a node's status record.
    ///
    /// The node's mirrored `state` is refreshed from the record afterwards,
    /// even when `f` fails after a partial update.
    pub async fn update_node_status<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut NodeStatus) -> StateResult<T>,
    ) -> StateResult<T> {
        let mut table = self.nodes.write().await;
        let idx = *table
            .by_id
            .get(id)
            .ok_or_else(|| StateError::NodeNotFound(id.to_string()))?;
        let status = table
            .statuses
            .get_mut(id)
            .ok_or_else(|| StateError::NodeStatusNotFound(id.to_string()))?;
        let result = f(status);
        let state = status.state();
        table.nodes[idx].state = state;
        result
    }

    /// Replace the provider facts recorded for a node.
    pub async fn set_resource_info(&self, id: &str, info: ResourceInfo) -> StateResult<()> {
        let mut table = self.nodes.write().await;
        let idx = *table
            .by_id
            .get(id)
            .ok_or_else(|| StateError::NodeNotFound(id.to_string()))?;
        table.nodes[idx].resource_info = info;
        Ok(())
    }

    // ── Containers ─────────────────────────────────────────────────

    /// Register a container and its status on `node_id`.
    ///
    /// The node must exist and be `Running`. The node table stays
    /// read-locked until the container is indexed, so the node cannot be
    /// killed in between.
    pub async fn create_container(
        &self,
        id: ContainerId,
        node_id: &str,
        image: Image,
        options: ContainerOptions,
    ) -> StateResult<Container> {
        let nodes = self.nodes.read().await;
        let node = nodes.get(node_id)?;
        if nodes.statuses.get(node_id).map(NodeStatus::state) != Some(State::Running) {
            return Err(StateError::NodeNotRunning(node.name.clone()));
        }

        let mut table = self.containers.write().await;
        if table.by_id.contains_key(&id) {
            return Err(StateError::DuplicateId {
                kind: "container",
                id,
            });
        }

        table.seq += 1;
        let name = format!("{}-{}", image.basename(), table.seq);
        let container = Container {
            id: id.clone(),
            name: name.clone(),
            hash: String::new(),
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            image,
            image_id: String::new(),
            options,
        };
        let status = ContainerStatus::new(&id, &name, &node.name);

        let idx = table.containers.len();
        table.containers.push(container.clone());
        table.statuses.insert(id.clone(), status);
        table.by_id.insert(id.clone(), idx);
        table.by_name.insert((name, node.name.clone()), idx);

        debug!(container_id = %id, node = %node.name, "container registered");
        Ok(container)
    }

    /// List containers in registration order.
    ///
    /// With `all = false` containers in `Unknown` or `Exited` are skipped.
    pub async fn containers(&self, all: bool) -> Vec<Container> {
        let table = self.containers.read().await;
        table
            .containers
            .iter()
            .filter(|c| all || table.is_live(&c.id))
            .cloned()
            .collect()
    }

    pub async fn container(&self, id: &str) -> StateResult<Container> {
        let table = self.containers.read().await;
        table
            .by_id
            .get(id)
            .map(|&i| table.containers[i].clone())
            .ok_or_else(|| StateError::ContainerNotFound(id.to_string()))
    }

    /// All containers placed on a node, in registration order.
    pub async fn containers_on_node(&self, node_id: &str) -> Vec<Container> {
        let table = self.containers.read().await;
        table
            .containers
            .iter()
            .filter(|c| c.node_id == node_id)
            .cloned()
            .collect()
    }

    /// Number of live containers per node id.
    pub async fn live_containers_per_node(&self) -> HashMap<NodeId, usize> {
        let table = self.containers.read().await;
        let mut counts = HashMap::new();
        for container in table.containers.iter().filter(|c| table.is_live(&c.id)) {
            *counts.entry(container.node_id.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Look up a container status by id or by (name, node name).
    ///
    /// Fails with `ContainerStatusNotFound` when a container matches but no
    /// status does, and with `ContainerNotFound` when neither matches.
    pub async fn container_status(&self, key: &ContainerKey) -> StateResult<ContainerStatus> {
        let table = self.containers.read().await;
        let container = table
            .find(key)
            .ok_or_else(|| StateError::ContainerNotFound(key.describe()))?;
        table
            .statuses
            .get(&container.id)
            .cloned()
            .ok_or_else(|| StateError::ContainerStatusNotFound(key.describe()))
    }

    /// Mutate a container's status record.
    pub async fn update_container_status<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut ContainerStatus) -> StateResult<T>,
    ) -> StateResult<T> {
        let mut table = self.containers.write().await;
        if !table.by_id.contains_key(id) {
            return Err(StateError::ContainerNotFound(id.to_string()));
        }
        let status = table
            .statuses
            .get_mut(id)
            .ok_or_else(|| StateError::ContainerStatusNotFound(id.to_string()))?;
        f(status)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    fn image() -> Image {
        Image::parse("registry/api:v1").unwrap()
    }

    async fn running_node(inv: &Inventory, id: &str) -> Node {
        let node = inv.create_node(id.to_string(), "memory").await.unwrap();
        inv.update_node_status(id, |s| s.record.transition(State::Running, "started"))
            .await
            .unwrap();
        node
    }

    #[tokio::test]
    async fn inventory_starts_empty() {
        let inv = Inventory::new();
        assert!(inv.nodes(true).await.is_empty());
        assert!(inv.containers(true).await.is_empty());
        assert!(inv.containers(false).await.is_empty());
    }

    #[tokio::test]
    async fn create_node_registers_status_and_indices() {
        let inv = Inventory::new();
        let node = inv.create_node("n1".to_string(), "memory").await.unwrap();

        assert_eq!(node.name, "node-1");
        assert_eq!(node.state, State::Unknown);
        assert_eq!(inv.node("n1").await.unwrap(), node);
        assert_eq!(
            inv.find_node(&NodeKey::Name("node-1".to_string())).await.unwrap().id,
            "n1"
        );

        let status = inv.node_status(&NodeKey::Id("n1".to_string())).await.unwrap();
        assert_eq!(status.name, "node-1");
        assert_eq!(status.state(), State::Unknown);
    }

    #[tokio::test]
    async fn duplicate_node_id_is_rejected() {
        let inv = Inventory::new();
        inv.create_node("n1".to_string(), "memory").await.unwrap();
        let err = inv.create_node("n1".to_string(), "memory").await.unwrap_err();
        assert!(matches!(err, StateError::DuplicateId { kind: "node", .. }));
        assert_eq!(inv.nodes(true).await.len(), 1);
    }

    #[tokio::test]
    async fn filtered_nodes_hide_unknown_and_exited() {
        let inv = Inventory::new();
        inv.create_node("n1".to_string(), "memory").await.unwrap();
        running_node(&inv, "n2").await;
        running_node(&inv, "n3").await;
        inv.update_node_status("n3", |s| s.record.transition(State::Exited, "stopped"))
            .await
            .unwrap();

        let live: Vec<String> = inv.nodes(false).await.into_iter().map(|n| n.id).collect();
        assert_eq!(live, vec!["n2"]);
        assert_eq!(inv.nodes(true).await.len(), 3);
        assert_eq!(inv.node("n3").await.unwrap().state, State::Exited);
    }

    #[tokio::test]
    async fn node_status_lookup_by_name_and_missing() {
        let inv = Inventory::new();
        inv.create_node("n1".to_string(), "memory").await.unwrap();

        let status = inv.node_status(&NodeKey::Name("node-1".to_string())).await.unwrap();
        assert_eq!(status.id, "n1");

        let err = inv.node_status(&NodeKey::Id("nope".to_string())).await.unwrap_err();
        assert!(matches!(err, StateError::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn node_registered_without_status_is_distinguished() {
        let inv = Inventory::new();
        inv.create_node("n1".to_string(), "memory").await.unwrap();
        inv.nodes.write().await.statuses.remove("n1");

        let err = inv.node_status(&NodeKey::Id("n1".to_string())).await.unwrap_err();
        assert!(matches!(err, StateError::NodeStatusNotFound(_)));
        let err = inv
            .node_status(&NodeKey::Name("node-1".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::NodeStatusNotFound(_)));
    }

    #[tokio::test]
    async fn create_container_requires_node() {
        let inv = Inventory::new();
        let err = inv
            .create_container("c1".to_string(), "missing", image(), ContainerOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::NodeNotFound(_)));
        assert!(inv.containers(true).await.is_empty());
    }

    #[tokio::test]
    async fn create_container_requires_running_node() {
        let inv = Inventory::new();
        inv.create_node("n1".to_string(), "memory").await.unwrap();
        let err = inv
            .create_container("c1".to_string(), "n1", image(), ContainerOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err, StateError::NodeNotRunning("node-1".to_string()));

        running_node(&inv, "n2").await;
        inv.update_node_status("n2", |s| s.record.transition(State::Exited, "stopped"))
            .await
            .unwrap();
        let err = inv
            .create_container("c1".to_string(), "n2", image(), ContainerOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::NodeNotRunning(_)));
        assert!(inv.containers(true).await.is_empty());
    }

    #[tokio::test]
    async fn create_container_registers_status_together() {
        let inv = Inventory::new();
        running_node(&inv, "n1").await;

        let mut options = ContainerOptions::new();
        options.insert("restart".to_string(), "always".to_string());
        let container = inv
            .create_container("c1".to_string(), "n1", image(), options.clone())
            .await
            .unwrap();

        assert_eq!(container.name, "api-1");
        assert_eq!(container.node_id, "n1");
        assert_eq!(container.node_name, "node-1");
        assert_eq!(container.options, options);

        let status = inv
            .container_status(&ContainerKey::Id("c1".to_string()))
            .await
            .unwrap();
        assert_eq!(status.id, container.id);
        assert_eq!(status.node_name, "node-1");
        assert_eq!(status.state(), State::Unknown);
        assert_eq!(status.record.reason, "created");

        let by_name = inv
            .container_status(&ContainerKey::Name {
                name: "api-1".to_string(),
                node_name: "node-1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(by_name, status);
    }

    #[tokio::test]
    async fn duplicate_container_id_is_rejected() {
        let inv = Inventory::new();
        running_node(&inv, "n1").await;
        inv.create_container("c1".to_string(), "n1", image(), ContainerOptions::new())
            .await
            .unwrap();
        let err = inv
            .create_container("c1".to_string(), "n1", image(), ContainerOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::DuplicateId { kind: "container", .. }));
    }

    #[tokio::test]
    async fn container_status_not_found_tiers() {
        let inv = Inventory::new();
        running_node(&inv, "n1").await;
        inv.create_container("c1".to_string(), "n1", image(), ContainerOptions::new())
            .await
            .unwrap();

        let err = inv
            .container_status(&ContainerKey::Id("ghost".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::ContainerNotFound(_)));

        inv.containers.write().await.statuses.remove("c1");
        let err = inv
            .container_status(&ContainerKey::Id("c1".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::ContainerStatusNotFound(_)));
    }

    #[tokio::test]
    async fn filtered_containers_follow_status() {
        let inv = Inventory::new();
        running_node(&inv, "n1").await;
        for id in ["c1", "c2", "c3"] {
            inv.create_container(id.to_string(), "n1", image(), ContainerOptions::new())
                .await
                .unwrap();
        }
        inv.update_container_status("c2", |s| s.record.transition(State::Running, "started"))
            .await
            .unwrap();
        inv.update_container_status("c3", |s| s.record.transition(State::Exited, "stopped"))
            .await
            .unwrap();

        let live: Vec<String> = inv.containers(false).await.into_iter().map(|c| c.id).collect();
        assert_eq!(live, vec!["c2"]);
        assert_eq!(inv.containers(true).await.len(), 3);

        let counts = inv.live_containers_per_node().await;
        assert_eq!(counts.get("n1"), Some(&1));
        assert_eq!(inv.containers_on_node("n1").await.len(), 3);
    }

    #[tokio::test]
    async fn failed_update_keeps_state() {
        let inv = Inventory::new();
        running_node(&inv, "n1").await;
        let err = inv
            .update_node_status("n1", |s| s.record.transition(State::Created, "again"))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::IllegalTransition { .. }));
        assert_eq!(inv.node("n1").await.unwrap().state, State::Running);
    }

    #[tokio::test]
    async fn resource_info_is_replaced() {
        let inv = Inventory::new();
        inv.create_node("n1".to_string(), "memory").await.unwrap();
        let mut info = ResourceInfo::new();
        info.insert("ip".to_string(), "10.0.0.5".to_string());
        inv.set_resource_info("n1", info.clone()).await.unwrap();
        assert_eq!(inv.node("n1").await.unwrap().resource_info, info);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_node_creation_never_shares_names() {
        let inv = Arc::new(Inventory::new());
        let mut handles = Vec::new();
        for i in 0..64 {
            let inv = Arc::clone(&inv);
            handles.push(tokio::spawn(async move {
                inv.create_node(format!("n{i}"), "memory").await.unwrap().name
            }));
        }

        let mut names = HashSet::new();
        for handle in handles {
            assert!(names.insert(handle.await.unwrap()));
        }
        assert_eq!(names.len(), 64);
        assert_eq!(inv.nodes(true).await.len(), 64);
    }

    #[tokio::test]
    async fn name_space_exhaustion_surfaces() {
        let inv = Inventory::with_name_generator(NameGenerator::with_ceiling(2));
        inv.create_node("n1".to_string(), "memory").await.unwrap();
        inv.create_node("n2".to_string(), "memory").await.unwrap();
        let err = inv.create_node("n3".to_string(), "memory").await.unwrap_err();
        assert_eq!(err, StateError::NameSpaceExhausted(2));
        assert_eq!(inv.nodes(true).await.len(), 2);
    }
}
