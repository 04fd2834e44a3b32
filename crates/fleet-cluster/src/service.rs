//! Cluster service — the control-plane surface.
//!
//! Drives create/run/kill for nodes and containers on top of the
//! [`Inventory`], delegating the real work to the [`ResourceProvider`] and
//! the per-node [`ContainerRuntimeClient`]s.
//!
//! No inventory lock is held while a collaborator is called. State is
//! committed only after the collaborator acknowledges, and each commit goes
//! through the status record's transition check, so a concurrent change in
//! between surfaces as `IllegalTransition` instead of being overwritten.
//! At most one start per node or container is in flight; a second caller
//! gets `AlreadyRunning` without reaching the collaborator.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use fleet_placement::{PlacementPolicy, loads_from_statuses, place};
use fleet_state::{
    Container, ContainerKey, ContainerOptions, ContainerStatus, IdGenerator, Image, Inventory,
    Node, NodeId, NodeKey, NodeStatus, State, StateError, UuidGenerator,
};

use crate::config::{ClusterConfig, KillConfig};
use crate::error::{ClusterError, ClusterResult};
use crate::provider::{ContainerRuntimeClient, ResourceProvider};

/// Reason recorded when a node or container could not be probed.
pub const REASON_UNREACHABLE: &str = "unreachable";

/// Reason recorded when neither kill request was acknowledged.
pub const REASON_KILL_TIMEOUT: &str = "kill timeout";

/// Coarse cluster health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterState {
    /// No nodes registered.
    Empty,
    /// Nodes exist but none is running.
    Idle,
    Running,
    /// At least one live node failed its last probe.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub state: ClusterState,
    pub reason: String,
}

/// Ids with a start in flight.
#[derive(Debug, Default)]
struct Starting {
    ids: Mutex<HashSet<String>>,
}

impl Starting {
    /// Claim `id` until the returned guard drops. `None` if already claimed.
    fn claim(&self, id: &str) -> Option<StartClaim<'_>> {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        ids.insert(id.to_string()).then(|| StartClaim {
            starting: self,
            id: id.to_string(),
        })
    }
}

struct StartClaim<'a> {
    starting: &'a Starting,
    id: String,
}

impl Drop for StartClaim<'_> {
    fn drop(&mut self) {
        self.starting
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// The control plane for one cluster.
pub struct ClusterService {
    version: String,
    image: Option<Image>,
    options: Option<ContainerOptions>,
    pub(crate) inventory: Arc<Inventory>,
    pub(crate) provider: Arc<dyn ResourceProvider>,
    /// Runtime clients of running nodes.
    pub(crate) clients: RwLock<HashMap<NodeId, Arc<dyn ContainerRuntimeClient>>>,
    starting_nodes: Starting,
    starting_containers: Starting,
    ids: Arc<dyn IdGenerator>,
    policy: Arc<dyn PlacementPolicy>,
    kill: KillConfig,
    pub(crate) probe_timeout: Duration,
}

impl ClusterService {
    /// Build a service from configuration.
    ///
    /// Fails with `InvalidReference` if the configured image is malformed.
    pub fn new(config: &ClusterConfig, provider: Arc<dyn ResourceProvider>) -> ClusterResult<Self> {
        let image = config.image.as_deref().map(Image::parse).transpose()?;
        Ok(Self {
            version: config.version.clone(),
            image,
            options: config.options.clone(),
            inventory: Arc::new(Inventory::new()),
            provider,
            clients: RwLock::new(HashMap::new()),
            starting_nodes: Starting::default(),
            starting_containers: Starting::default(),
            ids: Arc::new(UuidGenerator),
            policy: config.scheduler.policy.build(&config.scheduler.weights),
            kill: config.kill.clone(),
            probe_timeout: config.reconcile.probe_timeout(),
        })
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn PlacementPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_inventory(mut self, inventory: Arc<Inventory>) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn inventory(&self) -> &Arc<Inventory> {
        &self.inventory
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Grace period applied when the caller has no preference.
    pub fn default_grace_period_ms(&self) -> u64 {
        self.kill.grace_period_ms
    }

    // ── Configuration ──────────────────────────────────────────────

    pub fn version(&self) -> ClusterResult<&str> {
        if self.version.is_empty() {
            return Err(ClusterError::NotConfigured("version"));
        }
        Ok(&self.version)
    }

    pub fn image(&self) -> ClusterResult<&Image> {
        self.image.as_ref().ok_or(ClusterError::NotConfigured("image"))
    }

    pub fn options(&self) -> ClusterResult<&ContainerOptions> {
        self.options
            .as_ref()
            .ok_or(ClusterError::NotConfigured("options"))
    }

    // ── Containers ─────────────────────────────────────────────────

    pub async fn containers(&self, all: bool) -> Vec<Container> {
        self.inventory.containers(all).await
    }

    /// Look up a container status by `id`, or by `name` and `node_name`.
    pub async fn container_status(
        &self,
        id: Option<&str>,
        name: Option<&str>,
        node_name: Option<&str>,
    ) -> ClusterResult<ContainerStatus> {
        let key = ContainerKey::from_parts(id, name, node_name)?;
        Ok(self.inventory.container_status(&key).await?)
    }

    /// Place and register a new container using the configured image.
    ///
    /// Nothing is registered when no node is eligible. If the chosen node
    /// stops running before the container is registered, placement runs
    /// again on a fresh snapshot.
    pub async fn create_container(&self) -> ClusterResult<Container> {
        let image = self.image()?.clone();
        let options = self.options.clone().unwrap_or_default();

        loop {
            let statuses = self.inventory.node_statuses().await;
            let counts = self.inventory.live_containers_per_node().await;
            let loads = loads_from_statuses(&statuses, &counts);
            let node_id =
                place(self.policy.as_ref(), &loads).ok_or(ClusterError::NoEligibleNode)?;

            let id = self.ids.next_id();
            match self
                .inventory
                .create_container(id, &node_id, image.clone(), options.clone())
                .await
            {
                Ok(container) => {
                    info!(
                        container_id = %container.id,
                        container = %container.name,
                        node = %container.node_name,
                        "container created"
                    );
                    return Ok(container);
                }
                // Running only moves forward, so the node stays ineligible.
                Err(StateError::NodeNotRunning(node)) => {
                    debug!(node = %node, "placed node stopped running, placing again");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Start a container on its node.
    pub async fn run_container(&self, container: &Container) -> ClusterResult<()> {
        let container = self.inventory.container(&container.id).await?;
        let Some(_claim) = self.starting_containers.claim(&container.id) else {
            return Err(ClusterError::AlreadyRunning(container.id.clone()));
        };
        let status = self
            .inventory
            .container_status(&ContainerKey::Id(container.id.clone()))
            .await?;
        match status.state() {
            State::Running => return Err(ClusterError::AlreadyRunning(container.id.clone())),
            State::Exited => {
                return Err(StateError::IllegalTransition {
                    from: State::Exited,
                    to: State::Running,
                }
                .into());
            }
            State::Unknown | State::Created => {}
        }

        let client = match self.container_client(&container).await {
            Ok(client) => client,
            Err((reason, e)) => return Err(self.fail_container(&container.id, reason, e).await),
        };

        debug!(container_id = %container.id, node = %container.node_name, "starting container");
        if let Err(e) = client.start_container(&container).await {
            let err = ClusterError::provider("start_container", e);
            return Err(self.fail_container(&container.id, "start failed", err).await);
        }

        self.inventory
            .update_container_status(&container.id, |s| {
                s.record.transition(State::Running, "started")
            })
            .await?;
        info!(container_id = %container.id, node = %container.node_name, "container running");
        Ok(())
    }

    /// Stop a container. Killing an exited container is a no-op.
    pub async fn kill_container(&self, container: &Container) -> ClusterResult<()> {
        let container = self.inventory.container(&container.id).await?;
        let status = self
            .inventory
            .container_status(&ContainerKey::Id(container.id.clone()))
            .await?;
        if status.state() == State::Exited {
            debug!(container_id = %container.id, "container already exited");
            return Ok(());
        }

        let client = match self.container_client(&container).await {
            Ok(client) => client,
            Err((reason, e)) => return Err(self.fail_container(&container.id, reason, e).await),
        };

        debug!(container_id = %container.id, node = %container.node_name, "stopping container");
        if let Err(e) = client.stop_container(&container).await {
            let err = ClusterError::provider("stop_container", e);
            return Err(self.fail_container(&container.id, "stop failed", err).await);
        }

        self.inventory
            .update_container_status(&container.id, |s| {
                s.record.transition(State::Exited, "stopped")
            })
            .await?;
        info!(container_id = %container.id, node = %container.node_name, "container exited");
        Ok(())
    }

    // ── Nodes ──────────────────────────────────────────────────────

    pub async fn nodes(&self, all: bool) -> Vec<Node> {
        self.inventory.nodes(all).await
    }

    /// Register a new node with a generated name.
    pub async fn create_node(&self) -> ClusterResult<Node> {
        let id = self.ids.next_id();
        let node = self.inventory.create_node(id, self.provider.name()).await?;
        info!(node_id = %node.id, node = %node.name, provider = %node.provider, "node created");
        Ok(node)
    }

    /// Bring a node up through the provider and attach its runtime client.
    pub async fn run_node(&self, node: &Node) -> ClusterResult<()> {
        let node = self.inventory.node(&node.id).await?;
        let Some(_claim) = self.starting_nodes.claim(&node.id) else {
            return Err(ClusterError::AlreadyRunning(node.name.clone()));
        };
        let current = self.node_state(&node).await?;
        if current == State::Running {
            return Err(ClusterError::AlreadyRunning(node.name.clone()));
        }
        if !current.can_transition_to(State::Running) {
            return Err(StateError::IllegalTransition {
                from: current,
                to: State::Running,
            }
            .into());
        }

        debug!(node = %node.name, provider = %node.provider, "running node");
        let running = match self.provider.run_node(&node).await {
            Ok(running) => running,
            Err(e) => {
                let err = ClusterError::provider("run_node", e);
                return Err(self.fail_node(&node.id, "run failed", err).await);
            }
        };

        self.inventory
            .set_resource_info(&node.id, running.resource_info)
            .await?;

        // Commit and attach under one clients guard so a running node is
        // never observed without its runtime.
        let mut clients = self.clients.write().await;
        self.inventory
            .update_node_status(&node.id, |s| s.record.transition(State::Running, "started"))
            .await?;
        clients.insert(node.id.clone(), running.client);
        drop(clients);

        info!(node_id = %node.id, node = %node.name, "node running");
        Ok(())
    }

    /// Stop a node, escalating to forced removal after `grace_period_ms`.
    ///
    /// The node only moves to `Exited` once either request is
    /// acknowledged. Dropping the returned future before then leaves the
    /// node untouched. Killing an exited node is a no-op.
    pub async fn kill_node(&self, node: &Node, grace_period_ms: u64) -> ClusterResult<()> {
        let node = self.inventory.node(&node.id).await?;
        if self.node_state(&node).await? == State::Exited {
            debug!(node = %node.name, "node already exited");
            return Ok(());
        }

        let grace = Duration::from_millis(grace_period_ms);
        let reason = match timeout(grace, self.provider.stop_node(&node)).await {
            Ok(Ok(())) => "stopped",
            Ok(Err(e)) => {
                warn!(node = %node.name, error = %e, "graceful stop failed, forcing removal");
                self.force_remove(&node).await?;
                "removed"
            }
            Err(_) => {
                warn!(node = %node.name, grace_ms = grace_period_ms, "grace period elapsed, forcing removal");
                self.force_remove(&node).await?;
                "removed"
            }
        };

        self.inventory
            .update_node_status(&node.id, |s| s.record.transition(State::Exited, reason))
            .await?;
        self.clients.write().await.remove(&node.id);
        self.exit_containers_on(&node).await;

        info!(node_id = %node.id, node = %node.name, reason, "node exited");
        Ok(())
    }

    pub async fn node_status(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> ClusterResult<NodeStatus> {
        let key = NodeKey::from_parts(id, name)?;
        Ok(self.inventory.node_status(&key).await?)
    }

    // ── Cluster ────────────────────────────────────────────────────

    pub async fn status(&self) -> ClusterStatus {
        summarize(&self.inventory.node_statuses().await)
    }

    // ── Internals ──────────────────────────────────────────────────

    async fn node_state(&self, node: &Node) -> ClusterResult<State> {
        let status = self
            .inventory
            .node_status(&NodeKey::Id(node.id.clone()))
            .await?;
        Ok(status.state())
    }

    /// Runtime client of the container's node, with the failure reason to
    /// record if there is none.
    async fn container_client(
        &self,
        container: &Container,
    ) -> Result<Arc<dyn ContainerRuntimeClient>, (&'static str, ClusterError)> {
        let node = self
            .inventory
            .node(&container.node_id)
            .await
            .map_err(|e| ("node not found", ClusterError::from(e)))?;
        self.clients
            .read()
            .await
            .get(&node.id)
            .cloned()
            .ok_or(("node not running", ClusterError::NodeNotRunning(node.name)))
    }

    async fn force_remove(&self, node: &Node) -> ClusterResult<()> {
        let limit = self.kill.force_timeout();
        match timeout(limit, self.provider.remove_node(node)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                let err = ClusterError::provider("remove_node", e);
                Err(self.fail_node(&node.id, "remove failed", err).await)
            }
            Err(_) => {
                let err = ClusterError::KillTimeout {
                    node: node.name.clone(),
                    waited_ms: self.kill.force_timeout_ms,
                };
                Err(self.fail_node(&node.id, REASON_KILL_TIMEOUT, err).await)
            }
        }
    }

    /// Containers cannot outlive their node.
    async fn exit_containers_on(&self, node: &Node) {
        for container in self.inventory.containers_on_node(&node.id).await {
            let result = self
                .inventory
                .update_container_status(&container.id, |s| {
                    if s.state().is_live() {
                        s.record.transition(State::Exited, "node exited")
                    } else {
                        Ok(())
                    }
                })
                .await;
            if let Err(e) = result {
                warn!(container_id = %container.id, error = %e, "failed to exit container");
            }
        }
    }

    /// Record a failed transition on the container, then hand the error back.
    async fn fail_container(&self, id: &str, reason: &str, err: ClusterError) -> ClusterError {
        warn!(container_id = %id, reason, error = %err, "container operation failed");
        let recorded = self
            .inventory
            .update_container_status(id, |s| {
                s.record.record_failure(reason, &err);
                Ok(())
            })
            .await;
        if let Err(e) = recorded {
            warn!(container_id = %id, error = %e, "failed to record container failure");
        }
        err
    }

    async fn fail_node(&self, id: &str, reason: &str, err: ClusterError) -> ClusterError {
        warn!(node_id = %id, reason, error = %err, "node operation failed");
        let recorded = self
            .inventory
            .update_node_status(id, |s| {
                s.record.record_failure(reason, &err);
                Ok(())
            })
            .await;
        if let Err(e) = recorded {
            warn!(node_id = %id, error = %e, "failed to record node failure");
        }
        err
    }
}

fn summarize(statuses: &[NodeStatus]) -> ClusterStatus {
    if statuses.is_empty() {
        return ClusterStatus {
            state: ClusterState::Empty,
            reason: "no nodes".to_string(),
        };
    }

    let unreachable = statuses
        .iter()
        .filter(|s| s.state().is_live() && s.record.reason == REASON_UNREACHABLE)
        .count();
    let running = statuses
        .iter()
        .filter(|s| s.state() == State::Running)
        .count();

    let (state, reason) = if unreachable > 0 {
        (
            ClusterState::Degraded,
            format!("{unreachable} of {} nodes unreachable", statuses.len()),
        )
    } else if running == 0 {
        (ClusterState::Idle, "no running nodes".to_string())
    } else {
        (
            ClusterState::Running,
            format!("{running} of {} nodes running", statuses.len()),
        )
    };
    ClusterStatus { state, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProvider;

    fn status(name: &str, state: State, reason: &str) -> NodeStatus {
        let mut s = NodeStatus::new(name, name);
        s.record.state = state;
        s.record.reason = reason.to_string();
        s
    }

    fn service(config: &ClusterConfig) -> ClusterResult<ClusterService> {
        ClusterService::new(config, Arc::new(MemoryProvider::new()))
    }

    #[test]
    fn summarize_empty() {
        let s = summarize(&[]);
        assert_eq!(s.state, ClusterState::Empty);
    }

    #[test]
    fn summarize_idle_when_nothing_runs() {
        let s = summarize(&[
            status("node-1", State::Unknown, "created"),
            status("node-2", State::Exited, "stopped"),
        ]);
        assert_eq!(s.state, ClusterState::Idle);
    }

    #[test]
    fn summarize_running() {
        let s = summarize(&[
            status("node-1", State::Running, "started"),
            status("node-2", State::Exited, "stopped"),
        ]);
        assert_eq!(s.state, ClusterState::Running);
        assert_eq!(s.reason, "1 of 2 nodes running");
    }

    #[test]
    fn summarize_degraded_on_unreachable_live_node() {
        let s = summarize(&[
            status("node-1", State::Running, "started"),
            status("node-2", State::Running, REASON_UNREACHABLE),
        ]);
        assert_eq!(s.state, ClusterState::Degraded);

        // An exited node being unreachable is expected.
        let s = summarize(&[
            status("node-1", State::Running, "started"),
            status("node-2", State::Exited, REASON_UNREACHABLE),
        ]);
        assert_eq!(s.state, ClusterState::Running);
    }

    #[test]
    fn unset_configuration_is_reported() {
        let config = ClusterConfig {
            version: String::new(),
            ..ClusterConfig::default()
        };
        let svc = service(&config).unwrap();
        assert!(matches!(svc.version(), Err(ClusterError::NotConfigured("version"))));
        assert!(matches!(svc.image(), Err(ClusterError::NotConfigured("image"))));
        assert!(matches!(svc.options(), Err(ClusterError::NotConfigured("options"))));
    }

    #[test]
    fn configured_values_are_returned() {
        let config = ClusterConfig {
            image: Some("registry/web:1.0".to_string()),
            options: Some(HashMap::from([("cpu".to_string(), "2".to_string())])),
            ..ClusterConfig::default()
        };
        let svc = service(&config).unwrap();
        assert_eq!(svc.version().unwrap(), "0.0.0");
        assert_eq!(svc.image().unwrap().name, "registry/web");
        assert_eq!(svc.options().unwrap()["cpu"], "2");
        assert_eq!(svc.policy_name(), "least-loaded");
    }

    #[test]
    fn malformed_image_rejects_construction() {
        let config = ClusterConfig {
            image: Some("no-tag".to_string()),
            ..ClusterConfig::default()
        };
        assert!(matches!(
            service(&config),
            Err(ClusterError::State(StateError::InvalidReference(_)))
        ));
    }

    #[test]
    fn cluster_status_serializes_snake_case() {
        let status = summarize(&[status("node-1", State::Running, REASON_UNREACHABLE)]);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "degraded");
        assert_eq!(json["reason"], "1 of 1 nodes unreachable");

        let parsed: ClusterStatus = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, status);
    }

    #[test]
    fn start_claim_is_exclusive_until_dropped() {
        let starting = Starting::default();
        let claim = starting.claim("n1");
        assert!(claim.is_some());
        assert!(starting.claim("n1").is_none());
        assert!(starting.claim("n2").is_some());

        drop(claim);
        assert!(starting.claim("n1").is_some());
    }

    #[tokio::test]
    async fn create_container_without_image_fails() {
        let svc = service(&ClusterConfig::default()).unwrap();
        let err = svc.create_container().await.unwrap_err();
        assert!(matches!(err, ClusterError::NotConfigured("image")));
    }
}
