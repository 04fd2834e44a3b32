//! In-memory substrate.
//!
//! `MemoryProvider` and `MemoryRuntime` implement the collaborator traits
//! without touching any real machine. Their behaviour can be scripted
//! (fail, never acknowledge, go unreachable) and every call is counted,
//! which is what the lifecycle tests and the standalone daemon use.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail};
use async_trait::async_trait;

use fleet_state::{Container, ContainerId, Node, NodeId, ResourceInfo, State, epoch_secs};

use crate::provider::{
    ContainerObservation, ContainerRuntimeClient, NodeObservation, ResourceProvider, RunningNode,
};

/// How a scripted request responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    #[default]
    Acknowledge,
    Fail,
    /// Never resolve.
    Hang,
    /// Yield to the scheduler once, then acknowledge.
    Yield,
}

impl Behavior {
    async fn respond(self, what: &str) -> anyhow::Result<()> {
        match self {
            Self::Acknowledge => Ok(()),
            Self::Fail => bail!("{what} rejected"),
            Self::Hang => std::future::pending().await,
            Self::Yield => {
                tokio::task::yield_now().await;
                Ok(())
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Call counters for one collaborator operation set.
#[derive(Debug, Default)]
pub struct CallCounts {
    counts: Mutex<HashMap<&'static str, usize>>,
}

impl CallCounts {
    fn hit(&self, operation: &'static str) {
        *lock(&self.counts).entry(operation).or_insert(0) += 1;
    }

    pub fn get(&self, operation: &str) -> usize {
        lock(&self.counts).get(operation).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct ProviderScript {
    run: Behavior,
    stop: Behavior,
    remove: Behavior,
    unreachable: HashSet<NodeId>,
}

/// Resource provider that keeps nodes in a map.
#[derive(Debug)]
pub struct MemoryProvider {
    script: Mutex<ProviderScript>,
    nodes: Mutex<HashMap<NodeId, NodeObservation>>,
    runtime: Arc<MemoryRuntime>,
    pub calls: CallCounts,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(ProviderScript::default()),
            nodes: Mutex::new(HashMap::new()),
            runtime: Arc::new(MemoryRuntime::new()),
            calls: CallCounts::default(),
        }
    }

    /// Runtime handed to every node this provider runs.
    pub fn runtime(&self) -> &Arc<MemoryRuntime> {
        &self.runtime
    }

    pub fn set_run(&self, behavior: Behavior) {
        lock(&self.script).run = behavior;
    }

    pub fn set_stop(&self, behavior: Behavior) {
        lock(&self.script).stop = behavior;
    }

    pub fn set_remove(&self, behavior: Behavior) {
        lock(&self.script).remove = behavior;
    }

    /// Make `inspect_node` fail for a node.
    pub fn set_unreachable(&self, node_id: &str, unreachable: bool) {
        let mut script = lock(&self.script);
        if unreachable {
            script.unreachable.insert(node_id.to_string());
        } else {
            script.unreachable.remove(node_id);
        }
    }

    /// Override what the substrate reports for a node.
    pub fn set_observation(&self, node_id: &str, observation: NodeObservation) {
        lock(&self.nodes).insert(node_id.to_string(), observation);
    }

    fn set_state(&self, node_id: &str, state: State) {
        let mut nodes = lock(&self.nodes);
        let entry = nodes.entry(node_id.to_string()).or_insert(NodeObservation {
            state,
            load_average: 0.0,
            memory_mb: 0,
            disk_gb: 0,
        });
        entry.state = state;
    }
}

#[async_trait]
impl ResourceProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn run_node(&self, node: &Node) -> anyhow::Result<RunningNode> {
        self.calls.hit("run_node");
        let behavior = lock(&self.script).run;
        behavior.respond("run_node").await?;
        self.set_state(&node.id, State::Running);

        let resource_info = ResourceInfo::from([
            ("provider".to_string(), "memory".to_string()),
            ("hostname".to_string(), node.name.clone()),
        ]);
        Ok(RunningNode {
            resource_info,
            client: self.runtime.clone(),
        })
    }

    async fn stop_node(&self, node: &Node) -> anyhow::Result<()> {
        self.calls.hit("stop_node");
        let behavior = lock(&self.script).stop;
        behavior.respond("stop_node").await?;
        self.set_state(&node.id, State::Exited);
        Ok(())
    }

    async fn remove_node(&self, node: &Node) -> anyhow::Result<()> {
        self.calls.hit("remove_node");
        let behavior = lock(&self.script).remove;
        behavior.respond("remove_node").await?;
        self.set_state(&node.id, State::Exited);
        Ok(())
    }

    async fn inspect_node(&self, node: &Node) -> anyhow::Result<NodeObservation> {
        self.calls.hit("inspect_node");
        if lock(&self.script).unreachable.contains(&node.id) {
            bail!("node {} unreachable", node.name);
        }
        lock(&self.nodes)
            .get(&node.id)
            .cloned()
            .ok_or_else(|| anyhow!("node {} unknown to provider", node.name))
    }
}

#[derive(Debug, Default)]
struct RuntimeScript {
    start: Behavior,
    stop: Behavior,
    inspect: Behavior,
}

/// Container runtime that keeps containers in a map.
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    script: Mutex<RuntimeScript>,
    containers: Mutex<HashMap<ContainerId, ContainerObservation>>,
    pub calls: CallCounts,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_start(&self, behavior: Behavior) {
        lock(&self.script).start = behavior;
    }

    pub fn set_stop(&self, behavior: Behavior) {
        lock(&self.script).stop = behavior;
    }

    pub fn set_inspect(&self, behavior: Behavior) {
        lock(&self.script).inspect = behavior;
    }

    /// Override what the runtime reports for a container.
    pub fn set_observation(&self, container_id: &str, observation: ContainerObservation) {
        lock(&self.containers).insert(container_id.to_string(), observation);
    }
}

#[async_trait]
impl ContainerRuntimeClient for MemoryRuntime {
    async fn start_container(&self, container: &Container) -> anyhow::Result<()> {
        self.calls.hit("start_container");
        let behavior = lock(&self.script).start;
        behavior.respond("start_container").await?;
        lock(&self.containers).insert(
            container.id.clone(),
            ContainerObservation {
                state: State::Running,
                started_at: Some(epoch_secs()),
                finished_at: None,
            },
        );
        Ok(())
    }

    async fn stop_container(&self, container: &Container) -> anyhow::Result<()> {
        self.calls.hit("stop_container");
        let behavior = lock(&self.script).stop;
        behavior.respond("stop_container").await?;
        let mut containers = lock(&self.containers);
        let entry = containers
            .entry(container.id.clone())
            .or_insert(ContainerObservation {
                state: State::Exited,
                started_at: None,
                finished_at: None,
            });
        entry.state = State::Exited;
        entry.finished_at = Some(epoch_secs());
        Ok(())
    }

    async fn inspect_container(&self, container: &Container) -> anyhow::Result<ContainerObservation> {
        self.calls.hit("inspect_container");
        let behavior = lock(&self.script).inspect;
        behavior.respond("inspect_container").await?;
        lock(&self.containers)
            .get(&container.id)
            .cloned()
            .ok_or_else(|| anyhow!("container {} unknown to runtime", container.id))
    }
}
