//! fleet-cluster — the control plane for a fleet of nodes and containers.
//!
//! Wraps the `fleet-state` inventory with lifecycle operations and status
//! reconciliation. All substrate work is delegated to two collaborators:
//! a [`ResourceProvider`] for nodes and a per-node
//! [`ContainerRuntimeClient`] for containers.
//!
//! # Architecture
//!
//! ```text
//! ClusterService
//!   ├── Inventory            (fleet-state)
//!   ├── PlacementPolicy      (fleet-placement)
//!   ├── ResourceProvider ──► run/stop/remove/inspect nodes
//!   └── runtime clients  ──► start/stop/inspect containers, one per running node
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod provider;
pub mod reconciler;
pub mod service;

pub use config::{ClusterConfig, KillConfig, ReconcileConfig, SchedulerConfig};
pub use error::{ClusterError, ClusterResult};
pub use memory::{Behavior, MemoryProvider, MemoryRuntime};
pub use provider::{
    ContainerObservation, ContainerRuntimeClient, NodeObservation, ResourceProvider, RunningNode,
};
pub use reconciler::{MIN_RECONCILE_INTERVAL, Merge, ReconcileReport};
pub use service::{
    ClusterService, ClusterState, ClusterStatus, REASON_KILL_TIMEOUT, REASON_UNREACHABLE,
};
