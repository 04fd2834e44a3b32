//! fleet-state — the authoritative in-memory model of a fleet.
//!
//! Owns nodes, containers, and their status records, plus the lookup
//! indices used to resolve them by id or by name. Nothing here talks to a
//! substrate; lifecycle drivers live in `fleet-cluster`.
//!
//! # Architecture
//!
//! ```text
//! Inventory
//!   ├── NodeTable (RwLock)
//!   │   ├── nodes (registration order)
//!   │   ├── statuses: node_id → NodeStatus
//!   │   ├── by_id / by_name indices
//!   │   └── NameGenerator (node-<n>)
//!   └── ContainerTable (RwLock)
//!       ├── containers (registration order)
//!       ├── statuses: container_id → ContainerStatus
//!       └── by_id / (name, node_name) indices
//! ```
//!
//! Lock order is always nodes before containers.

pub mod error;
pub mod id;
pub mod image;
pub mod inventory;
pub mod naming;
pub mod status;
pub mod types;

pub use error::{StateError, StateResult};
pub use id::{IdGenerator, SequentialIds, UuidGenerator};
pub use image::Image;
pub use inventory::Inventory;
pub use naming::NameGenerator;
pub use status::{State, StatusRecord, epoch_secs};
pub use types::*;
