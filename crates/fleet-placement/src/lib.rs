//! fleet-placement — picks the node a new container lands on.
//!
//! Placement is a pure decision over a snapshot of node load; it never
//! touches the inventory itself. The lifecycle layer builds the snapshot,
//! asks a [`PlacementPolicy`] for a node, and registers the container.
//!
//! # Components
//!
//! - **`scorer`** — node load view and weighted load score
//! - **`policy`** — the policy trait, `LeastLoaded`, `FirstEligible`
//! - **`convert`** — building load views from inventory status records

pub mod convert;
pub mod policy;
pub mod scorer;

pub use convert::{node_status_to_load, loads_from_statuses};
pub use policy::{FirstEligible, LeastLoaded, PlacementPolicy, PolicyKind, eligible, place};
pub use scorer::{LoadWeights, NodeLoad, NodeScore, load_score, rank_nodes};
