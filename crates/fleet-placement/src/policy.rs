//! Placement policies.
//!
//! A policy chooses one node out of the eligible candidates. Eligibility
//! (the node is `Running`) is enforced by [`place`] before any policy sees
//! the list, so policies only rank.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use fleet_state::{NodeId, State};

use crate::scorer::{LoadWeights, NodeLoad, rank_nodes};

/// Strategy for picking a node among eligible candidates.
pub trait PlacementPolicy: Send + Sync {
    /// Short name used in logs and configuration.
    fn name(&self) -> &'static str;

    /// Pick one candidate, or `None` if there are none.
    ///
    /// Candidates arrive in node registration order.
    fn select<'a>(&self, candidates: &'a [NodeLoad]) -> Option<&'a NodeLoad>;
}

/// The first eligible node in registration order.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstEligible;

impl PlacementPolicy for FirstEligible {
    fn name(&self) -> &'static str {
        "first-eligible"
    }

    fn select<'a>(&self, candidates: &'a [NodeLoad]) -> Option<&'a NodeLoad> {
        candidates.first()
    }
}

/// The node with the lowest weighted load; ties go to the lowest name.
#[derive(Debug, Default, Clone)]
pub struct LeastLoaded {
    pub weights: LoadWeights,
}

impl LeastLoaded {
    pub fn new(weights: LoadWeights) -> Self {
        Self { weights }
    }
}

impl PlacementPolicy for LeastLoaded {
    fn name(&self) -> &'static str {
        "least-loaded"
    }

    fn select<'a>(&self, candidates: &'a [NodeLoad]) -> Option<&'a NodeLoad> {
        let best = rank_nodes(candidates, &self.weights).into_iter().next()?;
        candidates.iter().find(|n| n.node_id == best.node_id)
    }
}

/// Policy selector used by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    #[default]
    LeastLoaded,
    FirstEligible,
}

impl PolicyKind {
    /// Instantiate the policy.
    pub fn build(self, weights: &LoadWeights) -> Arc<dyn PlacementPolicy> {
        match self {
            Self::LeastLoaded => Arc::new(LeastLoaded::new(weights.clone())),
            Self::FirstEligible => Arc::new(FirstEligible),
        }
    }
}

/// Nodes a container may be placed on: those currently `Running`.
pub fn eligible(nodes: &[NodeLoad]) -> Vec<NodeLoad> {
    nodes
        .iter()
        .filter(|n| n.state == State::Running)
        .cloned()
        .collect()
}

/// Filter to eligible nodes and let `policy` choose among them.
pub fn place(policy: &dyn PlacementPolicy, nodes: &[NodeLoad]) -> Option<NodeId> {
    let candidates = eligible(nodes);
    let chosen = policy.select(&candidates)?;
    debug!(
        policy = policy.name(),
        node = %chosen.node_name,
        candidates = candidates.len(),
        "placement chosen"
    );
    Some(chosen.node_id.clone())
}
