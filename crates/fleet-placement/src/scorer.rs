//! Node load scoring.
//!
//! Collapses a node's observed facts into a single load number using a
//! weighted sum of:
//! - **Load average** reported by the provider
//! - **Containers** currently live on the node
//! - **Memory** and **disk** in use (off by default)
//!
//! Lower is less loaded.

use serde::{Deserialize, Serialize};

use fleet_state::{NodeId, State};

/// Load snapshot for a single node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeLoad {
    pub node_id: NodeId,
    pub node_name: String,
    pub state: State,
    pub load_average: f64,
    pub memory_mb: u64,
    pub disk_gb: u64,
    /// Live containers placed on the node.
    pub containers: usize,
}

/// Weights for the load components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadWeights {
    pub load_average: f64,
    pub containers: f64,
    /// Per GB of memory in use.
    pub memory_gb: f64,
    /// Per GB of disk in use.
    pub disk_gb: f64,
}

impl Default for LoadWeights {
    fn default() -> Self {
        Self {
            load_average: 1.0,
            containers: 1.0,
            memory_gb: 0.0,
            disk_gb: 0.0,
        }
    }
}

/// Scored node, as produced by [`rank_nodes`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeScore {
    pub node_id: NodeId,
    pub node_name: String,
    /// Weighted load (lower = less loaded).
    pub score: f64,
}

/// Weighted load of a single node.
pub fn load_score(node: &NodeLoad, weights: &LoadWeights) -> f64 {
    weights.load_average * node.load_average
        + weights.containers * node.containers as f64
        + weights.memory_gb * (node.memory_mb as f64 / 1024.0)
        + weights.disk_gb * node.disk_gb as f64
}

/// Score all nodes and return them least loaded first.
///
/// Ties are broken by node name so the order is deterministic.
pub fn rank_nodes(nodes: &[NodeLoad], weights: &LoadWeights) -> Vec<NodeScore> {
    let mut scores: Vec<NodeScore> = nodes
        .iter()
        .map(|n| NodeScore {
            node_id: n.node_id.clone(),
            node_name: n.node_name.clone(),
            score: load_score(n, weights),
        })
        .collect();

    scores.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.node_name.cmp(&b.node_name))
    });
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_node(name: &str, load: f64, containers: usize) -> NodeLoad {
        NodeLoad {
            node_id: format!("id-{name}"),
            node_name: name.to_string(),
            state: State::Running,
            load_average: load,
            memory_mb: 0,
            disk_gb: 0,
            containers,
        }
    }

    #[test]
    fn score_combines_load_and_containers() {
        let node = make_node("node-1", 0.5, 3);
        let score = load_score(&node, &LoadWeights::default());
        assert!((score - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn memory_and_disk_only_count_when_weighted() {
        let mut node = make_node("node-1", 0.0, 0);
        node.memory_mb = 2048;
        node.disk_gb = 10;
        assert_eq!(load_score(&node, &LoadWeights::default()), 0.0);

        let weights = LoadWeights {
            load_average: 0.0,
            containers: 0.0,
            memory_gb: 1.0,
            disk_gb: 0.5,
        };
        assert!((load_score(&node, &weights) - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rank_nodes_least_loaded_first() {
        let nodes = vec![
            make_node("node-1", 2.0, 0),
            make_node("node-2", 0.1, 0),
            make_node("node-3", 1.0, 0),
        ];

        let ranked = rank_nodes(&nodes, &LoadWeights::default());

        let order: Vec<&str> = ranked.iter().map(|s| s.node_name.as_str()).collect();
        assert_eq!(order, vec!["node-2", "node-3", "node-1"]);
    }

    #[test]
    fn rank_nodes_ties_break_on_name() {
        let nodes = vec![
            make_node("node-2", 1.0, 1),
            make_node("node-10", 1.0, 1),
            make_node("node-1", 1.0, 1),
        ];

        let ranked = rank_nodes(&nodes, &LoadWeights::default());

        // Lexicographic: "node-1" < "node-10" < "node-2".
        let order: Vec<&str> = ranked.iter().map(|s| s.node_name.as_str()).collect();
        assert_eq!(order, vec!["node-1", "node-10", "node-2"]);
    }

    #[test]
    fn nan_load_ranks_the_same_in_any_order() {
        let forward = vec![
            make_node("node-1", f64::NAN, 0),
            make_node("node-2", 3.0, 0),
            make_node("node-3", 0.5, 0),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let names = |nodes: &[NodeLoad]| -> Vec<String> {
            rank_nodes(nodes, &LoadWeights::default())
                .into_iter()
                .map(|s| s.node_name)
                .collect()
        };
        let order = names(&forward);
        assert_eq!(order, names(&reversed));

        let finite: Vec<&str> = order
            .iter()
            .map(String::as_str)
            .filter(|n| *n != "node-1")
            .collect();
        assert_eq!(finite, vec!["node-3", "node-2"]);
    }

    #[test]
    fn rank_empty_is_empty() {
        assert!(rank_nodes(&[], &LoadWeights::default()).is_empty());
    }
}
