//! Conversions from inventory status records to placement types.

use std::collections::HashMap;

use fleet_state::{NodeId, NodeStatus};

use crate::scorer::NodeLoad;

/// Convert a [`NodeStatus`] to a [`NodeLoad`] with its live container count.
pub fn node_status_to_load(status: &NodeStatus, containers: usize) -> NodeLoad {
    NodeLoad {
        node_id: status.id.clone(),
        node_name: status.name.clone(),
        state: status.state(),
        load_average: status.load_average,
        memory_mb: status.memory_mb,
        disk_gb: status.disk_gb,
        containers,
    }
}

/// Build load views for every status, preserving order.
///
/// Nodes missing from `containers` are treated as empty.
pub fn loads_from_statuses(
    statuses: &[NodeStatus],
    containers: &HashMap<NodeId, usize>,
) -> Vec<NodeLoad> {
    statuses
        .iter()
        .map(|s| node_status_to_load(s, containers.get(&s.id).copied().unwrap_or(0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use fleet_state::State;

    use super::*;

    fn sample_status() -> NodeStatus {
        let mut status = NodeStatus::new("n1", "node-1");
        status.record.state = State::Running;
        status.load_average = 0.75;
        status.memory_mb = 4096;
        status.disk_gb = 40;
        status
    }

    #[test]
    fn status_to_load_copies_metrics() {
        let load = node_status_to_load(&sample_status(), 2);
        assert_eq!(load.node_id, "n1");
        assert_eq!(load.node_name, "node-1");
        assert_eq!(load.state, State::Running);
        assert_eq!(load.load_average, 0.75);
        assert_eq!(load.memory_mb, 4096);
        assert_eq!(load.disk_gb, 40);
        assert_eq!(load.containers, 2);
    }

    #[test]
    fn missing_counts_default_to_zero() {
        let statuses = vec![sample_status(), NodeStatus::new("n2", "node-2")];
        let mut counts = HashMap::new();
        counts.insert("n1".to_string(), 3);

        let loads = loads_from_statuses(&statuses, &counts);
        assert_eq!(loads.len(), 2);
        assert_eq!(loads[0].containers, 3);
        assert_eq!(loads[1].containers, 0);
        assert_eq!(loads[1].state, State::Unknown);
    }
}
