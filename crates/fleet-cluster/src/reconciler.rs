//! Status reconciliation.
//!
//! Pulls observations from the provider and the node runtimes and merges
//! them into the inventory. Only fields the collaborator is authoritative
//! for are written: state and load figures for nodes, state and
//! timestamps for containers. Identity fields are never touched.
//!
//! A probe that fails or exceeds the probe timeout marks the record
//! `unreachable`; nothing is ever removed from the inventory.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use fleet_state::{Container, ContainerStatus, Node, NodeStatus, State, StatusRecord};

use crate::provider::{ContainerObservation, NodeObservation};
use crate::service::{ClusterService, REASON_UNREACHABLE};

/// Shortest period the reconcile loop will tick at.
pub const MIN_RECONCILE_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Records refreshed from an observation.
    pub reconciled: usize,
    /// Records whose observed state differed from the recorded one.
    pub drifted: usize,
    pub unreachable: usize,
}

impl ReconcileReport {
    fn count(&mut self, merge: Merge) {
        self.reconciled += 1;
        if merge != Merge::InSync {
            self.drifted += 1;
        }
    }
}

/// How an observed state compared with the recorded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    InSync,
    /// Observed state was ahead and has been applied.
    Advanced,
    /// Observed state would move backwards; recorded state kept.
    Rejected,
}

/// Apply an observed state to a status record.
pub fn merge_state(record: &mut StatusRecord, observed: State) -> Merge {
    let recorded = record.state;
    if observed == recorded {
        if record.reason == REASON_UNREACHABLE {
            record.reason = "reconciled".to_string();
            record.error = None;
        }
        record.message.clear();
        return Merge::InSync;
    }

    match record.transition(observed, "reconciled") {
        Ok(()) => {
            record.message = format!("observed {observed}, recorded {recorded}");
            Merge::Advanced
        }
        Err(_) => {
            record.message = format!("observed {observed}, recorded {recorded}; not applied");
            Merge::Rejected
        }
    }
}

/// Merge a node observation into its status.
pub fn merge_node(status: &mut NodeStatus, observation: &NodeObservation) -> Merge {
    status.load_average = observation.load_average;
    status.memory_mb = observation.memory_mb;
    status.disk_gb = observation.disk_gb;
    merge_state(&mut status.record, observation.state)
}

/// Merge a container observation into its status.
///
/// Observed timestamps replace recorded ones unless the state was rejected.
pub fn merge_container(status: &mut ContainerStatus, observation: &ContainerObservation) -> Merge {
    let merge = merge_state(&mut status.record, observation.state);
    if merge != Merge::Rejected {
        if observation.started_at.is_some() {
            status.record.started_at = observation.started_at;
        }
        if observation.finished_at.is_some() {
            status.record.finished_at = observation.finished_at;
        }
    }
    merge
}

fn mark_unreachable(record: &mut StatusRecord, error: &str) {
    record.reason = REASON_UNREACHABLE.to_string();
    record.error = Some(error.to_string());
}

impl ClusterService {
    /// Refresh every live node from the provider.
    pub async fn flush_nodes(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for node in self.inventory.nodes(false).await {
            match timeout(self.probe_timeout, self.provider.inspect_node(&node)).await {
                Ok(Ok(observation)) => {
                    let merged = self
                        .inventory
                        .update_node_status(&node.id, |s| Ok(merge_node(s, &observation)))
                        .await;
                    match merged {
                        Ok(merge) => {
                            if merge != Merge::InSync {
                                warn!(node = %node.name, observed = %observation.state, ?merge, "node state drift");
                            }
                            report.count(merge);
                        }
                        Err(e) => warn!(node = %node.name, error = %e, "failed to merge node status"),
                    }
                }
                Ok(Err(e)) => {
                    self.node_unreachable(&node, &e.to_string()).await;
                    report.unreachable += 1;
                }
                Err(_) => {
                    self.node_unreachable(&node, "probe timed out").await;
                    report.unreachable += 1;
                }
            }
        }
        debug!(?report, "nodes flushed");
        report
    }

    /// Refresh every live container from its node's runtime.
    pub async fn flush_containers(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for container in self.inventory.containers(false).await {
            let client = self.clients.read().await.get(&container.node_id).cloned();
            let Some(client) = client else {
                self.container_unreachable(&container, "node has no runtime").await;
                report.unreachable += 1;
                continue;
            };

            match timeout(self.probe_timeout, client.inspect_container(&container)).await {
                Ok(Ok(observation)) => {
                    let merged = self
                        .inventory
                        .update_container_status(&container.id, |s| {
                            Ok(merge_container(s, &observation))
                        })
                        .await;
                    match merged {
                        Ok(merge) => {
                            if merge != Merge::InSync {
                                warn!(container_id = %container.id, observed = %observation.state, ?merge, "container state drift");
                            }
                            report.count(merge);
                        }
                        Err(e) => {
                            warn!(container_id = %container.id, error = %e, "failed to merge container status")
                        }
                    }
                }
                Ok(Err(e)) => {
                    self.container_unreachable(&container, &e.to_string()).await;
                    report.unreachable += 1;
                }
                Err(_) => {
                    self.container_unreachable(&container, "probe timed out").await;
                    report.unreachable += 1;
                }
            }
        }
        debug!(?report, "containers flushed");
        report
    }

    /// Flush nodes and containers every `interval` until `shutdown` fires.
    ///
    /// Intervals below [`MIN_RECONCILE_INTERVAL`] are raised to it.
    pub async fn run_reconciler(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let interval = if interval < MIN_RECONCILE_INTERVAL {
            warn!(requested_ms = interval.as_millis() as u64, "reconcile interval too short, clamping");
            MIN_RECONCILE_INTERVAL
        } else {
            interval
        };
        info!(interval_secs = interval.as_secs(), "reconciler started");
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let nodes = self.flush_nodes().await;
                    let containers = self.flush_containers().await;
                    if nodes.unreachable + containers.unreachable > 0 {
                        warn!(
                            nodes = nodes.unreachable,
                            containers = containers.unreachable,
                            "unreachable records after reconcile"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconciler stopping");
                    break;
                }
            }
        }
    }

    /// Mark a node and its containers unreachable.
    async fn node_unreachable(&self, node: &Node, error: &str) {
        warn!(node = %node.name, error, "node unreachable");
        let marked = self
            .inventory
            .update_node_status(&node.id, |s| {
                mark_unreachable(&mut s.record, error);
                Ok(())
            })
            .await;
        if let Err(e) = marked {
            warn!(node = %node.name, error = %e, "failed to mark node unreachable");
        }

        for container in self.inventory.containers_on_node(&node.id).await {
            self.container_unreachable(&container, error).await;
        }
    }

    /// Exited containers keep the reason they exited with.
    async fn container_unreachable(&self, container: &Container, error: &str) {
        debug!(container_id = %container.id, error, "container unreachable");
        let marked = self
            .inventory
            .update_container_status(&container.id, |s| {
                if s.state().is_live() {
                    mark_unreachable(&mut s.record, error);
                }
                Ok(())
            })
            .await;
        if let Err(e) = marked {
            warn!(container_id = %container.id, error = %e, "failed to mark container unreachable");
        }
    }
}
