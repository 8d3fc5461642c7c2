//! Matching queued jobs to active nodes.

use crate::error::ClusterResult;
use crate::metrics::DutyMetrics;
use crate::node::Node;
use crate::state::LeaderState;
use crate::store::{JobStore, NodeRegistry};
use foreman_core::{Clock, GroupName, NodeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Periodically places queued jobs on active nodes under weight, version,
/// and priority constraints.
pub struct JobAssigner {
    registry: Arc<dyn NodeRegistry>,
    store: Arc<dyn JobStore>,
    state: Arc<LeaderState>,
    clock: Arc<dyn Clock>,
    group: GroupName,
    max_weight_per_node: u32,
}

impl JobAssigner {
    /// Creates a new assigner.
    pub fn new(
        registry: Arc<dyn NodeRegistry>,
        store: Arc<dyn JobStore>,
        state: Arc<LeaderState>,
        clock: Arc<dyn Clock>,
        group: GroupName,
        max_weight_per_node: u32,
    ) -> Self {
        Self {
            registry,
            store,
            state,
            clock,
            group,
            max_weight_per_node,
        }
    }

    /// Assigns queued jobs to eligible nodes. Leader-only; followers are
    /// no-ops.
    ///
    /// Jobs are processed highest-priority first with deterministic
    /// tie-breaks; a job with no eligible node stays queued and the pass
    /// continues (partial assignment is allowed). Remaining node capacity
    /// accounts for assignments made earlier in the same pass.
    pub async fn assign_queued_jobs(&self) -> ClusterResult<()> {
        if !self.state.is_leader() {
            return Ok(());
        }

        let now = self.clock.now();
        let nodes: Vec<Node> = self
            .registry
            .get_all_nodes()
            .await?
            .into_iter()
            .filter(|n| n.group == self.group && n.active)
            .collect();
        if nodes.is_empty() {
            return Ok(());
        }

        let mut capacity: HashMap<NodeId, i64> = nodes
            .iter()
            .map(|n| (n.id.clone(), i64::from(self.max_weight_per_node)))
            .collect();
        for running in self.state.running_snapshot() {
            if let Some(cap) = capacity.get_mut(&running.assigned_node) {
                *cap -= i64::from(running.weight());
            }
        }

        let mut queue = self.state.queued_snapshot();
        queue.sort_by(|a, b| a.priority().cmp(&b.priority()).then(a.id().cmp(b.id())));

        for queued in queue {
            if queued.weight() > self.max_weight_per_node {
                // A misdeclared job; it stays visible in the store for
                // operators instead of failing automatically.
                warn!(
                    job_id = %queued.id(),
                    weight = queued.weight(),
                    max_weight_per_node = self.max_weight_per_node,
                    "job cannot fit on any node; leaving it queued"
                );
                continue;
            }

            let weight = i64::from(queued.weight());
            let target = nodes
                .iter()
                .filter(|n| queued.job.version_rule.accepts(&n.version))
                .filter(|n| capacity.get(&n.id).is_some_and(|cap| *cap >= weight))
                .max_by(|a, b| {
                    capacity[&a.id]
                        .cmp(&capacity[&b.id])
                        .then_with(|| b.id.cmp(&a.id))
                });

            let Some(node) = target else {
                debug!(job_id = %queued.id(), "no eligible node; job stays queued");
                continue;
            };

            let running = self
                .store
                .move_queued_to_running(&queued, &node.id, now)
                .await?;
            if let Some(cap) = capacity.get_mut(&node.id) {
                *cap -= weight;
            }
            DutyMetrics::job_assigned(&running.job.job_type, node.id.as_str());
            info!(
                job_id = %queued.id(),
                node_id = %node.id,
                attempt = running.attempts,
                weight = queued.weight(),
                "assigned job"
            );
            self.state.record_assignment(running);
        }

        Ok(())
    }
}
