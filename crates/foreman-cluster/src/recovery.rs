//! Recovery of jobs stranded on dead or drained nodes.

use crate::error::ClusterResult;
use crate::job::JobOutcome;
use crate::metrics::DutyMetrics;
use crate::state::LeaderState;
use crate::store::{JobStore, NodeRegistry};
use foreman_core::{Clock, GroupName, NodeId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Periodically requeues or finalizes jobs whose owner node is gone.
pub struct DeadNodeRecoverer {
    registry: Arc<dyn NodeRegistry>,
    store: Arc<dyn JobStore>,
    state: Arc<LeaderState>,
    clock: Arc<dyn Clock>,
    group: GroupName,
}

impl DeadNodeRecoverer {
    /// Creates a new recoverer.
    pub fn new(
        registry: Arc<dyn NodeRegistry>,
        store: Arc<dyn JobStore>,
        state: Arc<LeaderState>,
        clock: Arc<dyn Clock>,
        group: GroupName,
    ) -> Self {
        Self {
            registry,
            store,
            state,
            clock,
            group,
        }
    }

    /// Recovers every running job whose node is absent or inactive.
    /// Leader-only; followers are no-ops.
    ///
    /// Jobs with attempts to spare go back to the queue; exhausted jobs are
    /// failed permanently. The node-absence check uses one registry snapshot
    /// for the whole invocation.
    pub async fn clean_dead_nodes_jobs(&self) -> ClusterResult<()> {
        if !self.state.is_leader() {
            return Ok(());
        }

        let now = self.clock.now();
        let alive: HashSet<NodeId> = self
            .registry
            .get_all_nodes()
            .await?
            .into_iter()
            .filter(|n| n.group == self.group && n.active)
            .map(|n| n.id)
            .collect();

        let mut stranded = self.state.running_snapshot();
        stranded.retain(|job| !alive.contains(&job.assigned_node));
        stranded.sort_by(|a, b| a.lock().cmp(b.lock()));

        for job in stranded {
            if job.is_exhausted() {
                let message = format!(
                    "{} is dead and max attempts has been reached",
                    job.assigned_node
                );
                let finished = self
                    .store
                    .move_running_to_finished(&job, JobOutcome::Failure, Some(message), now)
                    .await?;
                DutyMetrics::job_failed(&finished.job.job_type);
                warn!(
                    job_id = %job.id(),
                    node_id = %job.assigned_node,
                    attempts = job.attempts,
                    "failed job from dead node; attempts exhausted"
                );
                self.state.record_finished(job.lock());
            } else {
                let queued = self.store.move_running_to_queued(&job).await?;
                DutyMetrics::job_requeued(&queued.job.job_type);
                warn!(
                    job_id = %job.id(),
                    node_id = %job.assigned_node,
                    attempts = queued.attempts,
                    "requeued job from dead node"
                );
                self.state.record_requeue(queued);
            }
        }

        Ok(())
    }
}
