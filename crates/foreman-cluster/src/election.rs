//! Leader election by node age.
//!
//! Leadership is derived, not negotiated: every node periodically looks at
//! the same registry snapshot and concludes whether it is the oldest active
//! node of its group. The youngest-leader-age gate keeps a freshly
//! bootstrapped cluster from electing a transient leader.

use crate::config::LeaderConfig;
use crate::error::ClusterResult;
use crate::metrics::DutyMetrics;
use crate::node::{LocalNode, Node};
use crate::state::LeaderState;
use crate::store::{JobStore, NodeRegistry, ScheduleSource};
use chrono::Duration;
use foreman_core::Clock;
use std::sync::Arc;
use tracing::{debug, info};

/// Periodically decides whether this node holds leadership for its group.
pub struct LeaderElector {
    local: LocalNode,
    registry: Arc<dyn NodeRegistry>,
    jobs: Arc<dyn JobStore>,
    schedule: Arc<dyn ScheduleSource>,
    state: Arc<LeaderState>,
    clock: Arc<dyn Clock>,
    youngest_leader_age: Duration,
}

impl LeaderElector {
    /// Creates a new elector for the local node.
    pub fn new(
        local: LocalNode,
        config: &LeaderConfig,
        registry: Arc<dyn NodeRegistry>,
        jobs: Arc<dyn JobStore>,
        schedule: Arc<dyn ScheduleSource>,
        state: Arc<LeaderState>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            local,
            registry,
            jobs,
            schedule,
            state,
            clock,
            youngest_leader_age: Duration::seconds(config.youngest_leader_age_secs as i64),
        }
    }

    /// Recomputes this node's leader flag.
    ///
    /// Safe to call at any frequency; store errors propagate without a
    /// partial state update.
    pub async fn elect_cluster_leader(&self) -> ClusterResult<()> {
        DutyMetrics::election_run(self.local.group.as_str());
        let now = self.clock.now();

        let nodes = self.registry.get_all_nodes().await?;
        let mut candidates: Vec<&Node> = nodes
            .iter()
            .filter(|n| n.group == self.local.group && n.active)
            .collect();
        candidates.sort_by(|a, b| a.join_time.cmp(&b.join_time).then(a.id.cmp(&b.id)));

        let should_lead = match candidates.first() {
            None => false,
            Some(head) if head.age(now) < self.youngest_leader_age => {
                debug!(
                    group = %self.local.group,
                    oldest = %head.id,
                    "oldest active node is too young; no leader this tick"
                );
                false
            }
            Some(head) => head.id == self.local.id,
        };

        let was_leader = self.state.is_leader();
        if should_lead && !was_leader {
            // Load the mirrors before flipping the flag so the transition is
            // observable as a single step.
            let schedule = self.schedule.get_jobs_schedule().await?;
            let queued = self.jobs.get_queued_jobs().await?;
            let running = self.jobs.get_running_jobs().await?;
            self.state.acquire(schedule, queued, running);
            info!(
                node_id = %self.local.id,
                group = %self.local.group,
                "acquired group leadership"
            );
        } else if !should_lead && was_leader {
            self.state.resign();
            info!(
                node_id = %self.local.id,
                group = %self.local.group,
                "resigned group leadership"
            );
        }

        DutyMetrics::update_leader_status(self.local.group.as_str(), self.state.is_leader());
        Ok(())
    }
}
