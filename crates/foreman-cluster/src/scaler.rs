//! Hysteretic capacity autoscaler.
//!
//! Two timers shape the loop: a cool-down that dominates every signal after
//! a scale event, and an evaluation window a threshold breach must outlast
//! before the controller acts. Scale-down is a two-phase drain: the youngest
//! nodes are marked inactive first and removed only once idle, so capacity
//! invariants hold while in-flight work finishes.

use crate::config::ScaleConfig;
use crate::error::ClusterResult;
use crate::metrics::ScaleMetrics;
use crate::state::LeaderState;
use crate::store::{CloudManager, NodeRegistry};
use chrono::{DateTime, Duration, Utc};
use foreman_core::{Clock, GroupName, NodeId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cross-tick scale state.
///
/// The three fields transition jointly; they live behind one mutex instead
/// of independent atomics.
#[derive(Debug, Clone)]
struct ScaleTimers {
    last_scale_activity: DateTime<Utc>,
    scale_up_needed_since: Option<DateTime<Utc>>,
    scale_down_needed_since: Option<DateTime<Utc>>,
}

impl Default for ScaleTimers {
    fn default() -> Self {
        Self {
            last_scale_activity: DateTime::<Utc>::UNIX_EPOCH,
            scale_up_needed_since: None,
            scale_down_needed_since: None,
        }
    }
}

/// Capacity-based autoscaling control loop.
pub struct ScaleController {
    registry: Arc<dyn NodeRegistry>,
    cloud: Arc<dyn CloudManager>,
    state: Arc<LeaderState>,
    clock: Arc<dyn Clock>,
    group: GroupName,
    config: ScaleConfig,
    timers: Mutex<ScaleTimers>,
}

impl ScaleController {
    /// Creates a new controller.
    pub fn new(
        registry: Arc<dyn NodeRegistry>,
        cloud: Arc<dyn CloudManager>,
        state: Arc<LeaderState>,
        clock: Arc<dyn Clock>,
        group: GroupName,
        config: ScaleConfig,
    ) -> Self {
        Self {
            registry,
            cloud,
            state,
            clock,
            group,
            config,
            timers: Mutex::new(ScaleTimers::default()),
        }
    }

    fn cool_down(&self) -> Duration {
        Duration::seconds(self.config.cool_down_secs as i64)
    }

    fn evaluation_period(&self) -> Duration {
        Duration::seconds(self.config.evaluation_period_secs as i64)
    }

    /// Evaluates cluster utilisation and drives scale-up or scale-down.
    /// Leader-only; followers are no-ops.
    ///
    /// `queued_and_running_weight` is the summed weight of all queued and
    /// running jobs; `active_capacity` the summed weight capacity of active
    /// nodes (> 0).
    pub async fn scale_cluster(
        &self,
        queued_and_running_weight: u64,
        active_capacity: u64,
    ) -> ClusterResult<()> {
        if !self.state.is_leader() {
            return Ok(());
        }

        let now = self.clock.now();
        {
            let timers = self.timers.lock();
            if now - timers.last_scale_activity < self.cool_down() {
                debug!(group = %self.group, "within cool-down; skipping scale evaluation");
                return Ok(());
            }
        }

        if active_capacity == 0 {
            warn!(group = %self.group, "no active capacity to evaluate; skipping");
            return Ok(());
        }

        let util = (queued_and_running_weight as f64 / active_capacity as f64) * 100.0;
        ScaleMetrics::utilisation(self.group.as_str(), util);
        debug!(group = %self.group, utilisation = util, "evaluated cluster utilisation");

        if util > f64::from(self.config.scale_up_threshold) {
            self.timers.lock().scale_down_needed_since = None;
            self.scale_up_if_due(now).await
        } else if util < f64::from(self.config.scale_down_threshold) {
            self.timers.lock().scale_up_needed_since = None;
            self.scale_down_if_due(now).await
        } else {
            // Inside the dead band both pending windows are cancelled.
            let mut timers = self.timers.lock();
            timers.scale_up_needed_since = None;
            timers.scale_down_needed_since = None;
            Ok(())
        }
    }

    async fn scale_up_if_due(&self, now: DateTime<Utc>) -> ClusterResult<()> {
        let since = {
            let mut timers = self.timers.lock();
            match timers.scale_up_needed_since {
                None => {
                    timers.scale_up_needed_since = Some(now);
                    debug!(group = %self.group, "scale-up window opened");
                    return Ok(());
                }
                Some(since) => since,
            }
        };

        if now - since < self.evaluation_period() {
            return Ok(());
        }

        let active = self
            .registry
            .get_all_active_nodes_count_by_group(&self.group)
            .await? as u32;
        if active >= self.config.max_nodes {
            // The ceiling is a resource fact, not a signal change; the
            // window stays open.
            debug!(group = %self.group, active, "at max nodes; scale-up suppressed");
            return Ok(());
        }

        let step = self.config.scale_up_step.min(self.config.max_nodes - active);
        self.cloud.scale_up(step).await?;

        let mut timers = self.timers.lock();
        timers.last_scale_activity = now;
        timers.scale_up_needed_since = None;
        ScaleMetrics::scale_up(self.group.as_str(), step);
        info!(group = %self.group, count = step, "requested scale-up");
        Ok(())
    }

    async fn scale_down_if_due(&self, now: DateTime<Utc>) -> ClusterResult<()> {
        let since = {
            let mut timers = self.timers.lock();
            match timers.scale_down_needed_since {
                None => {
                    timers.scale_down_needed_since = Some(now);
                    debug!(group = %self.group, "scale-down window opened");
                    return Ok(());
                }
                Some(since) => since,
            }
        };

        if now - since < self.evaluation_period() {
            return Ok(());
        }

        let active = self
            .registry
            .get_all_active_nodes_count_by_group(&self.group)
            .await? as u32;
        if active <= self.config.min_nodes {
            debug!(group = %self.group, active, "at min nodes; scale-down suppressed");
            return Ok(());
        }

        // Phase one of the drain: mark the youngest nodes inactive so the
        // assigner stops feeding them. Young nodes are the least likely to
        // hold long-running work, and the oldest node (the leader) is never
        // selected.
        let step = self
            .config
            .scale_down_step
            .min(active - self.config.min_nodes) as usize;
        let victims = self
            .registry
            .get_youngest_active_nodes_by_group(&self.group, step)
            .await?;
        for node in &victims {
            self.registry.update_node_status(&node.id, false).await?;
        }

        let mut timers = self.timers.lock();
        timers.last_scale_activity = now;
        timers.scale_down_needed_since = None;
        ScaleMetrics::scale_down(self.group.as_str(), victims.len());
        info!(
            group = %self.group,
            nodes = ?victims.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            "marked nodes for drain-down"
        );
        Ok(())
    }

    /// Physically removes drained nodes that hold no running jobs.
    /// Leader-only; followers are no-ops.
    pub async fn clean_inactive_nodes(&self, busy_nodes: &HashSet<NodeId>) -> ClusterResult<()> {
        if !self.state.is_leader() {
            return Ok(());
        }

        let inactive = self
            .registry
            .get_all_inactive_nodes_by_group(&self.group)
            .await?;
        let idle: Vec<NodeId> = inactive
            .into_iter()
            .filter(|n| !busy_nodes.contains(&n.id))
            .map(|n| n.id)
            .collect();
        if idle.is_empty() {
            return Ok(());
        }

        info!(group = %self.group, nodes = ?idle.iter().map(NodeId::as_str).collect::<Vec<_>>(), "removing idle drained nodes");
        self.cloud.scale_down(idle).await
    }
}
