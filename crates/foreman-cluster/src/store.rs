//! Contracts for the external collaborators of the leader duties.
//!
//! Persistence, the schedule catalogue, and the cloud provider live outside
//! this crate; the duties only see these traits. Every transitional move on
//! the job store must be atomic: a cancelled duty never leaves a lock in
//! both the queued and the running set.

use crate::error::ClusterResult;
use crate::job::{FinishedJob, JobOutcome, QueuedJob, RunningJob, ScheduledJob};
use crate::node::Node;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use foreman_core::{GroupName, NodeId};

/// Durable record of every node in the cluster.
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// Returns every registered node, active or not.
    async fn get_all_nodes(&self) -> ClusterResult<Vec<Node>>;

    /// Returns up to `count` active nodes of the group, youngest first.
    async fn get_youngest_active_nodes_by_group(
        &self,
        group: &GroupName,
        count: usize,
    ) -> ClusterResult<Vec<Node>>;

    /// Returns the number of active nodes in the group.
    async fn get_all_active_nodes_count_by_group(&self, group: &GroupName)
        -> ClusterResult<usize>;

    /// Returns all inactive (draining) nodes in the group.
    async fn get_all_inactive_nodes_by_group(&self, group: &GroupName)
        -> ClusterResult<Vec<Node>>;

    /// Marks a node active or inactive.
    async fn update_node_status(&self, node_id: &NodeId, active: bool) -> ClusterResult<()>;
}

/// Durable record of queued, running, and finished jobs.
///
/// The lock key is the primary key across queued + running: creating a
/// queued job whose lock is already present in either set fails with
/// `Conflict`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Returns all queued jobs.
    async fn get_queued_jobs(&self) -> ClusterResult<Vec<QueuedJob>>;

    /// Returns all running jobs.
    async fn get_running_jobs(&self) -> ClusterResult<Vec<RunningJob>>;

    /// Persists a freshly queued job instance.
    async fn create_queued_job(&self, job: &QueuedJob) -> ClusterResult<()>;

    /// Atomically moves a queued job to running on the given node.
    ///
    /// The returned record carries the incremented attempt count.
    async fn move_queued_to_running(
        &self,
        job: &QueuedJob,
        node_id: &NodeId,
        now: DateTime<Utc>,
    ) -> ClusterResult<RunningJob>;

    /// Atomically moves a running job back to the queue.
    ///
    /// The lost run counts as a consumed attempt.
    async fn move_running_to_queued(&self, job: &RunningJob) -> ClusterResult<QueuedJob>;

    /// Atomically terminalizes a running job.
    async fn move_running_to_finished(
        &self,
        job: &RunningJob,
        outcome: JobOutcome,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> ClusterResult<FinishedJob>;
}

/// Lazy catalogue of declared scheduled jobs.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Returns the full current schedule.
    async fn get_jobs_schedule(&self) -> ClusterResult<Vec<ScheduledJob>>;
}

/// Side-effecting SPI of the cloud provider.
///
/// Both calls are fire-and-forget; the scale controller guards repeats with
/// its own timers, so idempotence is not required here.
#[async_trait]
pub trait CloudManager: Send + Sync {
    /// Requests `count` new nodes.
    async fn scale_up(&self, count: u32) -> ClusterResult<()>;

    /// Physically removes the given nodes.
    async fn scale_down(&self, node_ids: Vec<NodeId>) -> ClusterResult<()>;
}
