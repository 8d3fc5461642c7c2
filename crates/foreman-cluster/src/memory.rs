//! In-memory store backend.
//!
//! Reference implementations of the store contracts, used by embedding
//! applications that keep cluster state in process and by the test suites.
//! The job store enforces lock uniqueness across queued + running and
//! performs every transitional move under a single critical section.

use crate::error::{ClusterError, ClusterResult};
use crate::job::{FinishedJob, JobOutcome, QueuedJob, RunningJob, ScheduledJob};
use crate::node::Node;
use crate::store::{CloudManager, JobStore, NodeRegistry, ScheduleSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use foreman_core::{GroupName, LockKey, NodeId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory node registry.
#[derive(Default)]
pub struct InMemoryNodeRegistry {
    nodes: RwLock<HashMap<NodeId, Node>>,
    unavailable: AtomicBool,
}

impl InMemoryNodeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a node.
    pub fn add_node(&self, node: Node) {
        self.nodes.write().insert(node.id.clone(), node);
    }

    /// Removes a node entirely, as if its machine vanished.
    pub fn remove_node(&self, node_id: &NodeId) -> bool {
        self.nodes.write().remove(node_id).is_some()
    }

    /// Simulates registry unavailability for failure-path tests.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> ClusterResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ClusterError::Store("node registry unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeRegistry for InMemoryNodeRegistry {
    async fn get_all_nodes(&self) -> ClusterResult<Vec<Node>> {
        self.check_available()?;
        let mut nodes: Vec<Node> = self.nodes.read().values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn get_youngest_active_nodes_by_group(
        &self,
        group: &GroupName,
        count: usize,
    ) -> ClusterResult<Vec<Node>> {
        self.check_available()?;
        let mut nodes: Vec<Node> = self
            .nodes
            .read()
            .values()
            .filter(|n| &n.group == group && n.active)
            .cloned()
            .collect();
        // Youngest first, node id as the deterministic tie-break.
        nodes.sort_by(|a, b| b.join_time.cmp(&a.join_time).then(a.id.cmp(&b.id)));
        nodes.truncate(count);
        Ok(nodes)
    }

    async fn get_all_active_nodes_count_by_group(
        &self,
        group: &GroupName,
    ) -> ClusterResult<usize> {
        self.check_available()?;
        Ok(self
            .nodes
            .read()
            .values()
            .filter(|n| &n.group == group && n.active)
            .count())
    }

    async fn get_all_inactive_nodes_by_group(
        &self,
        group: &GroupName,
    ) -> ClusterResult<Vec<Node>> {
        self.check_available()?;
        let mut nodes: Vec<Node> = self
            .nodes
            .read()
            .values()
            .filter(|n| &n.group == group && !n.active)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn update_node_status(&self, node_id: &NodeId, active: bool) -> ClusterResult<()> {
        self.check_available()?;
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(node_id)
            .ok_or_else(|| ClusterError::NotFound(format!("node {}", node_id)))?;
        node.active = active;
        Ok(())
    }
}

#[derive(Default)]
struct JobsInner {
    queued: HashMap<LockKey, QueuedJob>,
    running: HashMap<LockKey, RunningJob>,
    finished: Vec<FinishedJob>,
}

/// In-memory job store.
#[derive(Default)]
pub struct InMemoryJobStore {
    inner: Mutex<JobsInner>,
    unavailable: AtomicBool,
}

impl InMemoryJobStore {
    /// Creates an empty job store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all finished jobs, oldest first.
    pub fn finished_jobs(&self) -> Vec<FinishedJob> {
        self.inner.lock().finished.clone()
    }

    /// Directly inserts a running job, for seeding test scenarios.
    pub fn seed_running_job(&self, job: RunningJob) -> ClusterResult<()> {
        let mut inner = self.inner.lock();
        if inner.queued.contains_key(job.lock()) || inner.running.contains_key(job.lock()) {
            return Err(ClusterError::Conflict(format!(
                "lock {} already present",
                job.lock()
            )));
        }
        inner.running.insert(job.lock().clone(), job);
        Ok(())
    }

    /// Simulates store unavailability for failure-path tests.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> ClusterResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ClusterError::Store("job store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get_queued_jobs(&self) -> ClusterResult<Vec<QueuedJob>> {
        self.check_available()?;
        let mut jobs: Vec<QueuedJob> = self.inner.lock().queued.values().cloned().collect();
        jobs.sort_by(|a, b| a.lock().cmp(b.lock()));
        Ok(jobs)
    }

    async fn get_running_jobs(&self) -> ClusterResult<Vec<RunningJob>> {
        self.check_available()?;
        let mut jobs: Vec<RunningJob> = self.inner.lock().running.values().cloned().collect();
        jobs.sort_by(|a, b| a.lock().cmp(b.lock()));
        Ok(jobs)
    }

    async fn create_queued_job(&self, job: &QueuedJob) -> ClusterResult<()> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        if inner.queued.contains_key(job.lock()) || inner.running.contains_key(job.lock()) {
            return Err(ClusterError::Conflict(format!(
                "an instance of lock {} is already queued or running",
                job.lock()
            )));
        }
        inner.queued.insert(job.lock().clone(), job.clone());
        Ok(())
    }

    async fn move_queued_to_running(
        &self,
        job: &QueuedJob,
        node_id: &NodeId,
        now: DateTime<Utc>,
    ) -> ClusterResult<RunningJob> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        inner
            .queued
            .remove(job.lock())
            .ok_or_else(|| ClusterError::NotFound(format!("queued job {}", job.lock())))?;
        let running = job.start(node_id.clone(), now);
        if inner
            .running
            .insert(running.lock().clone(), running.clone())
            .is_some()
        {
            return Err(ClusterError::InvariantViolation(format!(
                "lock {} was queued and running at once",
                job.lock()
            )));
        }
        Ok(running)
    }

    async fn move_running_to_queued(&self, job: &RunningJob) -> ClusterResult<QueuedJob> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        inner
            .running
            .remove(job.lock())
            .ok_or_else(|| ClusterError::NotFound(format!("running job {}", job.lock())))?;
        let queued = job.requeue();
        if inner
            .queued
            .insert(queued.lock().clone(), queued.clone())
            .is_some()
        {
            return Err(ClusterError::InvariantViolation(format!(
                "lock {} was queued and running at once",
                job.lock()
            )));
        }
        Ok(queued)
    }

    async fn move_running_to_finished(
        &self,
        job: &RunningJob,
        outcome: JobOutcome,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> ClusterResult<FinishedJob> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        inner
            .running
            .remove(job.lock())
            .ok_or_else(|| ClusterError::NotFound(format!("running job {}", job.lock())))?;
        let finished = job.finish(outcome, message, now);
        inner.finished.push(finished.clone());
        Ok(finished)
    }
}

/// In-memory schedule catalogue.
#[derive(Default)]
pub struct InMemoryScheduleSource {
    jobs: RwLock<Vec<ScheduledJob>>,
}

impl InMemoryScheduleSource {
    /// Creates an empty catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the catalogue contents.
    pub fn set_schedule(&self, jobs: Vec<ScheduledJob>) {
        *self.jobs.write() = jobs;
    }

    /// Appends a declaration to the catalogue.
    pub fn add_job(&self, job: ScheduledJob) {
        self.jobs.write().push(job);
    }
}

#[async_trait]
impl ScheduleSource for InMemoryScheduleSource {
    async fn get_jobs_schedule(&self) -> ClusterResult<Vec<ScheduledJob>> {
        Ok(self.jobs.read().clone())
    }
}

/// Cloud manager that records calls instead of provisioning machines.
#[derive(Default)]
pub struct RecordingCloudManager {
    scale_up_calls: Mutex<Vec<u32>>,
    scale_down_calls: Mutex<Vec<Vec<NodeId>>>,
    unavailable: AtomicBool,
}

impl RecordingCloudManager {
    /// Creates a recorder with no calls.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded scale-up requests.
    pub fn scale_up_calls(&self) -> Vec<u32> {
        self.scale_up_calls.lock().clone()
    }

    /// Returns the recorded scale-down requests.
    pub fn scale_down_calls(&self) -> Vec<Vec<NodeId>> {
        self.scale_down_calls.lock().clone()
    }

    /// Returns the total number of cloud calls recorded.
    pub fn call_count(&self) -> usize {
        self.scale_up_calls.lock().len() + self.scale_down_calls.lock().len()
    }

    /// Simulates cloud unavailability for failure-path tests.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> ClusterResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ClusterError::Cloud("cloud manager unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CloudManager for RecordingCloudManager {
    async fn scale_up(&self, count: u32) -> ClusterResult<()> {
        self.check_available()?;
        self.scale_up_calls.lock().push(count);
        Ok(())
    }

    async fn scale_down(&self, node_ids: Vec<NodeId>) -> ClusterResult<()> {
        self.check_available()?;
        self.scale_down_calls.lock().push(node_ids);
        Ok(())
    }
}
