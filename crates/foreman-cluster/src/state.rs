//! Per-node mirror of the cluster state the leader needs.
//!
//! The store stays authoritative; this is a cache owned by the local duty
//! executor. Followers keep an empty mirror. Leadership transitions swap the
//! flag and all three mirrors under one write lock, so a reader never sees a
//! leader flag without its mirrors (or the reverse).

use crate::job::{QueuedJob, RunningJob, ScheduledJob};
use foreman_core::LockKey;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct LeaderStateInner {
    is_leader: bool,
    schedule: Vec<ScheduledJob>,
    queued: HashMap<LockKey, QueuedJob>,
    running: HashMap<LockKey, RunningJob>,
}

/// In-memory leader state mirror.
#[derive(Default)]
pub struct LeaderState {
    inner: RwLock<LeaderStateInner>,
}

impl LeaderState {
    /// Creates an empty follower-state mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if this node currently holds leadership.
    pub fn is_leader(&self) -> bool {
        self.inner.read().is_leader
    }

    /// Takes leadership, installing the freshly loaded mirrors in the same
    /// step.
    pub fn acquire(
        &self,
        schedule: Vec<ScheduledJob>,
        queued: Vec<QueuedJob>,
        running: Vec<RunningJob>,
    ) {
        let mut inner = self.inner.write();
        inner.is_leader = true;
        inner.schedule = schedule;
        inner.queued = queued
            .into_iter()
            .map(|job| (job.lock().clone(), job))
            .collect();
        inner.running = running
            .into_iter()
            .map(|job| (job.lock().clone(), job))
            .collect();
    }

    /// Drops leadership and clears all mirrors in the same step.
    pub fn resign(&self) {
        let mut inner = self.inner.write();
        inner.is_leader = false;
        inner.schedule.clear();
        inner.queued.clear();
        inner.running.clear();
    }

    /// Replaces the schedule mirror.
    pub fn replace_schedule(&self, schedule: Vec<ScheduledJob>) {
        self.inner.write().schedule = schedule;
    }

    /// Returns a snapshot of the schedule mirror.
    pub fn schedule_snapshot(&self) -> Vec<ScheduledJob> {
        self.inner.read().schedule.clone()
    }

    /// Returns true if any queued or running instance holds the lock.
    pub fn holds_lock(&self, lock: &LockKey) -> bool {
        let inner = self.inner.read();
        inner.queued.contains_key(lock) || inner.running.contains_key(lock)
    }

    /// Mirrors a freshly queued job.
    pub fn insert_queued(&self, job: QueuedJob) {
        self.inner.write().queued.insert(job.lock().clone(), job);
    }

    /// Mirrors a queued-to-running transition.
    pub fn record_assignment(&self, job: RunningJob) {
        let mut inner = self.inner.write();
        inner.queued.remove(job.lock());
        inner.running.insert(job.lock().clone(), job);
    }

    /// Mirrors a running-to-queued transition.
    pub fn record_requeue(&self, job: QueuedJob) {
        let mut inner = self.inner.write();
        inner.running.remove(job.lock());
        inner.queued.insert(job.lock().clone(), job);
    }

    /// Mirrors a running-to-finished transition.
    pub fn record_finished(&self, lock: &LockKey) {
        self.inner.write().running.remove(lock);
    }

    /// Returns a snapshot of the queued mirror.
    pub fn queued_snapshot(&self) -> Vec<QueuedJob> {
        self.inner.read().queued.values().cloned().collect()
    }

    /// Returns a snapshot of the running mirror.
    pub fn running_snapshot(&self) -> Vec<RunningJob> {
        self.inner.read().running.values().cloned().collect()
    }

    /// Returns the summed weight of all queued and running jobs.
    pub fn total_mirrored_weight(&self) -> u64 {
        let inner = self.inner.read();
        let queued: u64 = inner.queued.values().map(|j| u64::from(j.weight())).sum();
        let running: u64 = inner.running.values().map(|j| u64::from(j.weight())).sum();
        queued + running
    }
}
