//! Job records and their lifecycle transitions.
//!
//! A `ScheduledJob` is the eternal declaration; each due cron firing turns it
//! into a `QueuedJob`, assignment turns that into a `RunningJob`, and the
//! worker or the dead-node recoverer terminalizes it as a `FinishedJob`.

use crate::error::{ClusterError, ClusterResult};
use crate::node::VersionRule;
use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use foreman_core::{JobId, LockKey, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Cron schedule with a freshness window.
///
/// A firing older than `max_job_age` is skipped, not backfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSchedule {
    /// Cron expression (seconds-resolution, e.g. "0 */5 * * * *").
    pub cron: String,

    /// Maximum age of a firing that may still be queued, in seconds.
    pub max_job_age_secs: u64,
}

impl JobSchedule {
    /// Creates a new schedule.
    pub fn new(cron: impl Into<String>, max_job_age_secs: u64) -> Self {
        Self {
            cron: cron.into(),
            max_job_age_secs,
        }
    }

    /// Returns the freshness window as a chrono Duration.
    pub fn max_job_age(&self) -> Duration {
        Duration::seconds(self.max_job_age_secs as i64)
    }

    /// Validates the cron expression.
    pub fn validate(&self) -> ClusterResult<()> {
        Schedule::from_str(&self.cron)
            .map_err(|e| ClusterError::InvalidSchedule(format!("{}: {}", self.cron, e)))?;
        Ok(())
    }

    /// Returns the most recent firing within the freshness window, if any.
    ///
    /// A firing `t` is due iff `t <= now` and `now - t <= max_job_age`.
    pub fn due_at(&self, now: DateTime<Utc>) -> ClusterResult<Option<DateTime<Utc>>> {
        let schedule = Schedule::from_str(&self.cron)
            .map_err(|e| ClusterError::InvalidSchedule(format!("{}: {}", self.cron, e)))?;

        // after() is exclusive; step back one second so a firing exactly
        // max_job_age old still counts.
        let window_start = now - self.max_job_age() - Duration::seconds(1);

        let mut due = None;
        for firing in schedule.after(&window_start) {
            if firing > now {
                break;
            }
            due = Some(firing);
        }
        Ok(due)
    }
}

/// Terminal outcome of a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// The job completed successfully.
    Success,
    /// The job failed.
    Failure,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Success => write!(f, "success"),
            JobOutcome::Failure => write!(f, "failure"),
        }
    }
}

/// A declared scheduled job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Unique job identifier.
    pub id: JobId,

    /// Serialization key: at most one queued-or-running instance per lock.
    pub lock: LockKey,

    /// Job type, resolved by the worker layer.
    pub job_type: String,

    /// Load score summed against a node's weight capacity.
    pub weight: u32,

    /// Opaque payload handed to the worker.
    pub data: HashMap<String, String>,

    /// When this job fires.
    pub schedule: JobSchedule,

    /// Maximum attempts before the job is failed permanently.
    pub max_attempts: u32,

    /// Priority; lower values are assigned first.
    pub priority: i32,

    /// Node version constraint for assignment.
    #[serde(default)]
    pub version_rule: VersionRule,
}

impl ScheduledJob {
    /// Creates a new scheduled job with default weight, attempts, and
    /// priority.
    pub fn new(
        id: impl Into<JobId>,
        lock: impl Into<LockKey>,
        job_type: impl Into<String>,
        schedule: JobSchedule,
    ) -> Self {
        Self {
            id: id.into(),
            lock: lock.into(),
            job_type: job_type.into(),
            weight: 1,
            data: HashMap::new(),
            schedule,
            max_attempts: 3,
            priority: 0,
            version_rule: VersionRule::Any,
        }
    }

    /// Builder method to set the weight.
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Builder method to set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Builder method to set the maximum attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Builder method to add a payload entry.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Builder method to set the node version constraint.
    pub fn with_version_rule(mut self, rule: VersionRule) -> Self {
        self.version_rule = rule;
        self
    }

    /// Validates the job declaration.
    pub fn validate(&self) -> ClusterResult<()> {
        if self.job_type.is_empty() {
            return Err(ClusterError::Configuration(format!(
                "job {} has an empty job_type",
                self.id
            )));
        }
        if self.weight == 0 {
            return Err(ClusterError::Configuration(format!(
                "job {} must have a positive weight",
                self.id
            )));
        }
        if self.max_attempts == 0 {
            return Err(ClusterError::Configuration(format!(
                "job {} must allow at least one attempt",
                self.id
            )));
        }
        self.schedule.validate()
    }

    /// Derives a queued instance for the firing at `now`.
    pub fn to_queued(&self, now: DateTime<Utc>) -> QueuedJob {
        QueuedJob {
            job: self.clone(),
            queued_time: now,
            attempts: 0,
        }
    }
}

/// A job instance waiting for assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    /// Snapshot of the declaration this instance was derived from.
    pub job: ScheduledJob,

    /// When this instance was queued.
    pub queued_time: DateTime<Utc>,

    /// Attempts consumed so far.
    pub attempts: u32,
}

impl QueuedJob {
    /// Returns the lock key.
    pub fn lock(&self) -> &LockKey {
        &self.job.lock
    }

    /// Returns the job id.
    pub fn id(&self) -> &JobId {
        &self.job.id
    }

    /// Returns the job weight.
    pub fn weight(&self) -> u32 {
        self.job.weight
    }

    /// Returns the job priority.
    pub fn priority(&self) -> i32 {
        self.job.priority
    }

    /// Transitions this instance to running on the given node.
    pub fn start(&self, node_id: NodeId, now: DateTime<Utc>) -> RunningJob {
        RunningJob {
            job: self.job.clone(),
            queued_time: self.queued_time,
            attempts: self.attempts + 1,
            assigned_node: node_id,
            start_time: now,
        }
    }
}

/// A job instance executing on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningJob {
    /// Snapshot of the declaration this instance was derived from.
    pub job: ScheduledJob,

    /// When this instance was queued.
    pub queued_time: DateTime<Utc>,

    /// Attempts consumed so far; at least 1 while running.
    pub attempts: u32,

    /// Node executing this instance.
    pub assigned_node: NodeId,

    /// When execution started.
    pub start_time: DateTime<Utc>,
}

impl RunningJob {
    /// Returns the lock key.
    pub fn lock(&self) -> &LockKey {
        &self.job.lock
    }

    /// Returns the job id.
    pub fn id(&self) -> &JobId {
        &self.job.id
    }

    /// Returns the job weight.
    pub fn weight(&self) -> u32 {
        self.job.weight
    }

    /// Returns true if no further attempt is allowed.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.job.max_attempts
    }

    /// Transitions this instance back to queued after its node was lost.
    ///
    /// The lost run consumed an attempt.
    pub fn requeue(&self) -> QueuedJob {
        QueuedJob {
            job: self.job.clone(),
            queued_time: self.queued_time,
            attempts: self.attempts + 1,
        }
    }

    /// Terminalizes this instance.
    pub fn finish(
        &self,
        outcome: JobOutcome,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> FinishedJob {
        FinishedJob {
            job: self.job.clone(),
            queued_time: self.queued_time,
            attempts: self.attempts,
            assigned_node: self.assigned_node.clone(),
            start_time: self.start_time,
            finish_time: now,
            outcome,
            message,
        }
    }
}

/// A terminalized job instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedJob {
    /// Snapshot of the declaration this instance was derived from.
    pub job: ScheduledJob,

    /// When this instance was queued.
    pub queued_time: DateTime<Utc>,

    /// Attempts consumed.
    pub attempts: u32,

    /// Node that last executed this instance.
    pub assigned_node: NodeId,

    /// When the last execution started.
    pub start_time: DateTime<Utc>,

    /// When the instance was terminalized.
    pub finish_time: DateTime<Utc>,

    /// Terminal outcome.
    pub outcome: JobOutcome,

    /// Optional operator-facing message.
    pub message: Option<String>,
}
