//! Foreman Cluster - Leader Duties Core
//!
//! The leader side of a distributed job-scheduling cluster:
//! - Single-leader election per node group, decided by node age
//! - Cron-driven queueing of scheduled jobs with per-lock serialization
//! - Weight- and version-aware assignment of queued jobs to active nodes
//! - Recovery of jobs stranded on dead or drained nodes
//! - A hysteretic capacity autoscaler driving an external cloud provider
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Leader Duties Core                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   DutyRunner (periodic ticks, one serial loop per node)          │
//! │      │                                                           │
//! │      ├─ LeaderElector ──────► LeaderState (flag + mirrors)       │
//! │      ├─ ScheduleRefresher ──► schedule mirror                    │
//! │      ├─ JobQueuer ──────────► queued jobs                        │
//! │      ├─ JobAssigner ────────► running jobs                       │
//! │      ├─ DeadNodeRecoverer ──► requeue / finalize                 │
//! │      └─ ScaleController ────► drain / provision                  │
//! │                                                                  │
//! │   External collaborators (trait contracts):                      │
//! │                                                                  │
//! │   ┌──────────────┐ ┌──────────┐ ┌──────────────┐ ┌────────────┐  │
//! │   │ NodeRegistry │ │ JobStore │ │ScheduleSource│ │CloudManager│  │
//! │   └──────────────┘ └──────────┘ └──────────────┘ └────────────┘  │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use foreman_cluster::{ClusterConfig, DutyRunner, LocalNode};
//! use foreman_core::SystemClock;
//! use std::sync::Arc;
//!
//! let runner = DutyRunner::new(
//!     LocalNode::new("node-1", "default"),
//!     ClusterConfig::default(),
//!     registry,
//!     job_store,
//!     schedule_source,
//!     cloud_manager,
//!     Arc::new(SystemClock),
//! )?;
//!
//! tokio::spawn(async move { runner.start().await });
//! ```

pub mod assigner;
pub mod config;
pub mod election;
pub mod error;
pub mod job;
pub mod memory;
pub mod metrics;
pub mod node;
pub mod queuer;
pub mod recovery;
pub mod refresh;
pub mod runner;
pub mod scaler;
pub mod state;
pub mod store;

pub use assigner::JobAssigner;
pub use config::{ClusterConfig, LeaderConfig, RunnerConfig, ScaleConfig};
pub use election::LeaderElector;
pub use error::{ClusterError, ClusterResult};
pub use job::{FinishedJob, JobOutcome, JobSchedule, QueuedJob, RunningJob, ScheduledJob};
pub use memory::{
    InMemoryJobStore, InMemoryNodeRegistry, InMemoryScheduleSource, RecordingCloudManager,
};
pub use metrics::{register_metrics, DutyMetrics, ScaleMetrics};
pub use node::{LocalNode, Node, NodeVersion, VersionRule};
pub use queuer::JobQueuer;
pub use recovery::DeadNodeRecoverer;
pub use refresh::ScheduleRefresher;
pub use runner::DutyRunner;
pub use scaler::ScaleController;
pub use state::LeaderState;
pub use store::{CloudManager, JobStore, NodeRegistry, ScheduleSource};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::ClusterConfig;
    pub use crate::error::{ClusterError, ClusterResult};
    pub use crate::job::{JobOutcome, JobSchedule, QueuedJob, RunningJob, ScheduledJob};
    pub use crate::node::{LocalNode, Node, NodeVersion, VersionRule};
    pub use crate::runner::DutyRunner;
    pub use crate::store::{CloudManager, JobStore, NodeRegistry, ScheduleSource};
    pub use foreman_core::{Clock, GroupName, JobId, LockKey, NodeId, SystemClock};
}
