//! Turning due schedule entries into queued job records.

use crate::error::{ClusterError, ClusterResult};
use crate::metrics::DutyMetrics;
use crate::state::LeaderState;
use crate::store::JobStore;
use foreman_core::Clock;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Periodically queues every due schedule entry whose lock is free.
pub struct JobQueuer {
    store: Arc<dyn JobStore>,
    state: Arc<LeaderState>,
    clock: Arc<dyn Clock>,
}

impl JobQueuer {
    /// Creates a new queuer.
    pub fn new(store: Arc<dyn JobStore>, state: Arc<LeaderState>, clock: Arc<dyn Clock>) -> Self {
        Self { store, state, clock }
    }

    /// Queues all due scheduled jobs. Leader-only; followers are no-ops.
    ///
    /// A firing is skipped when an instance of the same lock is already
    /// queued or running, and when the firing is older than the schedule's
    /// freshness window. Persistence precedes the mirror update: a failed
    /// write leaves the mirror untouched.
    pub async fn queue_scheduled_jobs(&self) -> ClusterResult<()> {
        if !self.state.is_leader() {
            return Ok(());
        }

        let now = self.clock.now();
        let mut queued_count = 0usize;

        for entry in self.state.schedule_snapshot() {
            if self.state.holds_lock(&entry.lock) {
                continue;
            }

            let due = match entry.schedule.due_at(now) {
                Ok(due) => due,
                Err(e) => {
                    error!(job_id = %entry.id, error = %e, "skipping entry with invalid schedule");
                    continue;
                }
            };
            if due.is_none() {
                continue;
            }

            let queued = entry.to_queued(now);
            match self.store.create_queued_job(&queued).await {
                Ok(()) => {
                    DutyMetrics::job_queued(&entry.job_type);
                    self.state.insert_queued(queued);
                    queued_count += 1;
                }
                Err(ClusterError::Conflict(_)) => {
                    // Another leader won the write; lock uniqueness bounds
                    // the damage of brief double-leadership.
                    warn!(lock = %entry.lock, "lost the queueing race for lock");
                }
                Err(e) => return Err(e),
            }
        }

        if queued_count > 0 {
            info!(count = queued_count, "queued due scheduled jobs");
        }
        Ok(())
    }
}
