//! Schedule cache refresh.

use crate::error::ClusterResult;
use crate::state::LeaderState;
use crate::store::ScheduleSource;
use std::sync::Arc;
use tracing::debug;

/// Periodically pulls the schedule catalogue into the local mirror.
pub struct ScheduleRefresher {
    source: Arc<dyn ScheduleSource>,
    state: Arc<LeaderState>,
}

impl ScheduleRefresher {
    /// Creates a new refresher.
    pub fn new(source: Arc<dyn ScheduleSource>, state: Arc<LeaderState>) -> Self {
        Self { source, state }
    }

    /// Replaces the schedule mirror with the current catalogue snapshot.
    ///
    /// Follower nodes are no-ops unless `ignore_leader` is set, which lets
    /// any node warm its cache ahead of a possible election win.
    pub async fn refresh_jobs_schedule(&self, ignore_leader: bool) -> ClusterResult<()> {
        if !ignore_leader && !self.state.is_leader() {
            return Ok(());
        }

        let schedule = self.source.get_jobs_schedule().await?;
        debug!(entries = schedule.len(), "refreshed jobs schedule");
        self.state.replace_schedule(schedule);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobSchedule, ScheduledJob};
    use crate::memory::InMemoryScheduleSource;

    fn entry(id: &str) -> ScheduledJob {
        ScheduledJob::new(id, format!("lock-{}", id), "report", JobSchedule::new("0 0 * * * *", 3600))
    }

    #[tokio::test]
    async fn test_follower_refresh_is_a_noop() {
        let source = Arc::new(InMemoryScheduleSource::new());
        source.add_job(entry("job-1"));
        let state = Arc::new(LeaderState::new());

        let refresher = ScheduleRefresher::new(source, state.clone());
        refresher.refresh_jobs_schedule(false).await.unwrap();
        assert!(state.schedule_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_ignore_leader_warms_follower_cache() {
        let source = Arc::new(InMemoryScheduleSource::new());
        source.add_job(entry("job-1"));
        let state = Arc::new(LeaderState::new());

        let refresher = ScheduleRefresher::new(source, state.clone());
        refresher.refresh_jobs_schedule(true).await.unwrap();
        assert_eq!(state.schedule_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_leader_refresh_replaces_snapshot() {
        let source = Arc::new(InMemoryScheduleSource::new());
        source.add_job(entry("job-1"));
        let state = Arc::new(LeaderState::new());
        state.acquire(vec![entry("stale")], vec![], vec![]);

        let refresher = ScheduleRefresher::new(source.clone(), state.clone());
        source.add_job(entry("job-2"));
        refresher.refresh_jobs_schedule(false).await.unwrap();

        let snapshot = state.schedule_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|j| j.id.as_str() != "stale"));
    }
}
