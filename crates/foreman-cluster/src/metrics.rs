//! Prometheus metrics for the leader duties.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the leader duties.
pub mod names {
    /// Whether this node is the group leader.
    pub const LEADER_IS_LEADER: &str = "foreman_leader_is_leader";
    /// Total leader elections run.
    pub const ELECTIONS_TOTAL: &str = "foreman_elections_total";

    /// Total job instances queued from the schedule.
    pub const JOBS_QUEUED_TOTAL: &str = "foreman_jobs_queued_total";
    /// Total job instances assigned to nodes.
    pub const JOBS_ASSIGNED_TOTAL: &str = "foreman_jobs_assigned_total";
    /// Total job instances requeued from dead nodes.
    pub const JOBS_REQUEUED_TOTAL: &str = "foreman_jobs_requeued_total";
    /// Total job instances failed permanently.
    pub const JOBS_FAILED_TOTAL: &str = "foreman_jobs_failed_total";

    /// Current queued jobs in the leader mirror.
    pub const JOBS_QUEUED: &str = "foreman_jobs_queued";
    /// Current running jobs in the leader mirror.
    pub const JOBS_RUNNING: &str = "foreman_jobs_running";

    /// Cluster utilisation percentage observed by the scale controller.
    pub const CLUSTER_UTILISATION: &str = "foreman_cluster_utilisation_percent";
    /// Total scale-up events requested.
    pub const SCALE_UP_TOTAL: &str = "foreman_scale_up_events_total";
    /// Total scale-down drain events.
    pub const SCALE_DOWN_TOTAL: &str = "foreman_scale_down_events_total";

    /// Duty execution duration in seconds.
    pub const DUTY_DURATION_SECONDS: &str = "foreman_duty_duration_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_gauge!(
        names::LEADER_IS_LEADER,
        "Whether this node is the group leader (1) or not (0)"
    );
    describe_counter!(names::ELECTIONS_TOTAL, "Total leader elections run");

    describe_counter!(
        names::JOBS_QUEUED_TOTAL,
        "Total job instances queued from due schedule entries"
    );
    describe_counter!(
        names::JOBS_ASSIGNED_TOTAL,
        "Total job instances assigned to nodes"
    );
    describe_counter!(
        names::JOBS_REQUEUED_TOTAL,
        "Total job instances requeued from dead nodes"
    );
    describe_counter!(
        names::JOBS_FAILED_TOTAL,
        "Total job instances failed permanently"
    );

    describe_gauge!(names::JOBS_QUEUED, "Current queued jobs in the leader mirror");
    describe_gauge!(names::JOBS_RUNNING, "Current running jobs in the leader mirror");

    describe_gauge!(
        names::CLUSTER_UTILISATION,
        "Cluster utilisation percentage observed by the scale controller"
    );
    describe_counter!(names::SCALE_UP_TOTAL, "Total scale-up events requested");
    describe_counter!(names::SCALE_DOWN_TOTAL, "Total scale-down drain events");

    describe_histogram!(
        names::DUTY_DURATION_SECONDS,
        "Duty execution duration in seconds"
    );
}

/// Recorder for the leader duties.
#[derive(Clone)]
pub struct DutyMetrics;

impl DutyMetrics {
    /// Update the leader flag gauge.
    pub fn update_leader_status(group: &str, is_leader: bool) {
        gauge!(
            names::LEADER_IS_LEADER,
            "group" => group.to_string()
        )
        .set(if is_leader { 1.0 } else { 0.0 });
    }

    /// Record an election run.
    pub fn election_run(group: &str) {
        counter!(
            names::ELECTIONS_TOTAL,
            "group" => group.to_string()
        )
        .increment(1);
    }

    /// Record a queued job instance.
    pub fn job_queued(job_type: &str) {
        counter!(
            names::JOBS_QUEUED_TOTAL,
            "job_type" => job_type.to_string()
        )
        .increment(1);
    }

    /// Record an assignment.
    pub fn job_assigned(job_type: &str, node_id: &str) {
        counter!(
            names::JOBS_ASSIGNED_TOTAL,
            "job_type" => job_type.to_string(),
            "node_id" => node_id.to_string()
        )
        .increment(1);
    }

    /// Record a dead-node requeue.
    pub fn job_requeued(job_type: &str) {
        counter!(
            names::JOBS_REQUEUED_TOTAL,
            "job_type" => job_type.to_string()
        )
        .increment(1);
    }

    /// Record a permanent failure.
    pub fn job_failed(job_type: &str) {
        counter!(
            names::JOBS_FAILED_TOTAL,
            "job_type" => job_type.to_string()
        )
        .increment(1);
    }

    /// Update the mirror size gauges.
    pub fn update_mirror_sizes(queued: usize, running: usize) {
        gauge!(names::JOBS_QUEUED).set(queued as f64);
        gauge!(names::JOBS_RUNNING).set(running as f64);
    }

    /// Record a duty execution duration.
    pub fn duty_duration(duty: &str, duration: Duration) {
        histogram!(
            names::DUTY_DURATION_SECONDS,
            "duty" => duty.to_string()
        )
        .record(duration.as_secs_f64());
    }
}

/// Recorder for the scale controller.
#[derive(Clone)]
pub struct ScaleMetrics;

impl ScaleMetrics {
    /// Record the observed utilisation.
    pub fn utilisation(group: &str, percent: f64) {
        gauge!(
            names::CLUSTER_UTILISATION,
            "group" => group.to_string()
        )
        .set(percent);
    }

    /// Record a scale-up request.
    pub fn scale_up(group: &str, count: u32) {
        counter!(
            names::SCALE_UP_TOTAL,
            "group" => group.to_string()
        )
        .increment(u64::from(count));
    }

    /// Record a scale-down drain.
    pub fn scale_down(group: &str, count: usize) {
        counter!(
            names::SCALE_DOWN_TOTAL,
            "group" => group.to_string()
        )
        .increment(count as u64);
    }
}
