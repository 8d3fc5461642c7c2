//! End-to-end flows over the in-memory backend: election, queueing,
//! assignment, dead-node recovery, and the scale pipeline, driven duty by
//! duty with a pinned clock.

use chrono::{DateTime, Duration, TimeZone, Utc};
use foreman_cluster::{
    ClusterError, DeadNodeRecoverer, InMemoryJobStore, InMemoryNodeRegistry,
    InMemoryScheduleSource, JobAssigner, JobOutcome, JobQueuer, JobSchedule, JobStore,
    LeaderConfig, LeaderElector, LeaderState, LocalNode, Node, NodeRegistry,
    RecordingCloudManager, ScaleConfig, ScaleController, ScheduleRefresher, ScheduledJob,
    ScheduleSource,
};
use foreman_core::{Clock, GroupName, ManualClock, NodeId};
use std::collections::HashSet;
use std::sync::Arc;

const GROUP: &str = "g";
const MAX_WEIGHT: u32 = 100;

fn base_time() -> DateTime<Utc> {
    // 10:30; hourly schedules have a firing 1800s in the past.
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap()
}

fn scale_config() -> ScaleConfig {
    ScaleConfig {
        min_nodes: 2,
        max_nodes: 10,
        cool_down_secs: 60,
        scale_down_threshold: 40,
        scale_up_threshold: 80,
        evaluation_period_secs: 30,
        scale_up_step: 3,
        scale_down_step: 2,
    }
}

/// Shared cluster fixtures plus one node's full set of duties.
struct Cluster {
    registry: Arc<InMemoryNodeRegistry>,
    jobs: Arc<InMemoryJobStore>,
    schedule: Arc<InMemoryScheduleSource>,
    cloud: Arc<RecordingCloudManager>,
    clock: Arc<ManualClock>,
}

struct NodeDuties {
    state: Arc<LeaderState>,
    elector: LeaderElector,
    refresher: ScheduleRefresher,
    queuer: JobQueuer,
    assigner: JobAssigner,
    recoverer: DeadNodeRecoverer,
    scaler: ScaleController,
}

impl Cluster {
    fn new() -> Self {
        Self {
            registry: Arc::new(InMemoryNodeRegistry::new()),
            jobs: Arc::new(InMemoryJobStore::new()),
            schedule: Arc::new(InMemoryScheduleSource::new()),
            cloud: Arc::new(RecordingCloudManager::new()),
            clock: Arc::new(ManualClock::new(base_time())),
        }
    }

    fn join_node(&self, id: &str, age_secs: i64) {
        self.registry.add_node(Node::new(
            id,
            GROUP,
            self.clock.now() - Duration::seconds(age_secs),
            "1.0.0",
        ));
    }

    fn duties(&self, node_id: &str) -> NodeDuties {
        let local = LocalNode::new(node_id, GROUP);
        let state = Arc::new(LeaderState::new());
        let leader_config = LeaderConfig {
            youngest_leader_age_secs: 10,
            max_weight_per_node: MAX_WEIGHT,
            ..LeaderConfig::default()
        };
        NodeDuties {
            state: state.clone(),
            elector: LeaderElector::new(
                local.clone(),
                &leader_config,
                self.registry.clone(),
                self.jobs.clone(),
                self.schedule.clone(),
                state.clone(),
                self.clock.clone(),
            ),
            refresher: ScheduleRefresher::new(self.schedule.clone(), state.clone()),
            queuer: JobQueuer::new(self.jobs.clone(), state.clone(), self.clock.clone()),
            assigner: JobAssigner::new(
                self.registry.clone(),
                self.jobs.clone(),
                state.clone(),
                self.clock.clone(),
                GroupName::new(GROUP),
                MAX_WEIGHT,
            ),
            recoverer: DeadNodeRecoverer::new(
                self.registry.clone(),
                self.jobs.clone(),
                state.clone(),
                self.clock.clone(),
                GroupName::new(GROUP),
            ),
            scaler: ScaleController::new(
                self.registry.clone(),
                self.cloud.clone(),
                state.clone(),
                self.clock.clone(),
                GroupName::new(GROUP),
                scale_config(),
            ),
        }
    }
}

fn hourly(lock: &str, weight: u32) -> ScheduledJob {
    ScheduledJob::new(
        format!("job-{}", lock),
        lock,
        "report",
        JobSchedule::new("0 0 * * * *", 3600),
    )
    .with_weight(weight)
    .with_max_attempts(3)
}

#[tokio::test]
async fn leader_queues_assigns_recovers_and_reassigns() {
    let cluster = Cluster::new();
    cluster.join_node("node-1", 600);
    cluster.join_node("node-2", 300);
    cluster.schedule.add_job(hourly("lock-etl", 60));

    // node-1 already carries a small job so assignment prefers node-2.
    let warm = hourly("lock-warm", 10)
        .to_queued(base_time() - Duration::hours(1))
        .start(NodeId::new("node-1"), base_time() - Duration::minutes(50));
    cluster.jobs.seed_running_job(warm).unwrap();

    let leader = cluster.duties("node-1");
    let follower = cluster.duties("node-2");

    leader.elector.elect_cluster_leader().await.unwrap();
    follower.elector.elect_cluster_leader().await.unwrap();
    assert!(leader.state.is_leader());
    assert!(!follower.state.is_leader());
    // The election preloaded the running mirror from the store.
    assert_eq!(leader.state.running_snapshot().len(), 1);

    // Follower duties stay no-ops throughout.
    follower.queuer.queue_scheduled_jobs().await.unwrap();
    assert!(cluster.jobs.get_queued_jobs().await.unwrap().is_empty());

    leader.refresher.refresh_jobs_schedule(false).await.unwrap();
    leader.queuer.queue_scheduled_jobs().await.unwrap();
    let queued = cluster.jobs.get_queued_jobs().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].attempts, 0);

    leader.assigner.assign_queued_jobs().await.unwrap();
    let running = cluster.jobs.get_running_jobs().await.unwrap();
    let etl = running.iter().find(|r| r.lock().as_str() == "lock-etl").unwrap();
    assert_eq!(etl.assigned_node.as_str(), "node-2");
    assert_eq!(etl.attempts, 1);

    // node-2 dies; its job is requeued with the lost run counted.
    cluster.registry.remove_node(&NodeId::new("node-2"));
    leader.recoverer.clean_dead_nodes_jobs().await.unwrap();
    let requeued = cluster.jobs.get_queued_jobs().await.unwrap();
    assert_eq!(requeued.len(), 1);
    assert_eq!(requeued[0].attempts, 2);

    // The next pass places it on the surviving node.
    leader.assigner.assign_queued_jobs().await.unwrap();
    let running = cluster.jobs.get_running_jobs().await.unwrap();
    let etl = running.iter().find(|r| r.lock().as_str() == "lock-etl").unwrap();
    assert_eq!(etl.assigned_node.as_str(), "node-1");
    assert_eq!(etl.attempts, 3);
}

#[tokio::test]
async fn at_most_one_leader_per_registry_snapshot() {
    let cluster = Cluster::new();
    cluster.join_node("node-1", 500);
    cluster.join_node("node-2", 400);
    cluster.join_node("node-3", 300);

    let duties: Vec<NodeDuties> = ["node-1", "node-2", "node-3"]
        .iter()
        .map(|id| cluster.duties(id))
        .collect();
    for d in &duties {
        d.elector.elect_cluster_leader().await.unwrap();
    }

    let leaders = duties.iter().filter(|d| d.state.is_leader()).count();
    assert_eq!(leaders, 1);
    assert!(duties[0].state.is_leader());
}

#[tokio::test]
async fn brief_double_leadership_is_bounded_by_lock_uniqueness() {
    let cluster = Cluster::new();
    cluster.join_node("node-1", 600);
    cluster.join_node("node-2", 300);
    cluster.schedule.add_job(hourly("lock-etl", 60));

    let leader = cluster.duties("node-1");
    leader.elector.elect_cluster_leader().await.unwrap();

    // node-2 wrongly believes it leads (e.g. a stale registry read during
    // churn) and runs the same duty.
    let rogue = cluster.duties("node-2");
    rogue.state.acquire(
        cluster.schedule.get_jobs_schedule().await.unwrap(),
        vec![],
        vec![],
    );

    leader.queuer.queue_scheduled_jobs().await.unwrap();
    // The rogue's pass swallows its lost race; the store keeps one instance.
    rogue.queuer.queue_scheduled_jobs().await.unwrap();

    assert_eq!(cluster.jobs.get_queued_jobs().await.unwrap().len(), 1);
}

#[tokio::test]
async fn retry_bound_is_enforced_by_recovery() {
    let cluster = Cluster::new();
    cluster.join_node("node-1", 600);
    cluster.schedule.add_job(hourly("lock-etl", 50));

    let leader = cluster.duties("node-1");
    leader.elector.elect_cluster_leader().await.unwrap();
    leader.queuer.queue_scheduled_jobs().await.unwrap();

    // First run dies with the node.
    leader.assigner.assign_queued_jobs().await.unwrap();
    cluster.registry.remove_node(&NodeId::new("node-1"));
    leader.recoverer.clean_dead_nodes_jobs().await.unwrap();
    assert_eq!(cluster.jobs.get_queued_jobs().await.unwrap()[0].attempts, 2);

    // A replacement node picks it up; max_attempts=3 is now exhausted.
    cluster.join_node("node-9", 600);
    leader.assigner.assign_queued_jobs().await.unwrap();
    let running = cluster.jobs.get_running_jobs().await.unwrap();
    assert_eq!(running[0].attempts, 3);

    cluster.registry.remove_node(&NodeId::new("node-9"));
    leader.recoverer.clean_dead_nodes_jobs().await.unwrap();

    let finished = cluster.jobs.finished_jobs();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].outcome, JobOutcome::Failure);
    assert_eq!(finished[0].attempts, 3);
    assert_eq!(
        finished[0].message.as_deref(),
        Some("node-9 is dead and max attempts has been reached")
    );
    assert!(cluster.jobs.get_queued_jobs().await.unwrap().is_empty());
    assert!(cluster.jobs.get_running_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn capacity_invariant_holds_after_every_assign_pass() {
    let cluster = Cluster::new();
    cluster.join_node("node-1", 600);
    cluster.join_node("node-2", 500);
    for i in 0..8 {
        cluster
            .schedule
            .add_job(hourly(&format!("lock-{}", i), 40).with_priority(i));
    }

    let leader = cluster.duties("node-1");
    leader.elector.elect_cluster_leader().await.unwrap();
    leader.refresher.refresh_jobs_schedule(false).await.unwrap();
    leader.queuer.queue_scheduled_jobs().await.unwrap();
    leader.assigner.assign_queued_jobs().await.unwrap();

    // Two nodes of capacity 100 hold at most two weight-40 jobs each.
    let running = cluster.jobs.get_running_jobs().await.unwrap();
    for node in ["node-1", "node-2"] {
        let load: u32 = running
            .iter()
            .filter(|r| r.assigned_node.as_str() == node)
            .map(|r| r.weight())
            .sum();
        assert!(load <= MAX_WEIGHT, "{} is overloaded at {}", node, load);
    }
    assert_eq!(running.len(), 4);
    assert_eq!(cluster.jobs.get_queued_jobs().await.unwrap().len(), 4);
}

#[tokio::test]
async fn scale_down_drain_reaches_physical_removal() {
    let cluster = Cluster::new();
    for i in 1..=6 {
        // node-6 is the youngest.
        cluster.join_node(&format!("node-{}", i), 600 - i as i64 * 60);
    }

    let leader = cluster.duties("node-1");
    leader.elector.elect_cluster_leader().await.unwrap();

    // Sustained 20% utilisation opens and then fires the drain window.
    leader.scaler.scale_cluster(120, 600).await.unwrap();
    cluster.clock.advance(Duration::seconds(31));
    leader.scaler.scale_cluster(120, 600).await.unwrap();

    let inactive = cluster
        .registry
        .get_all_inactive_nodes_by_group(&GroupName::new(GROUP))
        .await
        .unwrap();
    let drained: Vec<&str> = inactive.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(drained, vec!["node-5", "node-6"]);
    assert!(cluster.cloud.scale_down_calls().is_empty());

    // Nothing runs on the drained nodes, so they are physically removed.
    leader
        .scaler
        .clean_inactive_nodes(&HashSet::new())
        .await
        .unwrap();
    assert_eq!(
        cluster.cloud.scale_down_calls(),
        vec![vec![NodeId::new("node-5"), NodeId::new("node-6")]]
    );
}

#[tokio::test]
async fn drained_node_finishes_its_work_before_removal() {
    let cluster = Cluster::new();
    cluster.join_node("node-1", 600);
    cluster.join_node("node-2", 60);

    // node-2 is running a job when it gets drained.
    let busy_job = hourly("lock-busy", 30)
        .to_queued(base_time() - Duration::hours(1))
        .start(NodeId::new("node-2"), base_time() - Duration::minutes(50));
    cluster.jobs.seed_running_job(busy_job).unwrap();

    let leader = cluster.duties("node-1");
    leader.elector.elect_cluster_leader().await.unwrap();

    cluster
        .registry
        .update_node_status(&NodeId::new("node-2"), false)
        .await
        .unwrap();

    // Still busy: no physical removal.
    let busy: HashSet<NodeId> = [NodeId::new("node-2")].into_iter().collect();
    leader.scaler.clean_inactive_nodes(&busy).await.unwrap();
    assert!(cluster.cloud.scale_down_calls().is_empty());

    // Work finished: the next pass removes the machine.
    leader
        .scaler
        .clean_inactive_nodes(&HashSet::new())
        .await
        .unwrap();
    assert_eq!(
        cluster.cloud.scale_down_calls(),
        vec![vec![NodeId::new("node-2")]]
    );
}

#[tokio::test]
async fn store_outage_is_retryable_and_leaves_no_partial_state() {
    let cluster = Cluster::new();
    cluster.join_node("node-1", 600);
    cluster.schedule.add_job(hourly("lock-etl", 60));

    let leader = cluster.duties("node-1");
    leader.elector.elect_cluster_leader().await.unwrap();
    leader.refresher.refresh_jobs_schedule(false).await.unwrap();

    cluster.jobs.set_unavailable(true);
    let err = leader.queuer.queue_scheduled_jobs().await.unwrap_err();
    assert!(matches!(err, ClusterError::Store(_)));
    assert!(err.is_retryable());
    assert!(leader.state.queued_snapshot().is_empty());

    // The next tick succeeds and converges.
    cluster.jobs.set_unavailable(false);
    leader.queuer.queue_scheduled_jobs().await.unwrap();
    assert_eq!(cluster.jobs.get_queued_jobs().await.unwrap().len(), 1);
}

#[tokio::test]
async fn election_is_stable_across_repeated_ticks() {
    let cluster = Cluster::new();
    cluster.join_node("node-1", 600);
    cluster.join_node("node-2", 300);
    cluster.schedule.add_job(hourly("lock-etl", 60));

    let leader = cluster.duties("node-1");
    for _ in 0..5 {
        leader.elector.elect_cluster_leader().await.unwrap();
    }
    assert!(leader.state.is_leader());

    // Re-election does not wipe mirrors the leader has built up.
    leader.queuer.queue_scheduled_jobs().await.unwrap();
    leader.elector.elect_cluster_leader().await.unwrap();
    assert_eq!(leader.state.queued_snapshot().len(), 1);
}
