//! The supervising timer that fires each duty periodically.
//!
//! Duties on one node run serially inside a single select loop; the only
//! cross-duty state is LeaderState and the scale timers. Store and cloud
//! errors are logged and retried on the next tick; fatal errors stop the
//! loop so re-election can move leadership elsewhere.

use crate::assigner::JobAssigner;
use crate::config::ClusterConfig;
use crate::election::LeaderElector;
use crate::error::{ClusterError, ClusterResult};
use crate::metrics::DutyMetrics;
use crate::node::LocalNode;
use crate::queuer::JobQueuer;
use crate::recovery::DeadNodeRecoverer;
use crate::refresh::ScheduleRefresher;
use crate::scaler::ScaleController;
use crate::state::LeaderState;
use crate::store::{CloudManager, JobStore, NodeRegistry, ScheduleSource};
use foreman_core::{Clock, NodeId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{error, info};

/// Periodic executor of the leader duties on the local node.
pub struct DutyRunner {
    local: LocalNode,
    config: ClusterConfig,
    state: Arc<LeaderState>,
    registry: Arc<dyn NodeRegistry>,
    elector: LeaderElector,
    refresher: ScheduleRefresher,
    queuer: JobQueuer,
    assigner: JobAssigner,
    recoverer: DeadNodeRecoverer,
    scaler: ScaleController,
    shutdown_tx: broadcast::Sender<()>,
    running: AtomicBool,
}

impl DutyRunner {
    /// Wires the duties for the local node and validates the configuration.
    ///
    /// Invalid configuration refuses to run.
    pub fn new(
        local: LocalNode,
        config: ClusterConfig,
        registry: Arc<dyn NodeRegistry>,
        jobs: Arc<dyn JobStore>,
        schedule: Arc<dyn ScheduleSource>,
        cloud: Arc<dyn CloudManager>,
        clock: Arc<dyn Clock>,
    ) -> ClusterResult<Self> {
        config.validate()?;

        let state = Arc::new(LeaderState::new());
        let (shutdown_tx, _) = broadcast::channel(1);

        let elector = LeaderElector::new(
            local.clone(),
            &config.leader,
            registry.clone(),
            jobs.clone(),
            schedule.clone(),
            state.clone(),
            clock.clone(),
        );
        let refresher = ScheduleRefresher::new(schedule, state.clone());
        let queuer = JobQueuer::new(jobs.clone(), state.clone(), clock.clone());
        let assigner = JobAssigner::new(
            registry.clone(),
            jobs.clone(),
            state.clone(),
            clock.clone(),
            local.group.clone(),
            config.leader.max_weight_per_node,
        );
        let recoverer = DeadNodeRecoverer::new(
            registry.clone(),
            jobs,
            state.clone(),
            clock.clone(),
            local.group.clone(),
        );
        let scaler = ScaleController::new(
            registry.clone(),
            cloud,
            state.clone(),
            clock,
            local.group.clone(),
            config.scale.clone(),
        );

        Ok(Self {
            local,
            config,
            state,
            registry,
            elector,
            refresher,
            queuer,
            assigner,
            recoverer,
            scaler,
            shutdown_tx,
            running: AtomicBool::new(false),
        })
    }

    /// Returns the leader-state mirror of this node.
    pub fn state(&self) -> Arc<LeaderState> {
        self.state.clone()
    }

    /// Runs the duty loop until `stop` is called or a fatal error occurs.
    pub async fn start(&self) -> ClusterResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ClusterError::Configuration(
                "duty runner already running".to_string(),
            ));
        }

        info!(
            node_id = %self.local.id,
            group = %self.local.group,
            "starting duty runner"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let runner = &self.config.runner;
        let mut election_ticks = interval(runner.election_period());
        let mut refresh_ticks = interval(runner.refresh_period());
        let mut queue_ticks = interval(runner.queue_period());
        let mut assign_ticks = interval(runner.assign_period());
        let mut recover_ticks = interval(runner.recover_period());
        let mut scale_ticks = interval(runner.scale_period());

        let result = loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(node_id = %self.local.id, "received shutdown signal");
                    break Ok(());
                }

                _ = election_ticks.tick() => {
                    let started = Instant::now();
                    let outcome = self.elector.elect_cluster_leader().await;
                    DutyMetrics::duty_duration("election", started.elapsed());
                    if let Err(e) = self.check_duty("election", outcome) {
                        break Err(e);
                    }
                }

                _ = refresh_ticks.tick() => {
                    let started = Instant::now();
                    let outcome = self.refresher.refresh_jobs_schedule(false).await;
                    DutyMetrics::duty_duration("refresh", started.elapsed());
                    if let Err(e) = self.check_duty("refresh", outcome) {
                        break Err(e);
                    }
                }

                _ = queue_ticks.tick() => {
                    let started = Instant::now();
                    let outcome = self.queuer.queue_scheduled_jobs().await;
                    DutyMetrics::duty_duration("queue", started.elapsed());
                    if let Err(e) = self.check_duty("queue", outcome) {
                        break Err(e);
                    }
                }

                _ = assign_ticks.tick() => {
                    let started = Instant::now();
                    let outcome = self.assigner.assign_queued_jobs().await;
                    DutyMetrics::duty_duration("assign", started.elapsed());
                    if let Err(e) = self.check_duty("assign", outcome) {
                        break Err(e);
                    }
                }

                _ = recover_ticks.tick() => {
                    let started = Instant::now();
                    let outcome = self.recoverer.clean_dead_nodes_jobs().await;
                    DutyMetrics::duty_duration("recover", started.elapsed());
                    if let Err(e) = self.check_duty("recover", outcome) {
                        break Err(e);
                    }
                }

                _ = scale_ticks.tick() => {
                    let started = Instant::now();
                    let outcome = self.run_scale_tick().await;
                    DutyMetrics::duty_duration("scale", started.elapsed());
                    if let Err(e) = self.check_duty("scale", outcome) {
                        break Err(e);
                    }
                }
            }

            DutyMetrics::update_mirror_sizes(
                self.state.queued_snapshot().len(),
                self.state.running_snapshot().len(),
            );
        };

        self.running.store(false, Ordering::SeqCst);
        info!(node_id = %self.local.id, "duty runner stopped");
        result
    }

    /// Signals the duty loop to stop.
    pub fn stop(&self) {
        info!(node_id = %self.local.id, "stopping duty runner...");
        let _ = self.shutdown_tx.send(());
    }

    /// Computes the scale inputs from the mirror and drives the controller.
    async fn run_scale_tick(&self) -> ClusterResult<()> {
        if !self.state.is_leader() {
            return Ok(());
        }

        let weight = self.state.total_mirrored_weight();
        let active = self
            .registry
            .get_all_active_nodes_count_by_group(&self.local.group)
            .await? as u64;
        let capacity = active * u64::from(self.config.leader.max_weight_per_node);
        if capacity > 0 {
            self.scaler.scale_cluster(weight, capacity).await?;
        }

        let busy: HashSet<NodeId> = self
            .state
            .running_snapshot()
            .into_iter()
            .map(|job| job.assigned_node)
            .collect();
        self.scaler.clean_inactive_nodes(&busy).await
    }

    /// Logs a duty failure; only fatal errors end the loop.
    fn check_duty(&self, duty: &str, outcome: ClusterResult<()>) -> ClusterResult<()> {
        match outcome {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => {
                error!(duty, error = %e, "fatal error; stopping leader duties");
                Err(e)
            }
            Err(e) => {
                error!(duty, error = %e, "duty failed; will retry next tick");
                Ok(())
            }
        }
    }
}
